//! Queries, their cost negotiation and their payment transactions.
//!
//! A paid query runs at most two loops of the retry engine: a cost probe,
//! unless the caller fixed the payment amount, and the paid query itself.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use ledger_proto::{fields as field_names, service, v1, ServiceMethod};
use ledger_types::{AccountId, FileId, Hbar, Status, TopicId, TransactionId};
use prost::Message;
use tracing::{debug, info};

use crate::client::{Client, Operator};
use crate::error::{BuildError, Error};
use crate::execute::{execute, Deadline, Execute, ExecutionReport, Verdict};
use crate::fields::FieldValue;
use crate::policy::{PrecheckClass, StatusPolicy};
use crate::receipt::{TransactionReceipt, TransactionRecord};
use crate::transaction::TransactionBuilder;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueryKind {
    pub name: &'static str,
    pub method: ServiceMethod,
    /// Whether the network charges for the answer.
    pub paid: bool,
}

impl QueryKind {
    pub const ACCOUNT_BALANCE: Self =
        Self::free("cryptoGetAccountBalance", service::CRYPTO_GET_BALANCE);
    pub const ACCOUNT_INFO: Self = Self::paid("cryptoGetInfo", service::CRYPTO_GET_INFO);
    pub const TRANSACTION_RECEIPT: Self =
        Self::free("transactionGetReceipt", service::TRANSACTION_GET_RECEIPT);
    pub const TRANSACTION_RECORD: Self =
        Self::paid("transactionGetRecord", service::TRANSACTION_GET_RECORD);
    pub const TOPIC_INFO: Self =
        Self::paid("consensusGetTopicInfo", service::CONSENSUS_GET_TOPIC_INFO);
    pub const FILE_CONTENTS: Self = Self::paid("fileGetContents", service::FILE_GET_CONTENTS);

    const fn free(name: &'static str, method: ServiceMethod) -> Self {
        Self {
            name,
            method,
            paid: false,
        }
    }

    const fn paid(name: &'static str, method: ServiceMethod) -> Self {
        Self {
            name,
            method,
            paid: true,
        }
    }

    /// Receipt and record lookups, whose answer may not be final yet.
    pub fn tracks_outcome(&self) -> bool {
        *self == Self::TRANSACTION_RECEIPT || *self == Self::TRANSACTION_RECORD
    }
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

#[derive(Debug, Clone)]
pub struct Query {
    kind: QueryKind,
    fields: BTreeMap<String, FieldValue>,
    node_account_ids: Option<Vec<AccountId>>,
    payment_amount: Option<Hbar>,
    max_query_payment: Option<Hbar>,
    max_attempts: Option<usize>,
    preferred_node: Option<AccountId>,
}

impl Query {
    pub fn new(kind: QueryKind) -> Self {
        Self {
            kind,
            fields: BTreeMap::new(),
            node_account_ids: None,
            payment_amount: None,
            max_query_payment: None,
            max_attempts: None,
            preferred_node: None,
        }
    }

    pub fn account_balance(account_id: AccountId) -> Self {
        Self::new(QueryKind::ACCOUNT_BALANCE).with_field(field_names::ACCOUNT_ID, account_id)
    }

    pub fn account_info(account_id: AccountId) -> Self {
        Self::new(QueryKind::ACCOUNT_INFO).with_field(field_names::ACCOUNT_ID, account_id)
    }

    pub fn transaction_receipt(transaction_id: TransactionId) -> Self {
        Self::new(QueryKind::TRANSACTION_RECEIPT)
            .with_field(field_names::TRANSACTION_ID, transaction_id)
    }

    pub fn transaction_record(transaction_id: TransactionId) -> Self {
        Self::new(QueryKind::TRANSACTION_RECORD)
            .with_field(field_names::TRANSACTION_ID, transaction_id)
    }

    pub fn topic_info(topic_id: TopicId) -> Self {
        Self::new(QueryKind::TOPIC_INFO).with_field(field_names::TOPIC_ID, topic_id)
    }

    pub fn file_contents(file_id: FileId) -> Self {
        Self::new(QueryKind::FILE_CONTENTS).with_field(field_names::FILE_ID, file_id)
    }

    pub fn kind(&self) -> QueryKind {
        self.kind
    }

    pub fn with_field(mut self, name: &str, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    pub fn with_include_children(self, include: bool) -> Self {
        self.with_field(field_names::INCLUDE_CHILDREN, include)
    }

    pub fn with_include_duplicates(self, include: bool) -> Self {
        self.with_field(field_names::INCLUDE_DUPLICATES, include)
    }

    /// Pays exactly `amount` and skips the cost probe.
    pub fn with_payment_amount(mut self, amount: Hbar) -> Self {
        self.payment_amount = Some(amount);
        self
    }

    /// Ceiling for a probed cost; defaults to the client's `default_max_query_payment`.
    pub fn with_max_query_payment(mut self, max: Hbar) -> Self {
        self.max_query_payment = Some(max);
        self
    }

    pub fn with_node_account_ids(mut self, node_account_ids: Vec<AccountId>) -> Self {
        self.node_account_ids = Some(node_account_ids);
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// First node to try when the node list is not restricted.
    pub(crate) fn with_preferred_node(mut self, node: AccountId) -> Self {
        self.preferred_node = Some(node);
        self
    }

    /// Price of this query. Free kinds cost nothing and make no network call.
    pub async fn get_cost(&self, client: &Client) -> Result<Hbar, Error> {
        let deadline = Deadline::after(client.config().request_timeout);
        let mut report = ExecutionReport::default();
        self.probe_cost(client, deadline, &mut report)
            .await
            .map(|(cost, _)| cost)
    }

    pub async fn execute(&self, client: &Client) -> Result<QueryResponse, Error> {
        self.execute_with_timeout(client, client.config().request_timeout)
            .await
    }

    pub async fn execute_with_timeout(
        &self,
        client: &Client,
        timeout: Duration,
    ) -> Result<QueryResponse, Error> {
        let deadline = Deadline::after(timeout);
        let mut report = ExecutionReport::default();
        let mut preferred = self.preferred_node;

        let payment = if self.kind.paid {
            let operator = client.operator().ok_or(BuildError::MissingOperator)?;
            let amount = match self.payment_amount {
                Some(amount) => amount,
                None => {
                    let (cost, node) = self.probe_cost(client, deadline, &mut report).await?;
                    let max = self
                        .max_query_payment
                        .unwrap_or(client.config().default_max_query_payment);
                    if cost > max {
                        return Err(Error::MaxQueryPaymentExceeded { cost, max });
                    }
                    preferred = preferred.or(node);
                    cost
                }
            };
            Some(QueryPayment {
                operator: operator.clone(),
                amount,
                max_transaction_fee: client.config().default_max_transaction_fee,
                last_transaction_id: None,
            })
        } else {
            None
        };
        let cost = payment.as_ref().map_or(Hbar::ZERO, |payment| payment.amount);

        let mut request = QueryExecution {
            query: self,
            candidates: self.node_account_ids.clone().unwrap_or_default(),
            preferred,
            response_type: v1::ResponseType::AnswerOnly,
            payment,
        };
        let (response, node_account_id) =
            execute(client, &mut request, deadline, &mut report).await?;
        debug!(kind = %self.kind, node = %node_account_id, %cost, "query answered");
        Ok(QueryResponse {
            node_account_id,
            cost,
            response,
            report,
        })
    }

    /// Runs the cost probe; the node is `None` when nothing was asked.
    async fn probe_cost(
        &self,
        client: &Client,
        deadline: Deadline,
        report: &mut ExecutionReport,
    ) -> Result<(Hbar, Option<AccountId>), Error> {
        if !self.kind.paid {
            return Ok((Hbar::ZERO, None));
        }
        let mut request = QueryExecution {
            query: self,
            candidates: self.node_account_ids.clone().unwrap_or_default(),
            preferred: self.preferred_node,
            response_type: v1::ResponseType::CostAnswer,
            payment: None,
        };
        let (response, node) = execute(client, &mut request, deadline, report).await?;
        let tinybars = response.header.map(|header| header.cost).unwrap_or_default();
        let cost = Hbar::from_tinybars(i64::try_from(tinybars).unwrap_or(i64::MAX));
        info!(kind = %self.kind, node = %node, %cost, "query cost");
        Ok((cost, Some(node)))
    }

    fn target_transaction_id(&self) -> Option<TransactionId> {
        match self.fields.get(field_names::TRANSACTION_ID) {
            Some(FieldValue::TransactionId(id)) => Some(*id),
            _ => None,
        }
    }
}

/// Builds the transfer that pays one node for one attempt of a paid query.
///
/// Each attempt gets a fresh payment: the node may already have applied an
/// earlier one, and resubmitting it would be rejected as a duplicate.
struct QueryPayment {
    operator: Operator,
    amount: Hbar,
    max_transaction_fee: Hbar,
    last_transaction_id: Option<TransactionId>,
}

impl QueryPayment {
    fn for_node(&mut self, node: AccountId) -> Result<v1::Transaction, Error> {
        let payer = self.operator.account_id;
        let transaction_id = TransactionId::generate(payer);
        let mut frozen = TransactionBuilder::transfer()
            .with_transaction_id(transaction_id)
            .with_node_account_ids(vec![node])
            .with_max_transaction_fee(self.max_transaction_fee)
            .with_hbar_transfer(payer, -self.amount)
            .with_hbar_transfer(node, self.amount)
            .freeze()?;
        frozen.sign(Arc::clone(&self.operator.signer))?;
        let signed = frozen
            .signed_body(0, &node)
            .ok_or(BuildError::UnknownNode(node))?;
        self.last_transaction_id = Some(transaction_id);
        Ok(signed.to_transaction())
    }
}

struct QueryExecution<'a> {
    query: &'a Query,
    candidates: Vec<AccountId>,
    preferred: Option<AccountId>,
    response_type: v1::ResponseType,
    payment: Option<QueryPayment>,
}

impl QueryExecution<'_> {
    fn pending(&self, status: Status) -> Error {
        Error::ReceiptPending {
            status,
            transaction_id: self.query.target_transaction_id(),
        }
    }

    fn precheck_error(&self, status: Status) -> Error {
        Error::PrecheckStatus {
            status,
            transaction_id: self.query.target_transaction_id(),
        }
    }
}

impl Execute for QueryExecution<'_> {
    type Output = v1::Response;

    fn method(&self) -> ServiceMethod {
        self.query.kind.method
    }

    fn candidates(&self) -> &[AccountId] {
        &self.candidates
    }

    fn explicit_nodes(&self) -> bool {
        self.query.node_account_ids.is_some()
    }

    fn preassigned_node(&self) -> Option<AccountId> {
        self.preferred.or_else(|| self.candidates.first().copied())
    }

    fn transaction_id(&self) -> Option<TransactionId> {
        self.query.target_transaction_id().or_else(|| {
            self.payment
                .as_ref()
                .and_then(|payment| payment.last_transaction_id)
        })
    }

    fn make_request(&mut self, node: AccountId) -> Result<Vec<u8>, Error> {
        let payment = match &mut self.payment {
            Some(payment) => Some(payment.for_node(node)?),
            None => None,
        };
        let query = v1::Query {
            header: Some(v1::QueryHeader {
                payment,
                response_type: self.response_type as i32,
            }),
            kind: self.query.kind.name.to_string(),
            fields: self
                .query
                .fields
                .iter()
                .map(|(name, value)| (name.clone(), value.clone().into()))
                .collect(),
        };
        Ok(query.encode_to_vec())
    }

    fn classify(
        &mut self,
        _node: AccountId,
        response: &[u8],
        policy: &StatusPolicy,
    ) -> Verdict<v1::Response> {
        let response = match v1::Response::decode(response) {
            Ok(response) => response,
            Err(err) => return Verdict::Fatal(err.into()),
        };
        let Some(code) = response
            .header
            .as_ref()
            .map(|header| header.node_transaction_precheck_code)
        else {
            return Verdict::Fatal(Error::Decode("response without header".to_string()));
        };
        let Ok(status) = Status::try_from(code) else {
            return Verdict::Fatal(Error::UnrecognizedStatus(code));
        };
        let answering = self.response_type == v1::ResponseType::AnswerOnly;
        let tracks_outcome = answering && self.query.kind.tracks_outcome();

        match policy.classify_precheck(status) {
            PrecheckClass::Accepted => {
                if tracks_outcome {
                    match outcome_status(&response) {
                        Ok(Some(outcome)) if policy.is_receipt_pending(outcome) => {
                            return Verdict::NotReady(self.pending(outcome));
                        }
                        Ok(_) => {}
                        Err(err) => return Verdict::Fatal(err),
                    }
                }
                Verdict::Accepted(response)
            }
            PrecheckClass::Retryable => Verdict::Retry(Error::RetryablePrecheck {
                status,
                transaction_id: self.query.target_transaction_id(),
            }),
            PrecheckClass::Fatal if tracks_outcome && policy.is_outcome_unavailable(status) => {
                Verdict::NotReady(self.pending(status))
            }
            PrecheckClass::TransactionExpired => Verdict::Expired(self.precheck_error(status)),
            PrecheckClass::Fatal => Verdict::Fatal(self.precheck_error(status)),
        }
    }

    fn regenerate_transaction_id(&mut self) -> bool {
        // Payments are rebuilt for every attempt, so an expired one is simply replaced.
        self.payment.is_some()
    }

    fn max_attempts(&self) -> Option<usize> {
        self.query.max_attempts
    }
}

/// Status of the receipt (or the record's receipt) carried by an answer.
fn outcome_status(response: &v1::Response) -> Result<Option<Status>, Error> {
    let receipt = response
        .receipt
        .as_ref()
        .or_else(|| response.record.as_ref().and_then(|record| record.receipt.as_ref()));
    receipt
        .map(|receipt| {
            Status::try_from(receipt.status).map_err(|_| Error::UnrecognizedStatus(receipt.status))
        })
        .transpose()
}

/// The answer to a query and how it was obtained.
#[derive(Debug, Clone)]
pub struct QueryResponse {
    pub node_account_id: AccountId,
    /// Amount paid for the answer.
    pub cost: Hbar,
    pub response: v1::Response,
    pub report: ExecutionReport,
}

impl QueryResponse {
    pub fn field(&self, name: &str) -> Option<FieldValue> {
        self.response
            .fields
            .get(name)
            .cloned()
            .and_then(|value| FieldValue::try_from(value).ok())
    }

    pub fn balance(&self) -> Option<Hbar> {
        match self.field(field_names::BALANCE)? {
            FieldValue::Int(tinybars) => Some(Hbar::from_tinybars(tinybars)),
            _ => None,
        }
    }

    pub fn receipt(&self) -> Result<TransactionReceipt, Error> {
        let receipt = self
            .response
            .receipt
            .clone()
            .ok_or_else(|| Error::Decode("answer carries no receipt".to_string()))?;
        let mut receipt = TransactionReceipt::from_wire(receipt)?;
        receipt.children = self
            .response
            .child_receipts
            .iter()
            .cloned()
            .map(TransactionReceipt::from_wire)
            .collect::<Result<_, _>>()?;
        receipt.duplicates = self
            .response
            .duplicate_receipts
            .iter()
            .cloned()
            .map(TransactionReceipt::from_wire)
            .collect::<Result<_, _>>()?;
        Ok(receipt)
    }

    pub fn record(&self) -> Result<TransactionRecord, Error> {
        let record = self
            .response
            .record
            .clone()
            .ok_or_else(|| Error::Decode("answer carries no record".to_string()))?;
        TransactionRecord::from_wire(record)
    }
}
