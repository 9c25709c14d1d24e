//! MockNetwork: a set of mock nodes sharing one simulated ledger.
//!
//! Nodes verify what a real node would check at precheck (node id, signatures
//! over the exact body bytes, payer key, fee ceiling, duplicates, chunk order)
//! and receipts only become final after a configurable number of polls.

use std::collections::{BTreeMap, HashMap};

use ledger_crypto::transaction_hash;
use ledger_proto::{convert::decode_signature_pair, fields, v1, ServiceMethod};
use ledger_types::{AccountId, PublicKey, Status, TopicId, TransactionId};
use prost::Message;
use tracing::debug;

use crate::mock_node::{MockFault, MockNode, Scripted, Submission};

const DEFAULT_MIN_TRANSACTION_FEE: u64 = 100_000;
const DEFAULT_RECEIPT_POLLS_UNTIL_FINAL: u32 = 1;

#[derive(Debug, Clone)]
struct PendingReceipt {
    polls: u32,
    receipt: v1::TransactionReceipt,
    record: v1::TransactionRecord,
}

/// Ledger state shared by every node of a `MockNetwork`.
#[derive(Debug, Clone)]
pub struct MockLedger {
    pub accounts: HashMap<AccountId, PublicKey>,
    pub balances: HashMap<AccountId, i64>,
    pub min_transaction_fee: u64,
    /// Price of each paid query kind; kinds not listed are free.
    pub query_costs: HashMap<String, u64>,
    /// Receipt polls answered `UNKNOWN` before the final receipt, counting the final one.
    pub receipt_polls_until_final: u32,
    /// Final receipt status for specific transactions; everything else succeeds.
    pub outcome_overrides: HashMap<TransactionId, Status>,
    /// Payload reassembled from accepted chunks, keyed by initial transaction id.
    pub payloads: HashMap<TransactionId, Vec<u8>>,
    receipts: HashMap<TransactionId, PendingReceipt>,
    chunk_progress: HashMap<TransactionId, i32>,
    topic_sequence: HashMap<TopicId, u64>,
    next_entity_num: u64,
}

impl Default for MockLedger {
    fn default() -> Self {
        Self {
            accounts: HashMap::new(),
            balances: HashMap::new(),
            min_transaction_fee: DEFAULT_MIN_TRANSACTION_FEE,
            query_costs: HashMap::new(),
            receipt_polls_until_final: DEFAULT_RECEIPT_POLLS_UNTIL_FINAL,
            outcome_overrides: HashMap::new(),
            payloads: HashMap::new(),
            receipts: HashMap::new(),
            chunk_progress: HashMap::new(),
            topic_sequence: HashMap::new(),
            next_entity_num: 1_000,
        }
    }
}

impl MockLedger {
    pub fn has_receipt(&self, transaction_id: &TransactionId) -> bool {
        self.receipts.contains_key(transaction_id)
    }

    pub fn receipt_polls(&self, transaction_id: &TransactionId) -> u32 {
        self.receipts
            .get(transaction_id)
            .map(|pending| pending.polls)
            .unwrap_or_default()
    }
}

struct DecodedTransaction {
    body: v1::TransactionBody,
    body_bytes: Vec<u8>,
    signed_bytes: Vec<u8>,
    signatures: Vec<(PublicKey, Vec<u8>)>,
}

#[derive(Debug, Clone, Default)]
pub struct MockNetwork {
    nodes: BTreeMap<AccountId, MockNode>,
    pub ledger: MockLedger,
}

impl MockNetwork {
    pub fn new(node_ids: impl IntoIterator<Item = AccountId>) -> Self {
        Self {
            nodes: node_ids
                .into_iter()
                .map(|id| (id, MockNode::new(id)))
                .collect(),
            ledger: MockLedger::default(),
        }
    }

    pub fn node_ids(&self) -> Vec<AccountId> {
        self.nodes.keys().copied().collect()
    }

    pub fn node(&self, id: &AccountId) -> Option<&MockNode> {
        self.nodes.get(id)
    }

    pub fn node_mut(&mut self, id: &AccountId) -> Option<&mut MockNode> {
        self.nodes.get_mut(id)
    }

    pub fn script(&mut self, id: &AccountId, steps: impl IntoIterator<Item = Scripted>) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.extend_script(steps);
        }
    }

    pub fn add_account(&mut self, id: AccountId, key: PublicKey, balance: i64) {
        self.ledger.accounts.insert(id, key);
        self.ledger.balances.insert(id, balance);
    }

    /// Every accepted submission across all nodes, in node order.
    pub fn accepted_submissions(&self) -> Vec<&Submission> {
        self.nodes.values().flat_map(MockNode::accepted).collect()
    }

    /// Serves one RPC addressed to `node_id`.
    pub fn handle(
        &mut self,
        node_id: &AccountId,
        path: &str,
        request: &[u8],
    ) -> Result<Vec<u8>, MockFault> {
        let method =
            ServiceMethod::lookup(path).ok_or_else(|| MockFault::Unimplemented(path.to_string()))?;
        let node = self
            .nodes
            .get_mut(node_id)
            .ok_or_else(|| MockFault::Unavailable(format!("unknown node {node_id}")))?;

        match node.next_step() {
            Some(Scripted::Unavailable) => {
                debug!(node = %node_id, %method, "scripted unavailable");
                return Err(MockFault::Unavailable(format!("node {node_id} unavailable")));
            }
            Some(Scripted::Timeout) => {
                debug!(node = %node_id, %method, "scripted timeout");
                return Err(MockFault::Timeout);
            }
            Some(Scripted::Precheck(status)) => {
                debug!(node = %node_id, %method, %status, "scripted precheck");
                return Ok(precheck_only(method, status));
            }
            None => {}
        }

        if method.query {
            Ok(self.answer_query(node_id, method, request).encode_to_vec())
        } else {
            let status = self.submit(node_id, method, request);
            Ok(v1::TransactionResponse {
                node_transaction_precheck_code: status.code(),
                cost: 0,
            }
            .encode_to_vec())
        }
    }

    fn submit(&mut self, node_id: &AccountId, method: ServiceMethod, request: &[u8]) -> Status {
        let decoded = match decode_transaction(request) {
            Ok(decoded) => decoded,
            Err(status) => return status,
        };
        let transaction_id = match transaction_id_of(&decoded.body) {
            Ok(id) => id,
            Err(status) => return status,
        };

        let status = match self.precheck(node_id, &decoded, &transaction_id) {
            Ok(()) => {
                self.apply(&decoded, transaction_id);
                Status::Ok
            }
            Err(status) => status,
        };
        debug!(node = %node_id, %method, %transaction_id, %status, "transaction precheck");
        self.log_submission(node_id, method, &decoded, transaction_id, status);
        status
    }

    fn precheck(
        &self,
        node_id: &AccountId,
        decoded: &DecodedTransaction,
        transaction_id: &TransactionId,
    ) -> Result<(), Status> {
        let body = &decoded.body;
        let body_node = body
            .node_account_id
            .clone()
            .and_then(|id| AccountId::try_from(id).ok())
            .ok_or(Status::InvalidNodeAccount)?;
        if &body_node != node_id {
            return Err(Status::InvalidNodeAccount);
        }

        for (key, signature) in &decoded.signatures {
            ledger_crypto::verify(key, &decoded.body_bytes, signature)
                .map_err(|_| Status::InvalidSignature)?;
        }
        let payer_key = self
            .ledger
            .accounts
            .get(&transaction_id.account_id)
            .ok_or(Status::PayerAccountNotFound)?;
        if !decoded.signatures.iter().any(|(key, _)| key == payer_key) {
            return Err(Status::InvalidSignature);
        }

        if body.transaction_fee < self.ledger.min_transaction_fee {
            return Err(Status::InsufficientTxFee);
        }
        if self.ledger.receipts.contains_key(transaction_id) {
            return Err(Status::DuplicateTransaction);
        }

        if let Some(chunk) = &body.chunk_info {
            let initial = chunk
                .initial_transaction_id
                .clone()
                .and_then(|id| TransactionId::try_from(id).ok())
                .ok_or(Status::InvalidTransactionId)?;
            if chunk.index < 0 || chunk.index >= chunk.total {
                return Err(Status::InvalidTransaction);
            }
            if initial.with_nanos_offset(chunk.index as u64) != *transaction_id {
                return Err(Status::InvalidTransactionId);
            }
            let expected = self
                .ledger
                .chunk_progress
                .get(&initial)
                .copied()
                .unwrap_or_default();
            if chunk.index != expected {
                return Err(Status::InvalidTransaction);
            }
        }
        Ok(())
    }

    fn apply(&mut self, decoded: &DecodedTransaction, transaction_id: TransactionId) {
        let body = &decoded.body;
        let ledger = &mut self.ledger;
        let status = ledger
            .outcome_overrides
            .get(&transaction_id)
            .copied()
            .unwrap_or(Status::Success);
        let mut receipt = v1::TransactionReceipt {
            status: status.code(),
            ..Default::default()
        };

        if let Some(chunk) = &body.chunk_info {
            if let Some(initial) = chunk
                .initial_transaction_id
                .clone()
                .and_then(|id| TransactionId::try_from(id).ok())
            {
                ledger.chunk_progress.insert(initial, chunk.index + 1);
                let slice = [fields::MESSAGE, fields::CONTENTS]
                    .iter()
                    .find_map(|name| match body.fields.get(*name).and_then(|f| f.value.as_ref()) {
                        Some(v1::field_value::Value::Bytes(bytes)) => Some(bytes.clone()),
                        _ => None,
                    })
                    .unwrap_or_default();
                ledger.payloads.entry(initial).or_default().extend(slice);
            }
        }

        if status == Status::Success {
            match body.kind.as_str() {
                "cryptoCreateAccount" => {
                    ledger.next_entity_num += 1;
                    receipt.account_id = Some(AccountId::from_num(ledger.next_entity_num).into());
                }
                "consensusCreateTopic" => {
                    ledger.next_entity_num += 1;
                    receipt.topic_id = Some(TopicId::from_num(ledger.next_entity_num).into());
                }
                "fileCreate" => {
                    ledger.next_entity_num += 1;
                    receipt.file_id = Some(v1::EntityId {
                        shard_num: 0,
                        realm_num: 0,
                        num: ledger.next_entity_num as i64,
                    });
                }
                "consensusSubmitMessage" => {
                    if let Some(v1::field_value::Value::Entity(topic)) = body
                        .fields
                        .get(fields::TOPIC_ID)
                        .and_then(|f| f.value.clone())
                    {
                        let sequence = ledger.topic_sequence.entry(topic.into()).or_default();
                        *sequence += 1;
                        receipt.topic_sequence_number = *sequence;
                    }
                }
                "cryptoTransfer" => apply_transfers(&mut ledger.balances, body),
                _ => {}
            }
        }

        let record = v1::TransactionRecord {
            receipt: Some(receipt.clone()),
            transaction_hash: transaction_hash(&decoded.signed_bytes).as_bytes().to_vec(),
            consensus_timestamp: Some(transaction_id.valid_start.plus_nanos(1_000_000_000).into()),
            transaction_id: Some(transaction_id.into()),
            memo: body.memo.clone(),
            transaction_fee: ledger.min_transaction_fee,
            transfer_list: transfers_of(body),
        };
        ledger.receipts.insert(
            transaction_id,
            PendingReceipt {
                polls: 0,
                receipt,
                record,
            },
        );
    }

    fn answer_query(
        &mut self,
        node_id: &AccountId,
        method: ServiceMethod,
        request: &[u8],
    ) -> v1::Response {
        let Ok(query) = v1::Query::decode(request) else {
            return response(Status::BadEncoding, v1::ResponseType::AnswerOnly, 0);
        };
        let Some(header) = query.header.clone() else {
            return response(Status::MissingQueryHeader, v1::ResponseType::AnswerOnly, 0);
        };
        let cost = self.ledger.query_costs.get(&query.kind).copied().unwrap_or_default();

        if header.response_type == v1::ResponseType::CostAnswer as i32 {
            debug!(node = %node_id, kind = %query.kind, cost, "cost probe");
            return response(Status::Ok, v1::ResponseType::CostAnswer, cost);
        }
        if cost > 0 {
            let payment = header.payment.as_ref();
            if let Err(status) = self.check_payment(node_id, method, payment, cost) {
                debug!(node = %node_id, kind = %query.kind, %status, "query payment rejected");
                return response(status, v1::ResponseType::AnswerOnly, cost);
            }
        }

        match query.kind.as_str() {
            "transactionGetReceipt" => self.answer_receipt(&query),
            "transactionGetRecord" => self.answer_record(&query),
            "cryptoGetAccountBalance" => {
                let balance = query_account(&query)
                    .and_then(|account| self.ledger.balances.get(&account).copied())
                    .unwrap_or_default();
                let mut answer = response(Status::Ok, v1::ResponseType::AnswerOnly, 0);
                answer.fields.insert(
                    fields::BALANCE.to_string(),
                    v1::FieldValue {
                        value: Some(v1::field_value::Value::Int(balance)),
                    },
                );
                answer
            }
            _ => response(Status::Ok, v1::ResponseType::AnswerOnly, cost),
        }
    }

    fn check_payment(
        &mut self,
        node_id: &AccountId,
        method: ServiceMethod,
        payment: Option<&v1::Transaction>,
        cost: u64,
    ) -> Result<(), Status> {
        let payment = payment.ok_or(Status::InsufficientTxFee)?;
        let decoded = decode_transaction(&payment.encode_to_vec())?;
        let transaction_id = transaction_id_of(&decoded.body)?;
        let mut status = self.precheck(node_id, &decoded, &transaction_id).err();
        if status.is_none() {
            let paid: i64 = transfers_of(&decoded.body)
                .map(|list| list.account_amounts)
                .unwrap_or_default()
                .iter()
                .filter(|amount| {
                    amount
                        .account_id
                        .clone()
                        .and_then(|id| AccountId::try_from(id).ok())
                        .as_ref()
                        == Some(node_id)
                })
                .map(|amount| amount.amount)
                .sum();
            if paid < cost as i64 {
                status = Some(Status::InsufficientTxFee);
            }
        }
        let outcome = status.unwrap_or(Status::Ok);
        if outcome == Status::Ok {
            self.apply(&decoded, transaction_id);
        }
        self.log_submission(node_id, method, &decoded, transaction_id, outcome);
        status.map_or(Ok(()), Err)
    }

    fn answer_receipt(&mut self, query: &v1::Query) -> v1::Response {
        let until_final = self.ledger.receipt_polls_until_final;
        let receipts = &mut self.ledger.receipts;
        let Some(pending) = query_transaction_id(query).and_then(|id| receipts.get_mut(&id)) else {
            return response(Status::ReceiptNotFound, v1::ResponseType::AnswerOnly, 0);
        };
        pending.polls += 1;
        let mut answer = response(Status::Ok, v1::ResponseType::AnswerOnly, 0);
        answer.receipt = Some(if pending.polls < until_final {
            v1::TransactionReceipt {
                status: Status::Unknown.code(),
                ..Default::default()
            }
        } else {
            pending.receipt.clone()
        });
        answer
    }

    fn answer_record(&mut self, query: &v1::Query) -> v1::Response {
        let until_final = self.ledger.receipt_polls_until_final;
        let receipts = &mut self.ledger.receipts;
        let Some(pending) = query_transaction_id(query).and_then(|id| receipts.get_mut(&id)) else {
            return response(Status::RecordNotFound, v1::ResponseType::AnswerOnly, 0);
        };
        if pending.polls < until_final {
            pending.polls += 1;
            return response(Status::RecordNotFound, v1::ResponseType::AnswerOnly, 0);
        }
        let mut answer = response(Status::Ok, v1::ResponseType::AnswerOnly, 0);
        answer.record = Some(pending.record.clone());
        answer
    }

    fn log_submission(
        &mut self,
        node_id: &AccountId,
        method: ServiceMethod,
        decoded: &DecodedTransaction,
        transaction_id: TransactionId,
        status: Status,
    ) {
        if let Some(node) = self.nodes.get_mut(node_id) {
            node.submissions.push(Submission {
                method,
                transaction_id,
                node_account_id: *node_id,
                chunk: decoded
                    .body
                    .chunk_info
                    .as_ref()
                    .map(|chunk| (chunk.index, chunk.total)),
                body_bytes: decoded.body_bytes.clone(),
                signers: decoded.signatures.iter().map(|(key, _)| *key).collect(),
                status,
            });
        }
    }
}

fn precheck_only(method: ServiceMethod, status: Status) -> Vec<u8> {
    if method.query {
        response(status, v1::ResponseType::AnswerOnly, 0).encode_to_vec()
    } else {
        v1::TransactionResponse {
            node_transaction_precheck_code: status.code(),
            cost: 0,
        }
        .encode_to_vec()
    }
}

fn response(status: Status, response_type: v1::ResponseType, cost: u64) -> v1::Response {
    v1::Response {
        header: Some(v1::ResponseHeader {
            node_transaction_precheck_code: status.code(),
            response_type: response_type as i32,
            cost,
        }),
        ..Default::default()
    }
}

fn decode_transaction(bytes: &[u8]) -> Result<DecodedTransaction, Status> {
    let transaction = v1::Transaction::decode(bytes).map_err(|_| Status::InvalidTransaction)?;
    let signed = v1::SignedTransaction::decode(transaction.signed_transaction_bytes.as_slice())
        .map_err(|_| Status::InvalidTransaction)?;
    let body = v1::TransactionBody::decode(signed.body_bytes.as_slice())
        .map_err(|_| Status::InvalidTransactionBody)?;
    let signatures = signed
        .sig_map
        .unwrap_or_default()
        .sig_pair
        .iter()
        .map(decode_signature_pair)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| Status::InvalidSignature)?;
    Ok(DecodedTransaction {
        body,
        body_bytes: signed.body_bytes,
        signed_bytes: transaction.signed_transaction_bytes,
        signatures,
    })
}

fn transaction_id_of(body: &v1::TransactionBody) -> Result<TransactionId, Status> {
    body.transaction_id
        .clone()
        .and_then(|id| TransactionId::try_from(id).ok())
        .ok_or(Status::InvalidTransactionId)
}

fn transfers_of(body: &v1::TransactionBody) -> Option<v1::TransferList> {
    match body.fields.get(fields::TRANSFERS).and_then(|f| f.value.clone()) {
        Some(v1::field_value::Value::Transfers(list)) => Some(list),
        _ => None,
    }
}

fn apply_transfers(balances: &mut HashMap<AccountId, i64>, body: &v1::TransactionBody) {
    for amount in transfers_of(body).map(|list| list.account_amounts).unwrap_or_default() {
        if let Some(account) = amount.account_id.and_then(|id| AccountId::try_from(id).ok()) {
            *balances.entry(account).or_default() += amount.amount;
        }
    }
}

fn query_transaction_id(query: &v1::Query) -> Option<TransactionId> {
    match query.fields.get(fields::TRANSACTION_ID).and_then(|f| f.value.clone()) {
        Some(v1::field_value::Value::TransactionId(id)) => TransactionId::try_from(id).ok(),
        _ => None,
    }
}

fn query_account(query: &v1::Query) -> Option<AccountId> {
    match query.fields.get(fields::ACCOUNT_ID).and_then(|f| f.value.clone()) {
        Some(v1::field_value::Value::Account(id)) => AccountId::try_from(id).ok(),
        _ => None,
    }
}
