//! Outcomes of accepted transactions and the polling that waits for them.

use std::time::Duration;

use ledger_proto::v1;
use ledger_types::{
    AccountId, ContractId, FileId, Hbar, ScheduleId, Status, Timestamp, TokenId, TopicId,
    TransactionHash, TransactionId,
};
use tracing::{debug, warn};

use crate::client::Client;
use crate::error::Error;
use crate::execute::ExecutionReport;
use crate::query::Query;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionReceipt {
    pub status: Status,
    pub account_id: Option<AccountId>,
    pub file_id: Option<FileId>,
    pub contract_id: Option<ContractId>,
    pub topic_id: Option<TopicId>,
    pub token_id: Option<TokenId>,
    pub schedule_id: Option<ScheduleId>,
    pub topic_sequence_number: u64,
    pub topic_running_hash: Vec<u8>,
    pub scheduled_transaction_id: Option<TransactionId>,
    pub serial_numbers: Vec<i64>,
    pub children: Vec<TransactionReceipt>,
    pub duplicates: Vec<TransactionReceipt>,
}

impl TransactionReceipt {
    pub(crate) fn from_wire(receipt: v1::TransactionReceipt) -> Result<Self, Error> {
        let status = Status::try_from(receipt.status)
            .map_err(|_| Error::UnrecognizedStatus(receipt.status))?;
        Ok(Self {
            status,
            account_id: receipt.account_id.map(AccountId::try_from).transpose()?,
            file_id: receipt.file_id.map(FileId::from),
            contract_id: receipt.contract_id.map(ContractId::from),
            topic_id: receipt.topic_id.map(TopicId::from),
            token_id: receipt.token_id.map(TokenId::from),
            schedule_id: receipt.schedule_id.map(ScheduleId::from),
            topic_sequence_number: receipt.topic_sequence_number,
            topic_running_hash: receipt.topic_running_hash,
            scheduled_transaction_id: receipt
                .scheduled_transaction_id
                .map(TransactionId::try_from)
                .transpose()?,
            serial_numbers: receipt.serial_numbers,
            children: Vec::new(),
            duplicates: Vec::new(),
        })
    }

    /// Turns a terminal non-success status into `Error::ReceiptStatus`.
    pub fn validate_status(self, transaction_id: TransactionId) -> Result<Self, Error> {
        if self.status.is_success() {
            return Ok(self);
        }
        Err(Error::ReceiptStatus {
            status: self.status,
            transaction_id,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRecord {
    pub receipt: TransactionReceipt,
    pub transaction_hash: Vec<u8>,
    pub consensus_timestamp: Option<Timestamp>,
    pub transaction_id: Option<TransactionId>,
    pub memo: String,
    pub transaction_fee: Hbar,
    pub transfers: Vec<(AccountId, Hbar)>,
}

impl TransactionRecord {
    pub(crate) fn from_wire(record: v1::TransactionRecord) -> Result<Self, Error> {
        let receipt = record
            .receipt
            .ok_or_else(|| Error::Decode("record carries no receipt".to_string()))?;
        let transfers = record
            .transfer_list
            .map(|list| list.account_amounts)
            .unwrap_or_default()
            .into_iter()
            .map(|amount| {
                let account = amount
                    .account_id
                    .ok_or_else(|| Error::Decode("transfer without account".to_string()))?;
                Ok((AccountId::try_from(account)?, Hbar::from_tinybars(amount.amount)))
            })
            .collect::<Result<_, Error>>()?;
        Ok(Self {
            receipt: TransactionReceipt::from_wire(receipt)?,
            transaction_hash: record.transaction_hash,
            consensus_timestamp: record.consensus_timestamp.map(Timestamp::from),
            transaction_id: record.transaction_id.map(TransactionId::try_from).transpose()?,
            memo: record.memo,
            transaction_fee: Hbar::from_tinybars(
                i64::try_from(record.transaction_fee).unwrap_or(i64::MAX),
            ),
            transfers,
        })
    }
}

/// One accepted chunk: the id it carried and the node that took it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSubmission {
    pub index: usize,
    pub transaction_id: TransactionId,
    pub node_account_id: AccountId,
    pub transaction_hash: TransactionHash,
}

/// Handle to an accepted transaction, used to wait for its outcome.
#[derive(Debug, Clone)]
pub struct TransactionResponse {
    pub transaction_id: TransactionId,
    pub node_account_id: AccountId,
    pub transaction_hash: TransactionHash,
    /// Every chunk in submission order; a single entry for unchunked requests.
    pub chunks: Vec<ChunkSubmission>,
    pub report: ExecutionReport,
    validate_status: bool,
}

impl TransactionResponse {
    pub(crate) fn new(
        first: ChunkSubmission,
        chunks: Vec<ChunkSubmission>,
        report: ExecutionReport,
    ) -> Self {
        Self {
            transaction_id: first.transaction_id,
            node_account_id: first.node_account_id,
            transaction_hash: first.transaction_hash,
            chunks,
            report,
            validate_status: true,
        }
    }

    /// When false, `get_receipt` returns non-success receipts instead of failing.
    pub fn with_validate_status(mut self, validate: bool) -> Self {
        self.validate_status = validate;
        self
    }

    /// Receipt query for this transaction, aimed first at the node that accepted it.
    pub fn receipt_query(&self) -> Query {
        Query::transaction_receipt(self.transaction_id).with_preferred_node(self.node_account_id)
    }

    pub async fn get_receipt(&self, client: &Client) -> Result<TransactionReceipt, Error> {
        self.get_receipt_with_timeout(client, client.config().request_timeout)
            .await
    }

    pub async fn get_receipt_with_timeout(
        &self,
        client: &Client,
        timeout: Duration,
    ) -> Result<TransactionReceipt, Error> {
        let receipt = poll_receipt(client, self.receipt_query(), timeout).await?;
        if self.validate_status {
            return receipt.validate_status(self.transaction_id);
        }
        Ok(receipt)
    }

    /// Waits for the receipt, then pays for and fetches the record.
    pub async fn get_record(&self, client: &Client) -> Result<TransactionRecord, Error> {
        self.get_receipt(client).await?;
        let answer = Query::transaction_record(self.transaction_id)
            .with_preferred_node(self.node_account_id)
            .execute(client)
            .await?;
        answer.record()
    }
}

/// Polls `query` until the receipt is final or `timeout` elapses.
///
/// "Not yet available" answers are retried at the fixed poll interval; a
/// terminal status is returned as-is, the caller decides whether it is an error.
pub async fn poll_receipt(
    client: &Client,
    query: Query,
    timeout: Duration,
) -> Result<TransactionReceipt, Error> {
    let answer = query.execute_with_timeout(client, timeout).await.map_err(|err| {
        warn!(error = %err, "receipt polling stopped");
        err
    })?;
    let receipt = answer.receipt()?;
    debug!(
        node = %answer.node_account_id,
        status = %receipt.status,
        polls = answer.report.attempt_count(),
        "receipt final"
    );
    Ok(receipt)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id() -> TransactionId {
        TransactionId::new(AccountId::from_num(2), Timestamp::new(1_700_000_000, 0))
    }

    #[test]
    fn receipt_converts_created_entities() {
        let wire = v1::TransactionReceipt {
            status: Status::Success.code(),
            topic_id: Some(TopicId::from_num(1_001).into()),
            topic_sequence_number: 4,
            ..Default::default()
        };
        let receipt = TransactionReceipt::from_wire(wire).expect("receipt");
        assert_eq!(receipt.topic_id, Some(TopicId::from_num(1_001)));
        assert_eq!(receipt.topic_sequence_number, 4);
        assert_eq!(receipt.account_id, None);
        assert!(receipt.clone().validate_status(id()).is_ok());
    }

    #[test]
    fn failed_receipt_carries_status_and_id() {
        let wire = v1::TransactionReceipt {
            status: Status::InsufficientPayerBalance.code(),
            ..Default::default()
        };
        let receipt = TransactionReceipt::from_wire(wire).expect("receipt");
        assert_eq!(
            receipt.validate_status(id()),
            Err(Error::ReceiptStatus {
                status: Status::InsufficientPayerBalance,
                transaction_id: id(),
            })
        );
    }

    #[test]
    fn unknown_receipt_status_is_reported() {
        let wire = v1::TransactionReceipt {
            status: 99_999,
            ..Default::default()
        };
        assert_eq!(
            TransactionReceipt::from_wire(wire),
            Err(Error::UnrecognizedStatus(99_999))
        );
    }

    #[test]
    fn record_keeps_transfers() {
        let wire = v1::TransactionRecord {
            receipt: Some(v1::TransactionReceipt {
                status: Status::Success.code(),
                ..Default::default()
            }),
            transaction_id: Some(id().into()),
            transaction_fee: 100_000,
            transfer_list: Some(v1::TransferList {
                account_amounts: vec![v1::AccountAmount {
                    account_id: Some(AccountId::from_num(3).into()),
                    amount: 5,
                }],
            }),
            ..Default::default()
        };
        let record = TransactionRecord::from_wire(wire).expect("record");
        assert_eq!(record.transaction_id, Some(id()));
        assert_eq!(record.transaction_fee, Hbar::from_tinybars(100_000));
        assert_eq!(record.transfers, vec![(AccountId::from_num(3), Hbar::from_tinybars(5))]);
    }
}
