use ledger_types::{AccountId, CryptoError, Hbar, Status, TransactionId, ValidationError};
use thiserror::Error;

use crate::transport::TransportError;

/// Problems detected while building, freezing or signing a request. Never retried.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    #[error("no payer account: set a transaction id, a payer or a client operator")]
    MissingPayer,
    #[error("paid query requires a client operator")]
    MissingOperator,
    #[error("no node candidates available")]
    NoNodes,
    #[error("node {0} is not part of the network")]
    UnknownNode(AccountId),
    #[error("chunk size must be positive")]
    ZeroChunkSize,
    #[error("payload needs {required} chunks, limit is {max}")]
    ChunkLimitExceeded { required: usize, max: usize },
    #[error("manual signatures need a transaction with exactly one node and one chunk")]
    AmbiguousSignatureTarget,
    #[error("transaction was already executed")]
    AlreadyExecuted,
    #[error("payload given for `{0}`, which carries no payload")]
    UnexpectedPayload(&'static str),
    #[error("invalid serialized transaction: {0}")]
    Decode(String),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// Top-level error of every network-facing call.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error(transparent)]
    Build(#[from] BuildError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("transient precheck status {status} for {transaction_id:?}")]
    RetryablePrecheck {
        status: Status,
        transaction_id: Option<TransactionId>,
    },
    #[error("precheck failed with {status} for {transaction_id:?}")]
    PrecheckStatus {
        status: Status,
        transaction_id: Option<TransactionId>,
    },
    #[error("outcome of {transaction_id:?} not final yet ({status})")]
    ReceiptPending {
        status: Status,
        transaction_id: Option<TransactionId>,
    },
    #[error("transaction {transaction_id} failed with {status}")]
    ReceiptStatus {
        status: Status,
        transaction_id: TransactionId,
    },
    #[error("gave up after {attempts} attempts{}", last_error_suffix(.last_error))]
    Exhausted {
        attempts: usize,
        last_error: Option<Box<Error>>,
    },
    #[error("request deadline elapsed")]
    TimedOut,
    #[error("query cost {cost} exceeds the maximum payment {max}")]
    MaxQueryPaymentExceeded { cost: Hbar, max: Hbar },
    #[error("node answered with unrecognized status code {0}")]
    UnrecognizedStatus(i32),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("malformed response: {0}")]
    Decode(String),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

fn last_error_suffix(last_error: &Option<Box<Error>>) -> String {
    last_error
        .as_ref()
        .map(|error| format!(", last error: {error}"))
        .unwrap_or_default()
}

impl Error {
    /// Whether the retry loop may suppress this error and try again.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(error) => error.is_retryable(),
            Self::RetryablePrecheck { .. } | Self::ReceiptPending { .. } => true,
            _ => false,
        }
    }

    /// Network-reported status carried by this error, if any.
    pub fn status(&self) -> Option<Status> {
        match self {
            Self::RetryablePrecheck { status, .. }
            | Self::PrecheckStatus { status, .. }
            | Self::ReceiptPending { status, .. }
            | Self::ReceiptStatus { status, .. } => Some(*status),
            Self::Exhausted {
                last_error: Some(error),
                ..
            } => error.status(),
            _ => None,
        }
    }
}

impl From<ValidationError> for Error {
    fn from(error: ValidationError) -> Self {
        Self::Build(BuildError::Validation(error))
    }
}

impl From<prost::DecodeError> for Error {
    fn from(error: prost::DecodeError) -> Self {
        Self::Decode(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_classes_are_retryable() {
        assert!(Error::Transport(TransportError::Timeout).is_retryable());
        assert!(!Error::Transport(TransportError::Internal("x".into())).is_retryable());
        assert!(Error::RetryablePrecheck {
            status: Status::Busy,
            transaction_id: None
        }
        .is_retryable());
        assert!(!Error::PrecheckStatus {
            status: Status::InvalidSignature,
            transaction_id: None
        }
        .is_retryable());
        assert!(!Error::Build(BuildError::NoNodes).is_retryable());
        assert!(!Error::TimedOut.is_retryable());
    }

    #[test]
    fn exhausted_reports_last_status() {
        let error = Error::Exhausted {
            attempts: 3,
            last_error: Some(Box::new(Error::RetryablePrecheck {
                status: Status::Busy,
                transaction_id: None,
            })),
        };
        assert_eq!(error.status(), Some(Status::Busy));
        assert!(error.to_string().starts_with("gave up after 3 attempts, last error:"));
    }
}
