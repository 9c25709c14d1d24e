//! Classification of network status codes.
//!
//! The table of retryable statuses is configuration: the defaults cover the
//! documented transient conditions and callers may replace them.

use std::collections::HashSet;

use ledger_types::Status;

/// How the engine reacts to a precheck status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrecheckClass {
    Accepted,
    /// Transient node condition; retried with backoff on another attempt.
    Retryable,
    /// The valid-start window passed; retried with a fresh transaction id when allowed.
    TransactionExpired,
    Fatal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusPolicy {
    retryable: HashSet<Status>,
    receipt_pending: HashSet<Status>,
}

pub const DEFAULT_RETRYABLE: &[Status] = &[
    Status::Busy,
    Status::PlatformNotActive,
    Status::PlatformTransactionNotCreated,
];

const RECEIPT_PENDING: &[Status] = &[
    Status::Unknown,
    Status::ReceiptNotFound,
    Status::RecordNotFound,
    Status::Ok,
];

impl Default for StatusPolicy {
    fn default() -> Self {
        Self::with_retryable(DEFAULT_RETRYABLE.iter().copied())
    }
}

impl StatusPolicy {
    pub fn with_retryable(retryable: impl IntoIterator<Item = Status>) -> Self {
        Self {
            retryable: retryable.into_iter().collect(),
            receipt_pending: RECEIPT_PENDING.iter().copied().collect(),
        }
    }

    pub fn classify_precheck(&self, status: Status) -> PrecheckClass {
        match status {
            Status::Ok => PrecheckClass::Accepted,
            Status::TransactionExpired => PrecheckClass::TransactionExpired,
            status if self.retryable.contains(&status) => PrecheckClass::Retryable,
            _ => PrecheckClass::Fatal,
        }
    }

    /// Whether a receipt or record status means "not final yet".
    pub fn is_receipt_pending(&self, status: Status) -> bool {
        self.receipt_pending.contains(&status) || self.retryable.contains(&status)
    }

    /// Whether a receipt or record query answered at precheck that the outcome is not known yet.
    pub fn is_outcome_unavailable(&self, status: Status) -> bool {
        status != Status::Ok && self.receipt_pending.contains(&status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_classification() {
        let policy = StatusPolicy::default();
        assert_eq!(policy.classify_precheck(Status::Ok), PrecheckClass::Accepted);
        assert_eq!(policy.classify_precheck(Status::Busy), PrecheckClass::Retryable);
        assert_eq!(
            policy.classify_precheck(Status::PlatformNotActive),
            PrecheckClass::Retryable
        );
        assert_eq!(
            policy.classify_precheck(Status::TransactionExpired),
            PrecheckClass::TransactionExpired
        );
        for fatal in [
            Status::InvalidSignature,
            Status::InsufficientTxFee,
            Status::DuplicateTransaction,
            Status::InvalidNodeAccount,
        ] {
            assert_eq!(policy.classify_precheck(fatal), PrecheckClass::Fatal);
        }
    }

    #[test]
    fn retryable_table_is_replaceable() {
        let policy = StatusPolicy::with_retryable([Status::DuplicateTransaction]);
        assert_eq!(
            policy.classify_precheck(Status::DuplicateTransaction),
            PrecheckClass::Retryable
        );
        assert_eq!(policy.classify_precheck(Status::Busy), PrecheckClass::Fatal);
    }

    #[test]
    fn receipt_not_found_is_pending() {
        let policy = StatusPolicy::default();
        assert!(policy.is_receipt_pending(Status::ReceiptNotFound));
        assert!(policy.is_receipt_pending(Status::Unknown));
        assert!(!policy.is_receipt_pending(Status::Success));
        assert!(!policy.is_receipt_pending(Status::InvalidSignature));
        assert!(policy.is_outcome_unavailable(Status::RecordNotFound));
        assert!(!policy.is_outcome_unavailable(Status::Ok));
        assert!(!policy.is_outcome_unavailable(Status::Busy));
    }
}
