//! Response codes reported by nodes, both at precheck and in receipts.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

macro_rules! statuses {
    ($($variant:ident = $code:literal => $name:literal,)+) => {
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
        #[repr(i32)]
        pub enum Status {
            $($variant = $code,)+
        }

        impl Status {
            pub const fn code(self) -> i32 {
                self as i32
            }

            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $name,)+
                }
            }
        }

        impl TryFrom<i32> for Status {
            type Error = ValidationError;

            fn try_from(value: i32) -> Result<Self, Self::Error> {
                match value {
                    $($code => Ok(Self::$variant),)+
                    other => Err(ValidationError::UnknownStatus(other)),
                }
            }
        }
    };
}

statuses! {
    Ok = 0 => "OK",
    InvalidTransaction = 1 => "INVALID_TRANSACTION",
    PayerAccountNotFound = 2 => "PAYER_ACCOUNT_NOT_FOUND",
    InvalidNodeAccount = 3 => "INVALID_NODE_ACCOUNT",
    TransactionExpired = 4 => "TRANSACTION_EXPIRED",
    InvalidTransactionStart = 5 => "INVALID_TRANSACTION_START",
    InvalidTransactionDuration = 6 => "INVALID_TRANSACTION_DURATION",
    InvalidSignature = 7 => "INVALID_SIGNATURE",
    MemoTooLong = 8 => "MEMO_TOO_LONG",
    InsufficientTxFee = 9 => "INSUFFICIENT_TX_FEE",
    InsufficientPayerBalance = 10 => "INSUFFICIENT_PAYER_BALANCE",
    DuplicateTransaction = 11 => "DUPLICATE_TRANSACTION",
    Busy = 12 => "BUSY",
    NotSupported = 13 => "NOT_SUPPORTED",
    InvalidFileId = 14 => "INVALID_FILE_ID",
    InvalidAccountId = 15 => "INVALID_ACCOUNT_ID",
    InvalidContractId = 16 => "INVALID_CONTRACT_ID",
    InvalidTransactionId = 17 => "INVALID_TRANSACTION_ID",
    ReceiptNotFound = 18 => "RECEIPT_NOT_FOUND",
    RecordNotFound = 19 => "RECORD_NOT_FOUND",
    InvalidSolidityId = 20 => "INVALID_SOLIDITY_ID",
    Unknown = 21 => "UNKNOWN",
    Success = 22 => "SUCCESS",
    FailInvalid = 23 => "FAIL_INVALID",
    FailFee = 24 => "FAIL_FEE",
    FailBalance = 25 => "FAIL_BALANCE",
    KeyRequired = 26 => "KEY_REQUIRED",
    BadEncoding = 27 => "BAD_ENCODING",
    InsufficientAccountBalance = 28 => "INSUFFICIENT_ACCOUNT_BALANCE",
    InvalidSolidityAddress = 29 => "INVALID_SOLIDITY_ADDRESS",
    InsufficientGas = 30 => "INSUFFICIENT_GAS",
    InvalidReceivingNodeAccount = 35 => "INVALID_RECEIVING_NODE_ACCOUNT",
    MissingQueryHeader = 36 => "MISSING_QUERY_HEADER",
    InvalidFeeSubmitted = 42 => "INVALID_FEE_SUBMITTED",
    InvalidPayerSignature = 43 => "INVALID_PAYER_SIGNATURE",
    InvalidAccountAmounts = 48 => "INVALID_ACCOUNT_AMOUNTS",
    EmptyTransactionBody = 49 => "EMPTY_TRANSACTION_BODY",
    InvalidTransactionBody = 50 => "INVALID_TRANSACTION_BODY",
    PlatformTransactionNotCreated = 64 => "PLATFORM_TRANSACTION_NOT_CREATED",
    PlatformNotActive = 94 => "PLATFORM_NOT_ACTIVE",
    InvalidTopicId = 150 => "INVALID_TOPIC_ID",
}

impl Status {
    pub fn is_success(self) -> bool {
        matches!(self, Self::Success | Self::Ok)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_map_both_ways() {
        assert_eq!(Status::try_from(12).expect("busy"), Status::Busy);
        assert_eq!(Status::ReceiptNotFound.code(), 18);
        assert!(matches!(
            Status::try_from(-7),
            Err(ValidationError::UnknownStatus(-7))
        ));
    }

    #[test]
    fn serde_uses_wire_names() {
        let json = serde_json::to_string(&Status::PlatformNotActive).expect("serialize");
        assert_eq!(json, "\"PLATFORM_NOT_ACTIVE\"");
        let parsed: Status = serde_json::from_str("\"BUSY\"").expect("deserialize");
        assert_eq!(parsed, Status::Busy);
    }
}
