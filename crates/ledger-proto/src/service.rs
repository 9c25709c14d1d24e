//! RPC method table. Each entry is addressed as `/proto.<Service>/<method>`.

use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ServiceMethod {
    pub service: &'static str,
    pub method: &'static str,
    /// Query methods carry a `Query` and answer with a `Response`; the rest
    /// carry a `Transaction` and answer with a `TransactionResponse`.
    pub query: bool,
}

impl ServiceMethod {
    const fn transaction(service: &'static str, method: &'static str) -> Self {
        Self {
            service,
            method,
            query: false,
        }
    }

    const fn query(service: &'static str, method: &'static str) -> Self {
        Self {
            service,
            method,
            query: true,
        }
    }

    pub fn path(&self) -> String {
        format!("/proto.{}/{}", self.service, self.method)
    }

    pub fn lookup(path: &str) -> Option<Self> {
        ALL.iter().copied().find(|method| method.path() == path)
    }
}

impl fmt::Display for ServiceMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.service, self.method)
    }
}

pub const CRYPTO_TRANSFER: ServiceMethod =
    ServiceMethod::transaction("CryptoService", "cryptoTransfer");
pub const CRYPTO_CREATE_ACCOUNT: ServiceMethod =
    ServiceMethod::transaction("CryptoService", "createAccount");
pub const CRYPTO_UPDATE_ACCOUNT: ServiceMethod =
    ServiceMethod::transaction("CryptoService", "updateAccount");
pub const CONSENSUS_CREATE_TOPIC: ServiceMethod =
    ServiceMethod::transaction("ConsensusService", "createTopic");
pub const CONSENSUS_SUBMIT_MESSAGE: ServiceMethod =
    ServiceMethod::transaction("ConsensusService", "submitMessage");
pub const FILE_CREATE: ServiceMethod = ServiceMethod::transaction("FileService", "createFile");
pub const FILE_APPEND: ServiceMethod = ServiceMethod::transaction("FileService", "appendContent");
pub const TOKEN_MINT: ServiceMethod = ServiceMethod::transaction("TokenService", "mintToken");
pub const SCHEDULE_SIGN: ServiceMethod =
    ServiceMethod::transaction("ScheduleService", "signSchedule");

pub const CRYPTO_GET_BALANCE: ServiceMethod =
    ServiceMethod::query("CryptoService", "cryptoGetBalance");
pub const CRYPTO_GET_INFO: ServiceMethod = ServiceMethod::query("CryptoService", "getAccountInfo");
pub const TRANSACTION_GET_RECEIPT: ServiceMethod =
    ServiceMethod::query("CryptoService", "getTransactionReceipts");
pub const TRANSACTION_GET_RECORD: ServiceMethod =
    ServiceMethod::query("CryptoService", "getTxRecordByTxID");
pub const CONSENSUS_GET_TOPIC_INFO: ServiceMethod =
    ServiceMethod::query("ConsensusService", "getTopicInfo");
pub const FILE_GET_CONTENTS: ServiceMethod = ServiceMethod::query("FileService", "getFileContent");

const ALL: &[ServiceMethod] = &[
    CRYPTO_TRANSFER,
    CRYPTO_CREATE_ACCOUNT,
    CRYPTO_UPDATE_ACCOUNT,
    CONSENSUS_CREATE_TOPIC,
    CONSENSUS_SUBMIT_MESSAGE,
    FILE_CREATE,
    FILE_APPEND,
    TOKEN_MINT,
    SCHEDULE_SIGN,
    CRYPTO_GET_BALANCE,
    CRYPTO_GET_INFO,
    TRANSACTION_GET_RECEIPT,
    TRANSACTION_GET_RECORD,
    CONSENSUS_GET_TOPIC_INFO,
    FILE_GET_CONTENTS,
];
