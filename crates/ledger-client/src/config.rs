use std::collections::BTreeMap;
use std::time::Duration;

use ledger_types::{AccountId, Hbar, Status};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::network::{BackoffConfig, NetworkName};
use crate::policy::{StatusPolicy, DEFAULT_RETRYABLE};

/// Serde helpers for durations written as whole milliseconds.
pub(crate) mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Knobs of the execution engine shared by every request a client runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Attempts that reached (or failed to reach) a node, per chunk or query.
    pub max_attempts: usize,
    #[serde(flatten)]
    pub backoff: BackoffConfig,
    /// Overall budget of one `execute` call, chunks and retries included.
    #[serde(with = "duration_ms")]
    pub request_timeout: Duration,
    /// Upper bound of a single RPC.
    #[serde(with = "duration_ms")]
    pub grpc_deadline: Duration,
    #[serde(with = "duration_ms")]
    pub receipt_poll_interval: Duration,
    pub default_max_transaction_fee: Hbar,
    pub default_max_query_payment: Hbar,
    pub regenerate_transaction_id: bool,
    /// Replaces the default set of retryable precheck statuses.
    pub retryable_statuses: Option<Vec<Status>>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            backoff: BackoffConfig::default(),
            request_timeout: Duration::from_secs(120),
            grpc_deadline: Duration::from_secs(10),
            receipt_poll_interval: Duration::from_millis(250),
            default_max_transaction_fee: Hbar::new(2),
            default_max_query_payment: Hbar::new(1),
            regenerate_transaction_id: true,
            retryable_statuses: None,
        }
    }
}

impl ExecutionConfig {
    pub fn status_policy(&self) -> StatusPolicy {
        match &self.retryable_statuses {
            Some(statuses) => StatusPolicy::with_retryable(statuses.iter().copied()),
            None => StatusPolicy::with_retryable(DEFAULT_RETRYABLE.iter().copied()),
        }
    }
}

/// Either a named network or an explicit `"host:port" -> "shard.realm.num"` map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NetworkConfig {
    Named(NetworkName),
    Addresses(BTreeMap<String, String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorConfig {
    pub account_id: AccountId,
    /// DER-prefixed hex (ed25519 or ecdsa); bare hex is read as ed25519.
    pub private_key: String,
}

/// Client configuration as loaded from a JSON file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    pub network: NetworkConfig,
    #[serde(default)]
    pub mirror_network: Vec<String>,
    #[serde(default)]
    pub operator: Option<OperatorConfig>,
    #[serde(default)]
    pub execution: ExecutionConfig,
}

impl ClientConfig {
    pub fn from_json(json: &str) -> Result<Self, Error> {
        serde_json::from_str(json).map_err(|err| Error::Config(err.to_string()))
    }

    pub fn for_name(name: NetworkName) -> Self {
        Self {
            network: NetworkConfig::Named(name),
            mirror_network: Vec::new(),
            operator: None,
            execution: ExecutionConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_address_map_with_defaults() {
        let config = ClientConfig::from_json(
            r#"{
                "network": { "127.0.0.1:50211": "0.0.3", "127.0.0.1:50212": "0.0.4" },
                "operator": {
                    "account_id": "0.0.2",
                    "private_key": "302e020100300506032b6570042204200202020202020202020202020202020202020202020202020202020202020202"
                },
                "execution": { "max_attempts": 4, "min_backoff": 100, "retryable_statuses": ["BUSY"] }
            }"#,
        )
        .expect("valid config");

        let NetworkConfig::Addresses(addresses) = &config.network else {
            panic!("expected an address map");
        };
        assert_eq!(addresses.len(), 2);
        assert_eq!(
            config.operator.as_ref().map(|op| op.account_id),
            Some(AccountId::from_num(2))
        );
        assert_eq!(config.execution.max_attempts, 4);
        assert_eq!(config.execution.backoff.min_backoff, Duration::from_millis(100));
        assert_eq!(config.execution.backoff.max_backoff, Duration::from_secs(8));
        assert_eq!(config.execution.request_timeout, Duration::from_secs(120));
        assert_eq!(config.execution.retryable_statuses, Some(vec![Status::Busy]));
    }

    #[test]
    fn parses_named_network() {
        let config = ClientConfig::from_json(r#"{ "network": "testnet" }"#).expect("valid");
        assert_eq!(config.network, NetworkConfig::Named(NetworkName::Testnet));
        assert_eq!(config.execution, ExecutionConfig::default());
    }

    #[test]
    fn named_network_accepts_localhost_alias() {
        let config = ClientConfig::from_json(r#"{ "network": "localhost" }"#).expect("valid");
        assert_eq!(config.network, NetworkConfig::Named(NetworkName::Local));
        assert!(matches!(
            ClientConfig::from_json(r#"{ "network": "devnet" }"#),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn rejects_unknown_network_shape() {
        assert!(matches!(
            ClientConfig::from_json(r#"{ "network": 7 }"#),
            Err(Error::Config(_))
        ));
    }
}
