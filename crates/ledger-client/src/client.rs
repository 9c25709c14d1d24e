//! Client: the shared network, the transport and the operator every request runs with.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use ledger_crypto::PrivateKey;
use ledger_types::{AccountId, Signer};
use tracing::{info, warn};

use crate::config::{ClientConfig, ExecutionConfig, NetworkConfig};
use crate::error::{BuildError, Error};
use crate::grpc::GrpcTransport;
use crate::network::{Network, NetworkName};
use crate::query::Query;
use crate::transport::Transport;

/// Default payer and signer of transactions and query payments.
#[derive(Clone)]
pub struct Operator {
    pub account_id: AccountId,
    pub signer: Arc<dyn Signer>,
}

impl fmt::Debug for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operator")
            .field("account_id", &self.account_id)
            .field("public_key", &self.signer.public_key())
            .finish()
    }
}

/// Cheap to clone; clones share the network and its node health.
#[derive(Clone)]
pub struct Client {
    network: Arc<Network>,
    transport: Arc<dyn Transport>,
    operator: Option<Operator>,
    config: ExecutionConfig,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("nodes", &self.network.node_ids())
            .field("operator", &self.operator)
            .field("config", &self.config)
            .finish()
    }
}

impl Client {
    pub fn new(network: Network, transport: Arc<dyn Transport>) -> Self {
        Self {
            network: Arc::new(network),
            transport,
            operator: None,
            config: ExecutionConfig::default(),
        }
    }

    /// Client for a named network over gRPC.
    pub fn for_name(name: NetworkName) -> Self {
        Self::new(Network::for_name(name), Arc::new(GrpcTransport::new()))
    }

    pub fn from_config(config: ClientConfig) -> Result<Self, Error> {
        let network = match &config.network {
            NetworkConfig::Named(name) => Network::for_name(*name),
            NetworkConfig::Addresses(addresses) => Network::from_addresses(addresses)?,
        };
        let network = if config.mirror_network.is_empty() {
            network
        } else {
            network.with_mirror_nodes(config.mirror_network.clone())
        };
        let mut client = Self::new(network, Arc::new(GrpcTransport::new()))
            .with_execution_config(config.execution);
        if let Some(operator) = config.operator {
            let key: PrivateKey = operator
                .private_key
                .parse()
                .map_err(|err| Error::Config(format!("operator key: {err}")))?;
            client = client.with_operator(operator.account_id, Arc::new(key));
        }
        info!(nodes = client.network.node_ids().len(), "client configured");
        Ok(client)
    }

    pub fn from_config_json(json: &str) -> Result<Self, Error> {
        Self::from_config(ClientConfig::from_json(json)?)
    }

    pub fn with_operator(mut self, account_id: AccountId, signer: Arc<dyn Signer>) -> Self {
        self.operator = Some(Operator { account_id, signer });
        self
    }

    pub fn with_execution_config(mut self, config: ExecutionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    pub fn operator(&self) -> Option<&Operator> {
        self.operator.as_ref()
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    /// One free balance query pinned to `node`, without retries.
    pub async fn ping(&self, node: AccountId) -> Result<Duration, Error> {
        if !self.network.contains(&node) {
            return Err(BuildError::UnknownNode(node).into());
        }
        let account = self.operator.as_ref().map_or(node, |op| op.account_id);
        let started = tokio::time::Instant::now();
        Query::account_balance(account)
            .with_node_account_ids(vec![node])
            .with_max_attempts(1)
            .execute_with_timeout(self, self.config.grpc_deadline)
            .await?;
        Ok(started.elapsed())
    }

    /// Pings every node concurrently and reports each outcome.
    pub async fn ping_all(&self) -> Vec<(AccountId, Result<Duration, Error>)> {
        let nodes = self.network.node_ids();
        let results = join_all(nodes.iter().map(|node| self.ping(*node))).await;
        let outcomes: Vec<_> = nodes.into_iter().zip(results).collect();
        for (node, result) in &outcomes {
            if let Err(err) = result {
                warn!(%node, error = %err, "ping failed");
            }
        }
        outcomes
    }
}

#[cfg(test)]
mod tests {
    use ledger_node_mock::LocalScenario;

    use super::*;
    use crate::transport::MockTransport;

    fn local(nodes: u64) -> (Client, Vec<AccountId>) {
        let scenario = LocalScenario::new(nodes);
        let node_ids = scenario.node_ids.clone();
        let network = Network::new(node_ids.iter().map(|id| (*id, Vec::new())));
        let client = Client::new(network, Arc::new(MockTransport::new(scenario.network)))
            .with_operator(scenario.operator_id, Arc::new(scenario.operator_key));
        (client, node_ids)
    }

    #[test]
    fn builds_from_json_config() {
        let json = r#"{
            "network": { "127.0.0.1:50211": "0.0.3", "127.0.0.1:50212": "0.0.4" },
            "operator": {
                "account_id": "0.0.2",
                "private_key": "0202020202020202020202020202020202020202020202020202020202020202"
            },
            "execution": { "max_attempts": 3 }
        }"#;
        let client = Client::from_config_json(json).expect("config");
        assert_eq!(
            client.network().node_ids().len(),
            2,
            "one node per address entry"
        );
        assert_eq!(client.config().max_attempts, 3);
        assert_eq!(
            client.operator().map(|op| op.account_id),
            Some(AccountId::from_num(2))
        );
    }

    #[test]
    fn bad_operator_key_is_a_config_error() {
        let json = r#"{ "network": "testnet",
            "operator": { "account_id": "0.0.2", "private_key": "zz" } }"#;
        assert!(matches!(Client::from_config_json(json), Err(Error::Config(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn ping_reaches_every_node() {
        let (client, nodes) = local(3);
        let outcomes = client.ping_all().await;
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes.iter().all(|(_, result)| result.is_ok()));
        assert!(matches!(
            client.ping(AccountId::from_num(99)).await,
            Err(Error::Build(BuildError::UnknownNode(_)))
        ));
        assert!(nodes
            .iter()
            .all(|node| client.network().health(node).expect("known").total_successes == 1));
    }
}
