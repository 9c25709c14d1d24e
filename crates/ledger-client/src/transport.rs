use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ledger_node_mock::{MockFault, MockNetwork};
use ledger_proto::ServiceMethod;
use thiserror::Error;

use crate::network::Node;

/// Error model for a single RPC.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("node unavailable: {0}")]
    Unavailable(String),
    #[error("request rejected: code={code}, message={message}")]
    Rejected { code: i32, message: String },
    #[error("internal transport error: {0}")]
    Internal(String),
}

impl TransportError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout | Self::Unavailable(_))
    }
}

/// One unary call to one node. Implementations may use gRPC or in-memory mocks.
///
/// `timeout` bounds this call only; the caller owns the overall deadline.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn call(
        &self,
        node: &Node,
        method: ServiceMethod,
        request: Vec<u8>,
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError>;
}

/// In-memory transport backed by `MockNetwork`, used by tests.
#[derive(Clone)]
pub struct MockTransport {
    network: Arc<Mutex<MockNetwork>>,
    latency: Duration,
}

impl MockTransport {
    pub fn new(network: MockNetwork) -> Self {
        Self {
            network: Arc::new(Mutex::new(network)),
            latency: Duration::ZERO,
        }
    }

    /// Simulated per-call latency. A latency above the call timeout yields `Timeout`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Runs `f` against the simulated network, e.g. to script nodes or inspect submissions.
    pub fn with_network<R>(
        &self,
        f: impl FnOnce(&mut MockNetwork) -> R,
    ) -> Result<R, TransportError> {
        let mut lock = self
            .network
            .lock()
            .map_err(|_| TransportError::Unavailable("mutex poisoned".to_string()))?;
        Ok(f(&mut lock))
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn call(
        &self,
        node: &Node,
        method: ServiceMethod,
        request: Vec<u8>,
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        if !self.latency.is_zero() {
            if self.latency > timeout {
                tokio::time::sleep(timeout).await;
                return Err(TransportError::Timeout);
            }
            tokio::time::sleep(self.latency).await;
        }

        let path = method.path();
        let account_id = node.account_id();
        let outcome = self.with_network(|network| network.handle(&account_id, &path, &request))?;
        match outcome {
            Ok(response) => Ok(response),
            Err(MockFault::Unavailable(message)) => Err(TransportError::Unavailable(message)),
            Err(MockFault::Timeout) => {
                tokio::time::sleep(timeout).await;
                Err(TransportError::Timeout)
            }
            Err(MockFault::Unimplemented(path)) => Err(TransportError::Rejected {
                code: 12,
                message: format!("unimplemented method {path}"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use ledger_node_mock::{LocalScenario, Scripted};
    use ledger_proto::{service, v1};
    use prost::Message;

    use super::*;

    fn node_for(scenario: &LocalScenario) -> Node {
        Node::new(scenario.node_ids[0], vec!["127.0.0.1:50211".to_string()])
    }

    fn balance_query() -> Vec<u8> {
        v1::Query {
            header: Some(v1::QueryHeader::default()),
            kind: "cryptoGetAccountBalance".to_string(),
            fields: Default::default(),
        }
        .encode_to_vec()
    }

    #[tokio::test]
    async fn maps_mock_faults_to_transport_errors() {
        let scenario = LocalScenario::new(1);
        let node = node_for(&scenario);
        let transport = MockTransport::new(scenario.network);
        transport
            .with_network(|network| {
                network.script(&node.account_id(), [Scripted::Unavailable]);
            })
            .expect("lock");

        let first = transport
            .call(&node, service::CRYPTO_GET_BALANCE, balance_query(), Duration::from_secs(1))
            .await;
        assert!(matches!(first, Err(TransportError::Unavailable(_))));

        let second = transport
            .call(&node, service::CRYPTO_GET_BALANCE, balance_query(), Duration::from_secs(1))
            .await
            .expect("second call succeeds");
        let response = v1::Response::decode(second.as_slice()).expect("decode");
        assert_eq!(
            response.header.expect("header").node_transaction_precheck_code,
            0
        );
    }

    #[tokio::test(start_paused = true)]
    async fn latency_above_timeout_is_a_timeout() {
        let scenario = LocalScenario::new(1);
        let node = node_for(&scenario);
        let transport = MockTransport::new(scenario.network).with_latency(Duration::from_secs(5));
        let started = tokio::time::Instant::now();

        let result = transport
            .call(&node, service::CRYPTO_GET_BALANCE, balance_query(), Duration::from_secs(2))
            .await;
        assert_eq!(result, Err(TransportError::Timeout));
        assert_eq!(started.elapsed(), Duration::from_secs(2));
    }
}
