//! Network topology and per-node health bookkeeping.
//!
//! Each node keeps its own health record behind its own lock, so backoff
//! updates from one execution never contend with executions talking to
//! other nodes.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use ledger_types::{AccountId, ValidationError};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{BuildError, Error};

/// Backoff applied to a node after failed attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    #[serde(with = "crate::config::duration_ms")]
    pub min_backoff: Duration,
    #[serde(with = "crate::config::duration_ms")]
    pub max_backoff: Duration,
    /// Upper bound of the random delay added to every retry sleep.
    #[serde(with = "crate::config::duration_ms")]
    pub jitter: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            min_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(8),
            jitter: Duration::from_millis(50),
        }
    }
}

/// Snapshot of one node's health record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NodeHealth {
    pub consecutive_failures: u32,
    /// Backoff applied by the most recent failure; zero while healthy.
    pub backoff: Duration,
    /// The node is skipped by selection until this instant.
    pub usable_at: Option<Instant>,
    pub total_failures: u64,
    pub total_successes: u64,
}

impl NodeHealth {
    pub fn is_usable(&self, now: Instant) -> bool {
        self.usable_at.map_or(true, |at| at <= now)
    }
}

#[derive(Debug)]
pub struct Node {
    account_id: AccountId,
    addresses: Vec<String>,
    health: Mutex<NodeHealth>,
}

impl Node {
    pub fn new(account_id: AccountId, addresses: Vec<String>) -> Self {
        Self {
            account_id,
            addresses,
            health: Mutex::new(NodeHealth::default()),
        }
    }

    pub fn account_id(&self) -> AccountId {
        self.account_id
    }

    /// `host:port` endpoints, in preference order.
    pub fn addresses(&self) -> &[String] {
        &self.addresses
    }

    pub fn health(&self) -> NodeHealth {
        *self.health.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update<R>(&self, f: impl FnOnce(&mut NodeHealth) -> R) -> R {
        let mut health = self.health.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut health)
    }
}

/// Well-known networks with published address books.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum NetworkName {
    Mainnet,
    Testnet,
    Previewnet,
    Local,
}

impl FromStr for NetworkName {
    type Err = ValidationError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "mainnet" => Ok(Self::Mainnet),
            "testnet" => Ok(Self::Testnet),
            "previewnet" => Ok(Self::Previewnet),
            "local" | "localhost" => Ok(Self::Local),
            _ => Err(ValidationError::Parse {
                kind: "network name",
                input: name.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for NetworkName {
    type Error = ValidationError;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        name.parse()
    }
}

impl NetworkName {

    /// `(address, node account number)` pairs.
    fn nodes(self) -> Vec<(String, u64)> {
        match self {
            Self::Mainnet => [
                "35.237.200.180",
                "35.186.191.247",
                "35.192.2.25",
                "35.199.161.108",
                "35.203.82.240",
                "35.236.5.219",
                "35.197.192.225",
                "35.242.233.154",
                "35.240.118.96",
                "35.204.86.32",
            ]
            .iter()
            .zip(3u64..)
            .map(|(host, num)| (format!("{host}:50211"), num))
            .collect(),
            Self::Testnet => (0u64..7)
                .map(|i| (format!("{i}.testnet.hedera.com:50211"), 3 + i))
                .collect(),
            Self::Previewnet => (0u64..7)
                .map(|i| (format!("{i}.previewnet.hedera.com:50211"), 3 + i))
                .collect(),
            Self::Local => vec![("127.0.0.1:50211".to_string(), 3)],
        }
    }

    fn mirror_nodes(self) -> Vec<String> {
        let host = match self {
            Self::Mainnet => "mainnet-public.mirrornode.hedera.com:443",
            Self::Testnet => "testnet.mirrornode.hedera.com:443",
            Self::Previewnet => "previewnet.mirrornode.hedera.com:443",
            Self::Local => "127.0.0.1:5600",
        };
        vec![host.to_string()]
    }
}

/// The consensus nodes a client may talk to, plus the mirror node list.
///
/// Built once and shared (behind an `Arc`) by every execution.
#[derive(Debug)]
pub struct Network {
    nodes: Vec<Node>,
    index: HashMap<AccountId, usize>,
    mirror_nodes: Vec<String>,
}

impl Network {
    pub fn new(nodes: impl IntoIterator<Item = (AccountId, Vec<String>)>) -> Self {
        let mut network = Self {
            nodes: Vec::new(),
            index: HashMap::new(),
            mirror_nodes: Vec::new(),
        };
        for (account_id, addresses) in nodes {
            match network.index.get(&account_id) {
                Some(&position) => network.nodes[position].addresses.extend(addresses),
                None => {
                    network.index.insert(account_id, network.nodes.len());
                    network.nodes.push(Node::new(account_id, addresses));
                }
            }
        }
        network
    }

    /// Builds a network from a `"host:port" -> "shard.realm.num"` address map.
    pub fn from_addresses<'a>(
        addresses: impl IntoIterator<Item = (&'a String, &'a String)>,
    ) -> Result<Self, Error> {
        let nodes = addresses
            .into_iter()
            .map(|(address, account)| {
                let account_id: AccountId = account.parse()?;
                Ok((account_id, vec![address.clone()]))
            })
            .collect::<Result<Vec<_>, Error>>()?;
        if nodes.is_empty() {
            return Err(BuildError::NoNodes.into());
        }
        Ok(Self::new(nodes))
    }

    pub fn for_name(name: NetworkName) -> Self {
        Self::new(
            name.nodes()
                .into_iter()
                .map(|(address, num)| (AccountId::from_num(num), vec![address])),
        )
        .with_mirror_nodes(name.mirror_nodes())
    }

    pub fn with_mirror_nodes(mut self, mirror_nodes: Vec<String>) -> Self {
        self.mirror_nodes = mirror_nodes;
        self
    }

    pub fn mirror_nodes(&self) -> &[String] {
        &self.mirror_nodes
    }

    pub fn node_ids(&self) -> Vec<AccountId> {
        self.nodes.iter().map(Node::account_id).collect()
    }

    pub fn node(&self, account_id: &AccountId) -> Option<&Node> {
        self.index
            .get(account_id)
            .map(|&position| &self.nodes[position])
    }

    pub fn contains(&self, account_id: &AccountId) -> bool {
        self.index.contains_key(account_id)
    }

    pub fn health(&self, account_id: &AccountId) -> Option<NodeHealth> {
        self.node(account_id).map(Node::health)
    }

    /// Picks the node for the next attempt.
    ///
    /// `candidates` restricts the choice (empty means every node). Among the
    /// usable candidates with the fewest consecutive failures, `preferred`
    /// wins if present, otherwise one is drawn at random. When every candidate
    /// is backing off, the one that becomes usable first is returned.
    pub fn select_node(
        &self,
        candidates: &[AccountId],
        preferred: Option<AccountId>,
    ) -> Result<&Node, BuildError> {
        let pool: Vec<(&Node, NodeHealth)> = if candidates.is_empty() {
            self.nodes.iter().map(|node| (node, node.health())).collect()
        } else {
            candidates
                .iter()
                .map(|id| {
                    self.node(id)
                        .map(|node| (node, node.health()))
                        .ok_or(BuildError::UnknownNode(*id))
                })
                .collect::<Result<_, _>>()?
        };

        let now = Instant::now();
        let usable: Vec<&(&Node, NodeHealth)> =
            pool.iter().filter(|(_, health)| health.is_usable(now)).collect();

        if let Some(fewest) = usable
            .iter()
            .map(|(_, health)| health.consecutive_failures)
            .min()
        {
            let best: Vec<&Node> = usable
                .iter()
                .filter(|(_, health)| health.consecutive_failures == fewest)
                .map(|(node, _)| *node)
                .collect();
            let preferred =
                preferred.and_then(|id| best.iter().copied().find(|node| node.account_id == id));
            if let Some(node) = preferred {
                return Ok(node);
            }
            return best
                .choose(&mut rand::thread_rng())
                .copied()
                .ok_or(BuildError::NoNodes);
        }

        pool.iter()
            .min_by_key(|(_, health)| health.usable_at)
            .map(|(node, _)| *node)
            .ok_or(BuildError::NoNodes)
    }

    /// Doubles the node's backoff (bounded) and parks it until the backoff elapses.
    pub fn record_failure(&self, account_id: &AccountId, backoff: &BackoffConfig) -> Duration {
        let Some(node) = self.node(account_id) else {
            return backoff.min_backoff;
        };
        let health = node.update(|health| {
            health.consecutive_failures += 1;
            health.total_failures += 1;
            health.backoff = if health.backoff.is_zero() {
                backoff.min_backoff
            } else {
                (health.backoff * 2).min(backoff.max_backoff)
            };
            health.usable_at = Some(Instant::now() + health.backoff);
            *health
        });
        warn!(
            node = %account_id,
            consecutive_failures = health.consecutive_failures,
            backoff_ms = health.backoff.as_millis() as u64,
            "node marked unhealthy"
        );
        health.backoff
    }

    pub fn record_success(&self, account_id: &AccountId) {
        let Some(node) = self.node(account_id) else {
            return;
        };
        let recovered = node.update(|health| {
            let recovered = health.consecutive_failures > 0;
            health.consecutive_failures = 0;
            health.backoff = Duration::ZERO;
            health.usable_at = None;
            health.total_successes += 1;
            recovered
        });
        if recovered {
            debug!(node = %account_id, "node healthy again");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_nodes() -> Network {
        Network::new((3..6).map(|num| (AccountId::from_num(num), vec![format!("n{num}:50211")])))
    }

    #[test]
    fn backoff_doubles_up_to_ceiling_and_resets_on_success() {
        let network = three_nodes();
        let node = AccountId::from_num(3);
        let backoff = BackoffConfig::default();
        let backoffs: Vec<u64> = (0..7)
            .map(|_| network.record_failure(&node, &backoff).as_millis() as u64)
            .collect();
        assert_eq!(backoffs, vec![250, 500, 1_000, 2_000, 4_000, 8_000, 8_000]);

        network.record_success(&node);
        let health = network.health(&node).expect("known node");
        assert_eq!(health.consecutive_failures, 0);
        assert_eq!(health.backoff, Duration::ZERO);
        assert_eq!(health.usable_at, None);
        assert_eq!((health.total_failures, health.total_successes), (7, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn selection_skips_nodes_that_are_backing_off() {
        let network = three_nodes();
        let sick = AccountId::from_num(3);
        network.record_failure(&sick, &BackoffConfig::default());

        for _ in 0..20 {
            let node = network.select_node(&[], None).expect("node");
            assert_ne!(node.account_id(), sick);
        }
        let preferred = network
            .select_node(&[], Some(sick))
            .expect("node")
            .account_id();
        assert_ne!(preferred, sick);

        tokio::time::advance(Duration::from_millis(250)).await;
        let node = network.select_node(&[sick], None).expect("node");
        assert_eq!(node.account_id(), sick);
    }

    #[tokio::test(start_paused = true)]
    async fn falls_back_to_earliest_usable_when_all_are_backing_off() {
        let network = three_nodes();
        let (a, b) = (AccountId::from_num(3), AccountId::from_num(4));
        let backoff = BackoffConfig::default();
        network.record_failure(&a, &backoff);
        network.record_failure(&a, &backoff);
        network.record_failure(&b, &backoff);

        let node = network.select_node(&[a, b], None).expect("node");
        assert_eq!(node.account_id(), b);
    }

    #[test]
    fn preferred_node_wins_among_equally_healthy() {
        let network = three_nodes();
        let preferred = AccountId::from_num(5);
        for _ in 0..10 {
            let node = network.select_node(&[], Some(preferred)).expect("node");
            assert_eq!(node.account_id(), preferred);
        }
    }

    #[test]
    fn unknown_candidate_is_a_build_error() {
        let network = three_nodes();
        let stranger = AccountId::from_num(99);
        assert_eq!(
            network.select_node(&[stranger], None).map(Node::account_id),
            Err(BuildError::UnknownNode(stranger))
        );
    }

    #[test]
    fn named_networks_have_address_books() {
        let testnet = Network::for_name(NetworkName::Testnet);
        assert_eq!(testnet.node_ids().len(), 7);
        assert_eq!(
            testnet.node(&AccountId::from_num(3)).expect("node").addresses(),
            ["0.testnet.hedera.com:50211".to_string()]
        );
        assert_eq!(testnet.mirror_nodes().len(), 1);
        assert_eq!("localhost".parse::<NetworkName>(), Ok(NetworkName::Local));
        assert!("devnet".parse::<NetworkName>().is_err());
    }
}
