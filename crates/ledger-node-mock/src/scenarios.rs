use ledger_crypto::Ed25519PrivateKey;
use ledger_types::{AccountId, Signer, TINYBARS_PER_HBAR};

use crate::mock_network::MockNetwork;

pub const OPERATOR_SEED: [u8; 32] = [0x02; 32];
pub const OPERATOR_BALANCE: i64 = 10_000 * TINYBARS_PER_HBAR;

/// A local network of nodes `0.0.3 ..` with a funded operator account `0.0.2`.
#[derive(Debug, Clone)]
pub struct LocalScenario {
    pub network: MockNetwork,
    pub operator_id: AccountId,
    pub operator_key: Ed25519PrivateKey,
    pub node_ids: Vec<AccountId>,
}

impl LocalScenario {
    pub fn new(node_count: u64) -> Self {
        let node_ids: Vec<AccountId> =
            (0..node_count).map(|i| AccountId::from_num(3 + i)).collect();
        let operator_id = AccountId::from_num(2);
        let operator_key = Ed25519PrivateKey::from_seed(OPERATOR_SEED);

        let mut network = MockNetwork::new(node_ids.iter().copied());
        network.add_account(operator_id, operator_key.public_key(), OPERATOR_BALANCE);
        for node in &node_ids {
            network.ledger.balances.insert(*node, 0);
        }

        Self {
            network,
            operator_id,
            operator_key,
            node_ids,
        }
    }
}
