use ledger_types::TransactionHash;
use sha2::{Digest, Sha384};

/// SHA-384 over the signed-transaction bytes exactly as submitted to a node.
pub fn transaction_hash(signed_transaction_bytes: &[u8]) -> TransactionHash {
    let digest = Sha384::digest(signed_transaction_bytes);
    let mut out = [0u8; TransactionHash::LEN];
    out.copy_from_slice(&digest);
    TransactionHash::new(out)
}
