//! Ed25519 and ECDSA(secp256k1) keys, signature checks and transaction hashing.

pub mod assembler;
pub mod ecdsa;
pub mod ed25519;
pub mod hashing;
pub mod private_key;

pub use assembler::SignatureSet;
pub use ecdsa::EcdsaPrivateKey;
pub use ed25519::Ed25519PrivateKey;
pub use hashing::transaction_hash;
pub use private_key::PrivateKey;

use ledger_types::{CryptoError, PublicKey};

/// Checks `signature` over `message` for either supported algorithm.
pub fn verify(public_key: &PublicKey, message: &[u8], signature: &[u8]) -> Result<(), CryptoError> {
    match public_key {
        PublicKey::Ed25519(key) => ed25519::verify(key, message, signature),
        PublicKey::EcdsaSecp256k1(key) => ecdsa::verify(key, message, signature),
    }
}
