//! Signing capability shared by every key type.

use crate::{
    error::CryptoError,
    key::{KeyAlgorithm, PublicKey},
};

/// Produces signatures over exact bytes on behalf of one public key.
///
/// Implementations must sign `message` itself; any pre-hashing the algorithm
/// requires (keccak-256 for secp256k1) happens inside `sign`.
pub trait Signer: Send + Sync {
    fn public_key(&self) -> PublicKey;

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, CryptoError>;

    fn algorithm(&self) -> KeyAlgorithm {
        self.public_key().algorithm()
    }
}
