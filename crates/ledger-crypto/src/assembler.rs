//! SignatureSet: signatures over one byte string, at most one per public key.

use ledger_types::{CryptoError, PublicKey};

use crate::verify;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignatureSet {
    entries: Vec<(PublicKey, Vec<u8>)>,
}

impl SignatureSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a signature unless `public_key` already has one. Returns whether it was added.
    pub fn insert(&mut self, public_key: PublicKey, signature: Vec<u8>) -> bool {
        if self.contains(&public_key) {
            return false;
        }
        self.entries.push((public_key, signature));
        true
    }

    pub fn contains(&self, public_key: &PublicKey) -> bool {
        self.entries.iter().any(|(key, _)| key == public_key)
    }

    pub fn get(&self, public_key: &PublicKey) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|(key, _)| key == public_key)
            .map(|(_, signature)| signature.as_slice())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&PublicKey, &[u8])> {
        self.entries
            .iter()
            .map(|(key, signature)| (key, signature.as_slice()))
    }

    pub fn verify_all(&self, message: &[u8]) -> Result<(), CryptoError> {
        self.iter()
            .try_for_each(|(key, signature)| verify(key, message, signature))
    }
}

#[cfg(test)]
mod tests {
    use ledger_types::Signer;

    use super::*;
    use crate::{EcdsaPrivateKey, Ed25519PrivateKey};

    #[test]
    fn rejects_second_signature_from_same_key() {
        let key = Ed25519PrivateKey::from_seed([1; 32]);
        let mut set = SignatureSet::new();
        assert!(set.insert(key.public_key(), key.sign(b"m").expect("sign")));
        assert!(!set.insert(key.public_key(), vec![0; 64]));
        assert_eq!(set.len(), 1);
        set.verify_all(b"m").expect("original signature kept");
    }

    #[test]
    fn verify_all_flags_signature_over_other_bytes() {
        let ed = Ed25519PrivateKey::from_seed([2; 32]);
        let ecdsa = EcdsaPrivateKey::from_slice(&[3; 32]).expect("scalar");
        let mut set = SignatureSet::new();
        set.insert(ed.public_key(), ed.sign(b"node-a").expect("sign"));
        set.insert(ecdsa.public_key(), ecdsa.sign(b"node-b").expect("sign"));
        assert!(set.verify_all(b"node-a").is_err());
    }
}
