//! Algorithm-tagged private keys and their textual (DER hex) encoding.

use std::{fmt, str::FromStr};

use ledger_types::{CryptoError, PublicKey, Signer};

use crate::{ecdsa::EcdsaPrivateKey, ed25519::Ed25519PrivateKey};

const ED25519_DER_PREFIX: &str = "302e020100300506032b657004220420";
const ECDSA_DER_PREFIX: &str = "3030020100300706052b8104000a04220420";

#[derive(Clone, Debug)]
pub enum PrivateKey {
    Ed25519(Ed25519PrivateKey),
    Ecdsa(EcdsaPrivateKey),
}

impl PrivateKey {
    pub fn generate_ed25519() -> Self {
        Self::Ed25519(Ed25519PrivateKey::generate())
    }

    pub fn generate_ecdsa() -> Self {
        Self::Ecdsa(EcdsaPrivateKey::generate())
    }

    pub fn to_der_hex(&self) -> String {
        match self {
            Self::Ed25519(key) => format!("{ED25519_DER_PREFIX}{}", hex::encode(key.to_bytes())),
            Self::Ecdsa(key) => format!("{ECDSA_DER_PREFIX}{}", hex::encode(key.to_bytes())),
        }
    }
}

impl Signer for PrivateKey {
    fn public_key(&self) -> PublicKey {
        match self {
            Self::Ed25519(key) => key.public_key(),
            Self::Ecdsa(key) => key.public_key(),
        }
    }

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, CryptoError> {
        match self {
            Self::Ed25519(key) => key.sign(message),
            Self::Ecdsa(key) => key.sign(message),
        }
    }
}

/// Accepts DER-prefixed hex for either algorithm; bare 32-byte hex is taken as Ed25519.
impl FromStr for PrivateKey {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim().strip_prefix("0x").unwrap_or(s.trim());
        let decode = |hex_body: &str| {
            hex::decode(hex_body).map_err(|err| CryptoError::InvalidPrivateKey(err.to_string()))
        };
        if let Some(rest) = raw.strip_prefix(ED25519_DER_PREFIX) {
            return Ed25519PrivateKey::from_slice(&decode(rest)?).map(Self::Ed25519);
        }
        if let Some(rest) = raw.strip_prefix(ECDSA_DER_PREFIX) {
            return EcdsaPrivateKey::from_slice(&decode(rest)?).map(Self::Ecdsa);
        }
        Ed25519PrivateKey::from_slice(&decode(raw)?).map(Self::Ed25519)
    }
}

impl fmt::Display for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_der_hex())
    }
}

#[cfg(test)]
mod tests {
    use ledger_types::KeyAlgorithm;

    use super::*;

    #[test]
    fn der_hex_round_trip_keeps_algorithm() {
        for key in [PrivateKey::generate_ed25519(), PrivateKey::generate_ecdsa()] {
            let parsed: PrivateKey = key.to_der_hex().parse().expect("parse der");
            assert_eq!(parsed.public_key(), key.public_key());
            assert_eq!(parsed.algorithm(), key.algorithm());
        }
    }

    #[test]
    fn bare_hex_defaults_to_ed25519() {
        let parsed: PrivateKey = hex::encode([0x42; 32]).parse().expect("parse raw");
        assert_eq!(parsed.algorithm(), KeyAlgorithm::Ed25519);
    }

    #[test]
    fn rejects_garbage() {
        assert!("not-a-key".parse::<PrivateKey>().is_err());
        assert!(hex::encode([1; 16]).parse::<PrivateKey>().is_err());
    }
}
