//! Public keys and the recursive key structure used to describe authorization.

use std::{fmt, str::FromStr};

use crate::error::{CryptoError, ValidationError};

const ED25519_DER_PREFIX: &str = "302a300506032b6570032100";
const ECDSA_DER_PREFIX: &str = "302d300706052b8104000a032200";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum KeyAlgorithm {
    Ed25519,
    EcdsaSecp256k1,
}

impl fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ed25519 => f.write_str("ed25519"),
            Self::EcdsaSecp256k1 => f.write_str("ecdsa-secp256k1"),
        }
    }
}

/// A single public key: raw 32-byte Ed25519 or 33-byte compressed secp256k1 point.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PublicKey {
    Ed25519([u8; 32]),
    EcdsaSecp256k1([u8; 33]),
}

impl PublicKey {
    pub fn algorithm(&self) -> KeyAlgorithm {
        match self {
            Self::Ed25519(_) => KeyAlgorithm::Ed25519,
            Self::EcdsaSecp256k1(_) => KeyAlgorithm::EcdsaSecp256k1,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Ed25519(bytes) => bytes,
            Self::EcdsaSecp256k1(bytes) => bytes,
        }
    }

    pub fn from_ed25519(bytes: &[u8]) -> Result<Self, CryptoError> {
        let raw: [u8; 32] = bytes.try_into().map_err(|_| CryptoError::InvalidLength {
            kind: "ed25519 public key",
            expected: 32,
            actual: bytes.len(),
        })?;
        Ok(Self::Ed25519(raw))
    }

    pub fn from_ecdsa(bytes: &[u8]) -> Result<Self, CryptoError> {
        let raw: [u8; 33] = bytes.try_into().map_err(|_| CryptoError::InvalidLength {
            kind: "ecdsa public key",
            expected: 33,
            actual: bytes.len(),
        })?;
        if raw[0] != 0x02 && raw[0] != 0x03 {
            return Err(CryptoError::InvalidPublicKey(
                "expected compressed secp256k1 point".to_string(),
            ));
        }
        Ok(Self::EcdsaSecp256k1(raw))
    }

    /// Guesses the algorithm from the length: 32 bytes is Ed25519, 33 is compressed secp256k1.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        match bytes.len() {
            32 => Self::from_ed25519(bytes),
            33 => Self::from_ecdsa(bytes),
            other => Err(CryptoError::InvalidPublicKey(format!(
                "unsupported public key length {other}"
            ))),
        }
    }

    pub fn to_der_hex(&self) -> String {
        let prefix = match self {
            Self::Ed25519(_) => ED25519_DER_PREFIX,
            Self::EcdsaSecp256k1(_) => ECDSA_DER_PREFIX,
        };
        format!("{prefix}{}", hex::encode(self.as_bytes()))
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.as_bytes()))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({}:{})", self.algorithm(), self)
    }
}

impl FromStr for PublicKey {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix("0x").unwrap_or(s);
        let parse_err = || ValidationError::Parse {
            kind: "PublicKey",
            input: s.to_string(),
        };
        let (hex_body, algorithm) = if let Some(rest) = raw.strip_prefix(ED25519_DER_PREFIX) {
            (rest, Some(KeyAlgorithm::Ed25519))
        } else if let Some(rest) = raw.strip_prefix(ECDSA_DER_PREFIX) {
            (rest, Some(KeyAlgorithm::EcdsaSecp256k1))
        } else {
            (raw, None)
        };
        let bytes =
            hex::decode(hex_body).map_err(|err| ValidationError::InvalidHex(err.to_string()))?;
        let key = match algorithm {
            Some(KeyAlgorithm::Ed25519) => Self::from_ed25519(&bytes),
            Some(KeyAlgorithm::EcdsaSecp256k1) => Self::from_ecdsa(&bytes),
            None => Self::from_bytes(&bytes),
        };
        key.map_err(|_| parse_err())
    }
}

/// Authorization structure: a single key or an (optionally thresholded) list of nested keys.
///
/// The network evaluates thresholds; locally the tree is only flattened to find
/// which public keys a caller may need to sign with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Key {
    Single(PublicKey),
    KeyList {
        keys: Vec<Key>,
        threshold: Option<u32>,
    },
}

impl Key {
    pub fn list(keys: Vec<Key>) -> Self {
        Self::KeyList {
            keys,
            threshold: None,
        }
    }

    pub fn threshold(threshold: u32, keys: Vec<Key>) -> Self {
        Self::KeyList {
            keys,
            threshold: Some(threshold),
        }
    }

    /// Every public key appearing anywhere in the tree, in depth-first order, without duplicates.
    pub fn public_keys(&self) -> Vec<PublicKey> {
        let mut out = Vec::new();
        self.collect_into(&mut out);
        out
    }

    pub fn contains(&self, key: &PublicKey) -> bool {
        match self {
            Self::Single(single) => single == key,
            Self::KeyList { keys, .. } => keys.iter().any(|child| child.contains(key)),
        }
    }

    fn collect_into(&self, out: &mut Vec<PublicKey>) {
        match self {
            Self::Single(key) => {
                if !out.contains(key) {
                    out.push(*key);
                }
            }
            Self::KeyList { keys, .. } => {
                for child in keys {
                    child.collect_into(out);
                }
            }
        }
    }
}

impl From<PublicKey> for Key {
    fn from(value: PublicKey) -> Self {
        Self::Single(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flattens_nested_threshold_keys() {
        let a = PublicKey::Ed25519([1; 32]);
        let b = PublicKey::Ed25519([2; 32]);
        let mut compressed = [3u8; 33];
        compressed[0] = 0x02;
        let c = PublicKey::EcdsaSecp256k1(compressed);

        let key = Key::threshold(
            2,
            vec![
                Key::Single(a),
                Key::list(vec![Key::Single(b), Key::Single(a)]),
                Key::Single(c),
            ],
        );

        assert_eq!(key.public_keys(), vec![a, b, c]);
        assert!(key.contains(&c));
        assert!(!key.contains(&PublicKey::Ed25519([9; 32])));
    }

    #[test]
    fn parses_der_and_raw_hex() {
        let raw = PublicKey::Ed25519([7; 32]);
        let from_der: PublicKey = raw.to_der_hex().parse().expect("der");
        let from_raw: PublicKey = raw.to_string().parse().expect("raw");
        assert_eq!(from_der, raw);
        assert_eq!(from_raw, raw);
    }

    #[test]
    fn rejects_uncompressed_ecdsa_prefix() {
        let err = PublicKey::from_ecdsa(&[0x04; 33]).expect_err("uncompressed prefix");
        assert!(matches!(err, CryptoError::InvalidPublicKey(_)));
    }
}
