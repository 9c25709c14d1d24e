//! Per-node signed bodies.
//!
//! The signed bytes are the chunk body with the target node id filled in, so
//! every node gets its own bytes and its own signature collection.

use ledger_crypto::{transaction_hash, SignatureSet};
use ledger_proto::{convert, v1};
use ledger_types::{AccountId, PublicKey, Signer, TransactionHash};
use prost::Message;

use crate::error::BuildError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedBody {
    node_account_id: AccountId,
    body_bytes: Vec<u8>,
    signatures: SignatureSet,
}

impl SignedBody {
    /// Canonical bytes of `body` addressed to `node_account_id`.
    pub fn new(body: &v1::TransactionBody, node_account_id: AccountId) -> Self {
        let body = v1::TransactionBody {
            node_account_id: Some(node_account_id.into()),
            ..body.clone()
        };
        Self {
            node_account_id,
            body_bytes: body.encode_to_vec(),
            signatures: SignatureSet::new(),
        }
    }

    /// Rebuilds a signed body from its wire form, keeping the received body bytes as-is.
    pub fn decode(
        signed: v1::SignedTransaction,
    ) -> Result<(Self, v1::TransactionBody), BuildError> {
        let body = v1::TransactionBody::decode(signed.body_bytes.as_slice())
            .map_err(|err| BuildError::Decode(err.to_string()))?;
        let node_account_id = body
            .node_account_id
            .clone()
            .ok_or(BuildError::MissingField("node_account_id"))?
            .try_into()?;
        let mut signatures = SignatureSet::new();
        for pair in signed.sig_map.unwrap_or_default().sig_pair.iter() {
            let (public_key, signature) = convert::decode_signature_pair(pair)?;
            signatures.insert(public_key, signature);
        }
        let signed_body = Self {
            node_account_id,
            body_bytes: signed.body_bytes,
            signatures,
        };
        Ok((signed_body, body))
    }

    pub fn node_account_id(&self) -> AccountId {
        self.node_account_id
    }

    pub fn body_bytes(&self) -> &[u8] {
        &self.body_bytes
    }

    pub fn signatures(&self) -> &SignatureSet {
        &self.signatures
    }

    /// Signs with `signer` unless its key already signed these bytes.
    pub fn sign_with(&mut self, signer: &dyn Signer) -> Result<bool, BuildError> {
        let public_key = signer.public_key();
        if self.signatures.contains(&public_key) {
            return Ok(false);
        }
        let signature = signer.sign(&self.body_bytes)?;
        Ok(self.signatures.insert(public_key, signature))
    }

    /// Attaches a signature produced elsewhere after checking it covers these bytes.
    pub fn add_signature(
        &mut self,
        public_key: PublicKey,
        signature: Vec<u8>,
    ) -> Result<bool, BuildError> {
        ledger_crypto::verify(&public_key, &self.body_bytes, &signature)?;
        Ok(self.signatures.insert(public_key, signature))
    }

    pub fn to_signed_transaction(&self) -> v1::SignedTransaction {
        v1::SignedTransaction {
            body_bytes: self.body_bytes.clone(),
            sig_map: Some(v1::SignatureMap {
                sig_pair: self
                    .signatures
                    .iter()
                    .map(|(key, signature)| convert::signature_pair(key, signature))
                    .collect(),
            }),
        }
    }

    pub fn to_transaction(&self) -> v1::Transaction {
        v1::Transaction {
            signed_transaction_bytes: self.to_signed_transaction().encode_to_vec(),
        }
    }

    /// SHA-384 of the signed transaction bytes, as the network computes it.
    pub fn transaction_hash(&self) -> TransactionHash {
        transaction_hash(&self.to_signed_transaction().encode_to_vec())
    }
}

#[cfg(test)]
mod tests {
    use ledger_crypto::{EcdsaPrivateKey, Ed25519PrivateKey};
    use ledger_types::{Timestamp, TransactionId};

    use super::*;

    fn body() -> v1::TransactionBody {
        v1::TransactionBody {
            transaction_id: Some(
                TransactionId::new(AccountId::from_num(2), Timestamp::new(1_700_000_000, 0)).into(),
            ),
            transaction_fee: 100_000_000,
            kind: "cryptoTransfer".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn bytes_depend_on_the_node() {
        let a = SignedBody::new(&body(), AccountId::from_num(3));
        let b = SignedBody::new(&body(), AccountId::from_num(4));
        assert_ne!(a.body_bytes(), b.body_bytes());
        assert_eq!(a, SignedBody::new(&body(), AccountId::from_num(3)));
    }

    #[test]
    fn signing_is_deduplicated_by_key() {
        let key = Ed25519PrivateKey::from_seed([9; 32]);
        let other = EcdsaPrivateKey::from_slice(&[7; 32]).expect("scalar");
        let mut signed = SignedBody::new(&body(), AccountId::from_num(3));

        assert!(signed.sign_with(&key).expect("sign"));
        assert!(!signed.sign_with(&key).expect("sign"));
        assert!(signed.sign_with(&other).expect("sign"));
        assert_eq!(signed.signatures().len(), 2);
        signed
            .signatures()
            .verify_all(signed.body_bytes())
            .expect("signatures cover the node bytes");
    }

    #[test]
    fn rejects_signature_made_for_another_node() {
        let key = Ed25519PrivateKey::from_seed([9; 32]);
        let node_a = SignedBody::new(&body(), AccountId::from_num(3));
        let mut node_b = SignedBody::new(&body(), AccountId::from_num(4));
        let signature = key.sign(node_a.body_bytes()).expect("sign");

        assert!(node_b.add_signature(key.public_key(), signature).is_err());
        assert!(node_b.signatures().is_empty());
    }

    #[test]
    fn decodes_its_wire_form() {
        let key = Ed25519PrivateKey::from_seed([9; 32]);
        let mut signed = SignedBody::new(&body(), AccountId::from_num(3));
        signed.sign_with(&key).expect("sign");

        let (decoded, body) = SignedBody::decode(signed.to_signed_transaction()).expect("decode");
        assert_eq!(decoded, signed);
        assert_eq!(body.kind, "cryptoTransfer");
        assert_eq!(decoded.transaction_hash(), signed.transaction_hash());
    }
}
