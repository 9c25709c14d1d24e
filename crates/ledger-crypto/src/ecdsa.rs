use alloy_primitives::keccak256;
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;
use k256::{
    ecdsa::{signature::hazmat::PrehashVerifier, Signature, VerifyingKey},
    elliptic_curve::sec1::ToEncodedPoint,
};
use ledger_types::{CryptoError, PublicKey, Signer};
use rand::Rng;

/// ECDSA(secp256k1) private key. Messages are keccak-256 hashed before signing
/// and signatures are the 64-byte `r || s` form without the recovery id.
#[derive(Clone)]
pub struct EcdsaPrivateKey {
    signer: PrivateKeySigner,
}

impl EcdsaPrivateKey {
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        loop {
            let candidate: [u8; 32] = rng.gen();
            if let Ok(key) = Self::from_slice(&candidate) {
                return key;
            }
        }
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != 32 {
            return Err(CryptoError::InvalidLength {
                kind: "ecdsa private key",
                expected: 32,
                actual: bytes.len(),
            });
        }
        let signer = PrivateKeySigner::from_slice(bytes)
            .map_err(|err| CryptoError::InvalidPrivateKey(err.to_string()))?;
        Ok(Self { signer })
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        out.copy_from_slice(&self.signer.credential().to_bytes());
        out
    }
}

impl std::fmt::Debug for EcdsaPrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EcdsaPrivateKey({})", self.public_key())
    }
}

impl Signer for EcdsaPrivateKey {
    fn public_key(&self) -> PublicKey {
        let point = self
            .signer
            .credential()
            .verifying_key()
            .to_encoded_point(true);
        let mut compressed = [0u8; 33];
        compressed.copy_from_slice(point.as_bytes());
        PublicKey::EcdsaSecp256k1(compressed)
    }

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let signature = self
            .signer
            .sign_hash_sync(&keccak256(message))
            .map_err(|err| CryptoError::Signing(err.to_string()))?;
        let mut out = Vec::with_capacity(64);
        out.extend_from_slice(&signature.r().to_be_bytes::<32>());
        out.extend_from_slice(&signature.s().to_be_bytes::<32>());
        Ok(out)
    }
}

pub(crate) fn verify(
    public_key: &[u8; 33],
    message: &[u8],
    signature: &[u8],
) -> Result<(), CryptoError> {
    let verifying_key = VerifyingKey::from_sec1_bytes(public_key)
        .map_err(|err| CryptoError::InvalidPublicKey(err.to_string()))?;
    let signature = Signature::from_slice(signature).map_err(|_| CryptoError::InvalidSignature)?;
    verifying_key
        .verify_prehash(keccak256(message).as_slice(), &signature)
        .map_err(|_| CryptoError::InvalidSignature)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify_with_compressed_key() {
        let key = EcdsaPrivateKey::from_slice(&[0x11; 32]).expect("valid scalar");
        let PublicKey::EcdsaSecp256k1(public) = key.public_key() else {
            panic!("expected secp256k1 public key");
        };
        assert!(public[0] == 0x02 || public[0] == 0x03);

        let signature = key.sign(b"body-bytes").expect("sign should succeed");
        assert_eq!(signature.len(), 64);
        verify(&public, b"body-bytes", &signature).expect("verify should succeed");
        assert!(verify(&public, b"tampered", &signature).is_err());
    }

    #[test]
    fn rejects_zero_scalar() {
        assert!(EcdsaPrivateKey::from_slice(&[0u8; 32]).is_err());
    }

    #[test]
    fn round_trips_private_bytes() {
        let key = EcdsaPrivateKey::generate();
        let restored = EcdsaPrivateKey::from_slice(&key.to_bytes()).expect("restore");
        assert_eq!(restored.public_key(), key.public_key());
    }
}
