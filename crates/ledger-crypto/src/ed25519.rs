use ed25519_dalek::{Signature, Signer as DalekSigner, SigningKey, Verifier, VerifyingKey};
use ledger_types::{CryptoError, PublicKey, Signer};
use rand::rngs::OsRng;

/// Ed25519 private key. Signatures are deterministic.
#[derive(Clone)]
pub struct Ed25519PrivateKey {
    signing_key: SigningKey,
}

impl Ed25519PrivateKey {
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(&seed),
        }
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let seed: [u8; 32] = bytes.try_into().map_err(|_| CryptoError::InvalidLength {
            kind: "ed25519 private key",
            expected: 32,
            actual: bytes.len(),
        })?;
        Ok(Self::from_seed(seed))
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }
}

impl std::fmt::Debug for Ed25519PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Ed25519PrivateKey({})", self.public_key())
    }
}

impl Signer for Ed25519PrivateKey {
    fn public_key(&self) -> PublicKey {
        PublicKey::Ed25519(self.signing_key.verifying_key().to_bytes())
    }

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, CryptoError> {
        Ok(self.signing_key.sign(message).to_bytes().to_vec())
    }
}

pub(crate) fn verify(
    public_key: &[u8; 32],
    message: &[u8],
    signature: &[u8],
) -> Result<(), CryptoError> {
    let verifying_key = VerifyingKey::from_bytes(public_key)
        .map_err(|err| CryptoError::InvalidPublicKey(err.to_string()))?;
    let signature = Signature::from_slice(signature).map_err(|_| CryptoError::InvalidSignature)?;
    verifying_key
        .verify(message, &signature)
        .map_err(|_| CryptoError::InvalidSignature)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify() {
        let key = Ed25519PrivateKey::from_seed([0x10; 32]);
        let signature = key.sign(b"body-bytes").expect("sign should succeed");
        assert_eq!(signature.len(), 64);

        let PublicKey::Ed25519(public) = key.public_key() else {
            panic!("expected ed25519 public key");
        };
        verify(&public, b"body-bytes", &signature).expect("verify should succeed");
        let err = verify(&public, b"other-bytes", &signature).expect_err("must reject");
        assert_eq!(err, CryptoError::InvalidSignature);
    }

    #[test]
    fn signatures_are_deterministic() {
        let key = Ed25519PrivateKey::from_seed([0x22; 32]);
        assert_eq!(
            key.sign(b"same").expect("first"),
            key.sign(b"same").expect("second")
        );
    }
}
