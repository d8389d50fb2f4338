//! Ed25519 signing/verification.

use ed25519_dalek::{Signer as _, SigningKey, Verifier as _, VerifyingKey};

use super::{KeyError, PublicKey, Scheme, SignError, Signature, Signer, VerifyError};

pub struct Ed25519Signer {
    signing_key: SigningKey,
}

impl Ed25519Signer {
    /// Build a signer from a raw 32-byte Ed25519 seed.
    pub fn from_seed(seed: &[u8]) -> Result<Self, KeyError> {
        let arr: [u8; 32] = seed
            .try_into()
            .map_err(|_| KeyError::Malformed("ed25519 seed must be 32 bytes".into()))?;
        Ok(Self { signing_key: SigningKey::from_bytes(&arr) })
    }
}

impl Signer for Ed25519Signer {
    fn public_key(&self) -> PublicKey {
        PublicKey::new(Scheme::Ed25519, self.signing_key.verifying_key().to_bytes().to_vec())
    }

    fn sign(&self, msg: &[u8]) -> Result<Signature, SignError> {
        let sig = self.signing_key.sign(msg);
        Ok(Signature { keyid: self.key_id()?, sig: sig.to_bytes().to_vec(), cert: None })
    }
}

pub fn verify(msg: &[u8], sig: &Signature, key: &PublicKey) -> Result<(), VerifyError> {
    let arr: [u8; 32] = key
        .value
        .as_slice()
        .try_into()
        .map_err(|_| KeyError::Malformed("ed25519 public key must be 32 bytes".into()))?;
    let vk = VerifyingKey::from_bytes(&arr).map_err(|e| KeyError::Malformed(e.to_string()))?;
    let sig_arr: [u8; 64] = sig
        .sig
        .as_slice()
        .try_into()
        .map_err(|_| KeyError::Malformed("ed25519 signature must be 64 bytes".into()))?;
    let signature = ed25519_dalek::Signature::from_bytes(&sig_arr);
    vk.verify(msg, &signature).map_err(|_| VerifyError::BadSignature)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_then_verify_round_trips() {
        let seed = [7u8; 32];
        let signer = Ed25519Signer::from_seed(&seed).unwrap();
        let msg = b"hello layout";
        let sig = signer.sign(msg).unwrap();
        let key = signer.public_key();
        verify(msg, &sig, &key).unwrap();
    }

    #[test]
    fn tampered_message_fails() {
        let signer = Ed25519Signer::from_seed(&[1u8; 32]).unwrap();
        let sig = signer.sign(b"original").unwrap();
        let key = signer.public_key();
        assert!(verify(b"tampered", &sig, &key).is_err());
    }
}
