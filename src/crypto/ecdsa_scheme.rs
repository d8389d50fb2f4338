//! ECDSA P-256/P-384 signing/verification (spec §4.2).
//!
//! Key material is the SEC1 uncompressed point encoding `p256`/`p384`
//! already understand; signatures are fixed-width `r || s`.

use p256::ecdsa::signature::{Signer as _, Verifier as _};
use p256::ecdsa::{Signature as P256Signature, SigningKey as P256SigningKey, VerifyingKey as P256VerifyingKey};
use p384::ecdsa::{Signature as P384Signature, SigningKey as P384SigningKey, VerifyingKey as P384VerifyingKey};

use super::{KeyError, PublicKey, Scheme, SignError, Signature, Signer, VerifyError};

pub struct P256Signer(P256SigningKey);
pub struct P384Signer(P384SigningKey);

impl P256Signer {
    pub fn from_bytes(scalar: &[u8]) -> Result<Self, KeyError> {
        Ok(Self(P256SigningKey::from_slice(scalar).map_err(|e| KeyError::Malformed(e.to_string()))?))
    }
}

impl Signer for P256Signer {
    fn public_key(&self) -> PublicKey {
        let point = P256VerifyingKey::from(&self.0).to_encoded_point(false);
        PublicKey::new(Scheme::EcdsaSha2Nistp256, point.as_bytes().to_vec())
    }

    fn sign(&self, msg: &[u8]) -> Result<Signature, SignError> {
        let sig: P256Signature = self.0.sign(msg);
        Ok(Signature { keyid: self.key_id()?, sig: sig.to_bytes().to_vec(), cert: None })
    }
}

impl P384Signer {
    pub fn from_bytes(scalar: &[u8]) -> Result<Self, KeyError> {
        Ok(Self(P384SigningKey::from_slice(scalar).map_err(|e| KeyError::Malformed(e.to_string()))?))
    }
}

impl Signer for P384Signer {
    fn public_key(&self) -> PublicKey {
        let point = P384VerifyingKey::from(&self.0).to_encoded_point(false);
        PublicKey::new(Scheme::EcdsaSha2Nistp384, point.as_bytes().to_vec())
    }

    fn sign(&self, msg: &[u8]) -> Result<Signature, SignError> {
        let sig: P384Signature = self.0.sign(msg);
        Ok(Signature { keyid: self.key_id()?, sig: sig.to_bytes().to_vec(), cert: None })
    }
}

pub fn verify_p256(msg: &[u8], sig: &Signature, key: &PublicKey) -> Result<(), VerifyError> {
    let vk = P256VerifyingKey::from_sec1_bytes(&key.value).map_err(|e| KeyError::Malformed(e.to_string()))?;
    let signature = P256Signature::from_slice(&sig.sig).map_err(|e| KeyError::Malformed(e.to_string()))?;
    vk.verify(msg, &signature).map_err(|_| VerifyError::BadSignature)
}

pub fn verify_p384(msg: &[u8], sig: &Signature, key: &PublicKey) -> Result<(), VerifyError> {
    let vk = P384VerifyingKey::from_sec1_bytes(&key.value).map_err(|e| KeyError::Malformed(e.to_string()))?;
    let signature = P384Signature::from_slice(&sig.sig).map_err(|e| KeyError::Malformed(e.to_string()))?;
    vk.verify(msg, &signature).map_err(|_| VerifyError::BadSignature)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn p256_round_trip() {
        let signer = P256Signer::from_bytes(&[9u8; 32]).unwrap();
        let msg = b"hello layout";
        let sig = signer.sign(msg).unwrap();
        verify_p256(msg, &sig, &signer.public_key()).unwrap();
    }

    #[test]
    fn p384_round_trip() {
        let signer = P384Signer::from_bytes(&[3u8; 48]).unwrap();
        let msg = b"hello layout";
        let sig = signer.sign(msg).unwrap();
        verify_p384(msg, &sig, &signer.public_key()).unwrap();
    }
}
