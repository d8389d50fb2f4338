//! RSA-PSS/SHA-256 signing/verification (spec §4.2).
//!
//! Key material is carried as DER-encoded SPKI (public) / PKCS#1 (private),
//! which is the shape `rsa`'s own `pkcs8`/`pkcs1` support expects —
//! parsing those bytes out of a key *file* remains the collaborator's job
//! (spec §1); this module only turns already-extracted DER into signer/
//! verifier objects.

use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pss::{SigningKey, VerifyingKey};
use rsa::signature::{RandomizedSigner, SignatureEncoding, Verifier as _};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;

use super::{KeyError, PublicKey, Scheme, SignError, Signature, Signer, VerifyError};

pub struct RsaPssSigner {
    signing_key: SigningKey<Sha256>,
    public_der: Vec<u8>,
}

impl RsaPssSigner {
    /// Build a signer from a PKCS#1 DER-encoded RSA private key.
    pub fn from_pkcs1_der(der: &[u8]) -> Result<Self, KeyError> {
        let private = RsaPrivateKey::from_pkcs1_der(der).map_err(|e| KeyError::Malformed(e.to_string()))?;
        let public = RsaPublicKey::from(&private);
        let public_der =
            rsa::pkcs1::EncodeRsaPublicKey::to_pkcs1_der(&public).map_err(|e| KeyError::Malformed(e.to_string()))?;
        Ok(Self { signing_key: SigningKey::<Sha256>::new(private), public_der: public_der.as_bytes().to_vec() })
    }
}

impl Signer for RsaPssSigner {
    fn public_key(&self) -> PublicKey {
        PublicKey::new(Scheme::RsassaPssSha256, self.public_der.clone())
    }

    fn sign(&self, msg: &[u8]) -> Result<Signature, SignError> {
        let mut rng = rand::rngs::OsRng;
        let sig = self.signing_key.sign_with_rng(&mut rng, msg);
        Ok(Signature { keyid: self.key_id()?, sig: sig.to_vec(), cert: None })
    }
}

pub fn verify(msg: &[u8], sig: &Signature, key: &PublicKey) -> Result<(), VerifyError> {
    let public = RsaPublicKey::from_pkcs1_der(&key.value).map_err(|e| KeyError::Malformed(e.to_string()))?;
    let verifying_key = VerifyingKey::<Sha256>::new(public);
    let signature =
        rsa::pss::Signature::try_from(sig.sig.as_slice()).map_err(|e| KeyError::Malformed(e.to_string()))?;
    verifying_key.verify(msg, &signature).map_err(|_| VerifyError::BadSignature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::pkcs1::EncodeRsaPrivateKey;

    fn gen_key() -> RsaPssSigner {
        let mut rng = rand::rngs::OsRng;
        let private = RsaPrivateKey::new(&mut rng, 2048).unwrap();
        let der = private.to_pkcs1_der().unwrap();
        RsaPssSigner::from_pkcs1_der(der.as_bytes()).unwrap()
    }

    #[test]
    fn sign_then_verify_round_trips() {
        let signer = gen_key();
        let msg = b"hello layout";
        let sig = signer.sign(msg).unwrap();
        verify(msg, &sig, &signer.public_key()).unwrap();
    }
}
