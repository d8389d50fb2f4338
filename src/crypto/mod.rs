//! Signer/Verifier adapter (spec §4.2) — Component B.
//!
//! Abstracts cryptographic operations behind two capabilities, `Sign` and
//! `Verify`, over a small, closed set of schemes. Key *file* parsing (PEM,
//! PKCS8, armored OpenPGP blobs) is an explicit collaborator boundary
//! (spec §1, §6): callers hand this module raw key material that some
//! other layer already extracted, and get back an abstract [`Signer`] or a
//! [`PublicKey`] descriptor to verify against.
//!
//! The keyid of a non-OpenPGP key is the hex SHA-256 of the canonical
//! encoding (see [`crate::canonical`]) of its descriptor; OpenPGP keys
//! carry their own 40-hex fingerprint (§4.2), computed here with a
//! documented simplification — see `openpgp` submodule and `DESIGN.md`.

pub mod ecdsa_scheme;
pub mod ed25519_scheme;
pub mod openpgp;
pub mod rsa_pss;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::canonical;
use crate::error::{Classify, Kind};

/// The key family + signing scheme pair named in spec §3/§4.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scheme {
    RsassaPssSha256,
    Ed25519,
    EcdsaSha2Nistp256,
    EcdsaSha2Nistp384,
    OpenpgpRsa,
    OpenpgpEd25519,
}

impl Scheme {
    pub fn keytype(&self) -> &'static str {
        match self {
            Scheme::RsassaPssSha256 => "rsa",
            Scheme::Ed25519 => "ed25519",
            Scheme::EcdsaSha2Nistp256 | Scheme::EcdsaSha2Nistp384 => "ecdsa",
            Scheme::OpenpgpRsa => "rsa",
            Scheme::OpenpgpEd25519 => "ed25519",
        }
    }

    pub fn is_openpgp(&self) -> bool {
        matches!(self, Scheme::OpenpgpRsa | Scheme::OpenpgpEd25519)
    }
}

/// A public key descriptor as it appears in a layout's `keys` mapping.
///
/// `value` holds the raw key material; its encoding is scheme-specific
/// (SPKI DER for RSA, 32-byte point for Ed25519, SEC1 for ECDSA). `subkeys`
/// is only ever non-empty on an OpenPGP primary key (spec §4.2: "Sub-keys
/// are attached to their primary key").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKey {
    pub scheme: Scheme,
    #[serde(with = "hex_bytes")]
    pub value: Vec<u8>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subkeys: Vec<PublicKey>,
}

impl PublicKey {
    pub fn new(scheme: Scheme, value: Vec<u8>) -> Self {
        Self { scheme, value, subkeys: Vec::new() }
    }

    pub fn with_subkeys(mut self, subkeys: Vec<PublicKey>) -> Self {
        self.subkeys = subkeys;
        self
    }

    /// Derive this key's keyid (spec §4.2).
    pub fn key_id(&self) -> Result<String, KeyError> {
        if self.scheme.is_openpgp() {
            return openpgp::fingerprint(&self.value);
        }
        #[derive(Serialize)]
        struct Descriptor<'a> {
            keytype: &'a str,
            scheme: Scheme,
            #[serde(with = "hex_bytes")]
            value: &'a [u8],
        }
        let descriptor = Descriptor { keytype: self.scheme.keytype(), scheme: self.scheme, value: &self.value };
        let bytes = canonical::encode(&descriptor).map_err(|e| KeyError::Canonical(e.to_string()))?;
        let digest = Sha256::digest(&bytes);
        Ok(hex::encode(digest))
    }

    /// True if `candidate_keyid` is satisfied by this key directly or by
    /// one of its OpenPGP sub-keys (spec §4.2).
    pub fn satisfies(&self, candidate_keyid: &str) -> Result<bool, KeyError> {
        if self.key_id()? == candidate_keyid {
            return Ok(true);
        }
        for sub in &self.subkeys {
            if sub.key_id()? == candidate_keyid {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        hex::decode(&s).map_err(serde::de::Error::custom)
    }
}

/// A signature over a payload's canonical encoding (spec §3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub keyid: String,
    #[serde(with = "hex_bytes")]
    pub sig: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert: Option<String>,
}

/// Errors in key handling: malformed key material, unknown key.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("malformed key material: {0}")]
    Malformed(String),
    #[error("canonical encoding of key descriptor failed: {0}")]
    Canonical(String),
}

impl Classify for KeyError {
    fn kind(&self) -> Kind {
        Kind::Crypto
    }
}

/// Errors while producing a signature.
#[derive(Debug, Error)]
pub enum SignError {
    #[error(transparent)]
    Key(#[from] KeyError),
    #[error("signing operation failed: {0}")]
    Backend(String),
}

impl Classify for SignError {
    fn kind(&self) -> Kind {
        Kind::Crypto
    }
}

/// Errors while verifying a signature.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error(transparent)]
    Key(#[from] KeyError),
    #[error("signature does not verify")]
    BadSignature,
    #[error("key scheme {0:?} does not match signature scheme expectations")]
    SchemeMismatch(Scheme),
}

impl Classify for VerifyError {
    fn kind(&self) -> Kind {
        Kind::Crypto
    }
}

/// Something capable of producing a [`Signature`] over arbitrary bytes and
/// reporting the [`PublicKey`] that verifies it.
pub trait Signer {
    fn public_key(&self) -> PublicKey;
    fn key_id(&self) -> Result<String, KeyError> {
        self.public_key().key_id()
    }
    fn sign(&self, msg: &[u8]) -> Result<Signature, SignError>;
}

/// Verify `sig` over `msg` against `key`, dispatching on `key.scheme`.
pub fn verify(msg: &[u8], sig: &Signature, key: &PublicKey) -> Result<(), VerifyError> {
    match key.scheme {
        Scheme::Ed25519 => ed25519_scheme::verify(msg, sig, key),
        Scheme::RsassaPssSha256 => rsa_pss::verify(msg, sig, key),
        Scheme::EcdsaSha2Nistp256 => ecdsa_scheme::verify_p256(msg, sig, key),
        Scheme::EcdsaSha2Nistp384 => ecdsa_scheme::verify_p384(msg, sig, key),
        Scheme::OpenpgpEd25519 => openpgp::verify_ed25519(msg, sig, key),
        Scheme::OpenpgpRsa => openpgp::verify_rsa(msg, sig, key),
    }
}
