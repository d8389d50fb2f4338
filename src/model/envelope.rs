//! Metadata envelope (spec §3) — the two signed wrapper shapes every
//! persisted layout/link file uses, plus the tagged `Payload` union.
//!
//! Grounded on `eqtylab-integrity`'s `integrity-dsse` crate and
//! `TrustEdge-Labs-trustedge`'s `crates/core/src/protocols/mod.rs` (both
//! reference-only, not this crate's teacher) for the pre-authentication
//! encoding (PAE) shape of the envelope wrapper.

use std::collections::BTreeMap;

use base64::Engine;
use serde::{Deserialize, Serialize};

use super::{Layout, Link, SchemaError};
use crate::canonical;
use crate::crypto::{self, PublicKey, Signature};

/// Exactly one of the payload kinds named in spec §3, selected by the
/// on-disk `_type` discriminator (spec §9: "Implement as a tagged union
/// with a discriminator parsed before structural decoding").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "_type", rename_all = "lowercase")]
pub enum Payload {
    Layout(Layout),
    Link(Link),
}

impl Payload {
    pub fn as_layout(&self) -> Option<&Layout> {
        match self {
            Payload::Layout(l) => Some(l),
            Payload::Link(_) => None,
        }
    }

    pub fn as_link(&self) -> Option<&Link> {
        match self {
            Payload::Link(l) => Some(l),
            Payload::Layout(_) => None,
        }
    }

    pub fn validate(&self) -> Result<(), SchemaError> {
        match self {
            Payload::Layout(l) => l.validate(),
            Payload::Link(l) => l.validate(),
        }
    }
}

/// One of the two on-disk signed wrapper shapes (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Metadata {
    /// `{ signed: Payload, signatures: [Signature] }`.
    Classic { signed: Payload, signatures: Vec<Signature> },
    /// DSSE-style envelope: base64 payload bytes + type tag, signed over
    /// their PAE encoding.
    Envelope {
        #[serde(rename = "payload")]
        payload_b64: String,
        #[serde(rename = "payloadType")]
        payload_type: String,
        signatures: Vec<Signature>,
    },
}

/// Pre-authentication encoding: `DSSEv1 SP LEN(type) SP type SP LEN(body) SP body`.
pub fn pae(payload_type: &str, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + payload_type.len() + 32);
    out.extend_from_slice(b"DSSEv1");
    out.push(b' ');
    out.extend_from_slice(payload_type.len().to_string().as_bytes());
    out.push(b' ');
    out.extend_from_slice(payload_type.as_bytes());
    out.push(b' ');
    out.extend_from_slice(body.len().to_string().as_bytes());
    out.push(b' ');
    out.extend_from_slice(body);
    out
}

const ENVELOPE_PAYLOAD_TYPE: &str = "application/vnd.in-toto+json";

impl Metadata {
    pub fn signatures(&self) -> &[Signature] {
        match self {
            Metadata::Classic { signatures, .. } => signatures,
            Metadata::Envelope { signatures, .. } => signatures,
        }
    }

    /// Recover the payload, decoding the envelope body if needed.
    pub fn payload(&self) -> Result<Payload, SchemaError> {
        match self {
            Metadata::Classic { signed, .. } => Ok(signed.clone()),
            Metadata::Envelope { payload_b64, .. } => {
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(payload_b64)
                    .map_err(|e| SchemaError::BadEnvelope(e.to_string()))?;
                serde_json::from_slice(&bytes).map_err(|e| SchemaError::BadEnvelope(e.to_string()))
            }
        }
    }

    /// The exact bytes that were/are signed (spec §3, §8 "signature stability").
    pub fn signable_bytes(&self) -> Result<Vec<u8>, SchemaError> {
        match self {
            Metadata::Classic { signed, .. } => {
                canonical::encode(signed).map_err(|e| SchemaError::BadEnvelope(e.to_string()))
            }
            Metadata::Envelope { payload_b64, payload_type, .. } => {
                let body = base64::engine::general_purpose::STANDARD
                    .decode(payload_b64)
                    .map_err(|e| SchemaError::BadEnvelope(e.to_string()))?;
                Ok(pae(payload_type, &body))
            }
        }
    }

    pub fn classic(payload: Payload, signatures: Vec<Signature>) -> Self {
        Metadata::Classic { signed: payload, signatures }
    }

    pub fn envelope(payload: &Payload, signatures: Vec<Signature>) -> Result<Self, SchemaError> {
        let body = serde_json::to_vec(payload).map_err(|e| SchemaError::BadEnvelope(e.to_string()))?;
        let payload_b64 = base64::engine::general_purpose::STANDARD.encode(body);
        Ok(Metadata::Envelope { payload_b64, payload_type: ENVELOPE_PAYLOAD_TYPE.to_string(), signatures })
    }

    /// Verify signatures against `authorized_keys`, discarding any with an
    /// unauthorized or invalid signature rather than failing outright
    /// (spec §4.7 step 4: "discard links with unauthorized or invalid
    /// signatures (do not fail)"). Returns the keyids whose signature
    /// verified.
    pub fn valid_signer_keyids(&self, authorized_keys: &BTreeMap<String, PublicKey>) -> Vec<String> {
        let bytes = match self.signable_bytes() {
            Ok(b) => b,
            Err(_) => return Vec::new(),
        };
        let mut seen_primaries = std::collections::BTreeSet::new();
        let mut valid = Vec::new();
        for sig in self.signatures() {
            let Some(key) = authorized_keys.get(&sig.keyid) else {
                // The signature might name a sub-key's own keyid directly,
                // or a primary whose sub-key actually produced the sig. Try
                // every authorized key's `satisfies` before giving up.
                let hit = authorized_keys.iter().find(|(primary_id, key)| {
                    key.satisfies(&sig.keyid).unwrap_or(false) && seen_primaries.insert((*primary_id).clone())
                });
                if let Some((primary_id, key)) = hit {
                    if crypto::verify(&bytes, sig, key).is_ok() {
                        valid.push(primary_id.clone());
                    }
                }
                continue;
            };
            if !seen_primaries.insert(sig.keyid.clone()) {
                // Spec §4.2: no sub-key contributes more than once toward a threshold.
                continue;
            }
            if crypto::verify(&bytes, sig, key).is_ok() {
                valid.push(sig.keyid.clone());
            }
        }
        valid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::ed25519_scheme::Ed25519Signer;
    use crate::crypto::Signer as _;
    use crate::model::Link;

    #[test]
    fn classic_wrapper_signable_bytes_is_canonical_payload() {
        let link = Payload::Link(Link::new("clone"));
        let meta = Metadata::classic(link.clone(), vec![]);
        let expected = canonical::encode(&link).unwrap();
        assert_eq!(meta.signable_bytes().unwrap(), expected);
    }

    #[test]
    fn envelope_wrapper_signable_bytes_is_pae() {
        let link = Payload::Link(Link::new("clone"));
        let meta = Metadata::envelope(&link, vec![]).unwrap();
        let Metadata::Envelope { payload_b64, payload_type, .. } = &meta else { panic!() };
        let body = base64::engine::general_purpose::STANDARD.decode(payload_b64).unwrap();
        assert_eq!(meta.signable_bytes().unwrap(), pae(payload_type, &body));
    }

    #[test]
    fn valid_signer_keyids_accepts_correct_signature_and_rejects_others() {
        let signer = Ed25519Signer::from_seed(&[4u8; 32]).unwrap();
        let other = Ed25519Signer::from_seed(&[5u8; 32]).unwrap();
        let payload = Payload::Link(Link::new("clone"));
        let bytes = canonical::encode(&payload).unwrap();
        let good_sig = signer.sign(&bytes).unwrap();
        let bad_sig = other.sign(&bytes).unwrap();

        let meta = Metadata::classic(payload, vec![good_sig.clone(), bad_sig]);
        let mut authorized = BTreeMap::new();
        authorized.insert(signer.key_id().unwrap(), signer.public_key());

        let valid = meta.valid_signer_keyids(&authorized);
        assert_eq!(valid, vec![signer.key_id().unwrap()]);
    }
}
