//! OpenPGP RSA and Ed25519 variants (spec §4.2).
//!
//! A full RFC 4880 implementation (packet framing, armor, web-of-trust) is
//! out of proportion to this crate's scope — see `DESIGN.md`'s Open
//! Question decision. What spec §4.2 actually requires of this crate is:
//! accept a 40-hex fingerprint as the keyid for these schemes, and verify
//! signatures made with the same RSA/Ed25519 primitives already
//! implemented in [`super::rsa_pss`] / [`super::ed25519_scheme`]. That
//! contract is implemented here; parsing an armored public key block into
//! `PublicKey.value` remains the key-file-parsing collaborator's job.

use sha2::{Digest, Sha256};

use super::{ed25519_scheme, rsa_pss, KeyError, PublicKey, Signature, VerifyError};

/// Derive the 40-hex fingerprint used as the keyid for OpenPGP keys.
///
/// Real OpenPGP fingerprints are a SHA-1 digest of the serialized public
/// key packet; we deliberately do not reproduce the RFC 4880 packet
/// encoding (no packet framing is implemented), so this derives a
/// stand-in 40-hex value from the same raw key material using SHA-256
/// truncated to 20 bytes. It is stable and collision-resistant for this
/// crate's purposes but is **not** interoperable with a real OpenPGP
/// toolchain's fingerprint.
pub fn fingerprint(key_value: &[u8]) -> Result<String, KeyError> {
    let digest = Sha256::digest(key_value);
    Ok(hex::encode(&digest[..20]))
}

pub fn verify_rsa(msg: &[u8], sig: &Signature, key: &PublicKey) -> Result<(), VerifyError> {
    rsa_pss::verify(msg, sig, key)
}

pub fn verify_ed25519(msg: &[u8], sig: &Signature, key: &PublicKey) -> Result<(), VerifyError> {
    ed25519_scheme::verify(msg, sig, key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_forty_hex_chars() {
        let fp = fingerprint(b"some-key-material").unwrap();
        assert_eq!(fp.len(), 40);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn fingerprint_is_deterministic() {
        assert_eq!(fingerprint(b"abc").unwrap(), fingerprint(b"abc").unwrap());
        assert_ne!(fingerprint(b"abc").unwrap(), fingerprint(b"abd").unwrap());
    }
}
