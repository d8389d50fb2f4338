//! Shared argument-parsing and key-loading helpers for the CLI binaries.
//! Not part of the library surface — each `src/bin/*.rs` pulls this file
//! in via `#[path]` rather than exposing it through `lib.rs`.

use std::collections::BTreeMap;
use std::path::PathBuf;

use intoto_core::crypto::ed25519_scheme::Ed25519Signer;
use intoto_core::crypto::Signer as _;
use intoto_core::{Metadata, Payload, PublicKey};

pub fn parse_flag(args: &[String], key: &str) -> Option<String> {
    let mut it = args.iter();
    while let Some(a) = it.next() {
        if a == key {
            return it.next().cloned();
        }
    }
    None
}

pub fn parse_flag_multi(args: &[String], key: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut it = args.iter();
    while let Some(a) = it.next() {
        if a == key {
            if let Some(v) = it.next() {
                out.push(v.clone());
            }
        }
    }
    out
}

/// Loads an Ed25519 signer from a raw 32-byte seed file. Other schemes
/// (RSA-PSS, ECDSA, OpenPGP) are reachable through the library directly;
/// the CLI covers the common case.
pub fn load_ed25519_signer(path: &str) -> anyhow::Result<Ed25519Signer> {
    let bytes = std::fs::read(path)?;
    let seed: [u8; 32] =
        bytes.as_slice().try_into().map_err(|_| anyhow::anyhow!("key file {path:?} must be exactly 32 bytes"))?;
    Ed25519Signer::from_seed(&seed).map_err(|e| anyhow::anyhow!("{e}"))
}

pub fn write_metadata(path: &PathBuf, metadata: &Metadata) -> anyhow::Result<()> {
    let bytes = serde_json::to_vec_pretty(metadata)?;
    std::fs::write(path, bytes)?;
    Ok(())
}

pub fn read_metadata(path: &str) -> anyhow::Result<Metadata> {
    let bytes = std::fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

pub fn layout_root_keys(layout_metadata: &Metadata) -> anyhow::Result<BTreeMap<String, PublicKey>> {
    let payload = layout_metadata.payload()?;
    let Payload::Layout(layout) = payload else {
        anyhow::bail!("expected a layout payload");
    };
    Ok(layout.keys)
}

/// Maps a `Classify::kind()` onto the exit codes spec §6 fixes: `Io` and
/// `Schema` are malformed-input conditions (exit 2); everything else —
/// crypto, threshold, rule, expiry, runtime, timeout failures — is a
/// policy violation discovered while processing otherwise-valid input
/// (exit 1).
fn kind_to_exit_code(kind: intoto_core::Kind) -> i32 {
    use intoto_core::Kind;
    match kind {
        Kind::Io | Kind::Schema => 2,
        Kind::Crypto | Kind::Threshold | Kind::Rule | Kind::Expired | Kind::Runtime | Kind::Timeout => 1,
    }
}

/// Walks an `anyhow` error's cause chain looking for one of this crate's
/// typed, `Classify`-implementing errors to derive the process exit code
/// from. Ad hoc CLI errors (missing flags, bad arguments) never implement
/// `Classify` and fall through to 2 — they are malformed input by
/// definition, never a policy violation.
fn exit_code_for(err: &anyhow::Error) -> i32 {
    use intoto_core::Classify;
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<intoto_core::verify::VerifyError>() {
            return kind_to_exit_code(e.kind());
        }
        if let Some(e) = cause.downcast_ref::<intoto_core::recording::RecordError>() {
            return kind_to_exit_code(e.kind());
        }
        if let Some(e) = cause.downcast_ref::<intoto_core::model::SchemaError>() {
            return kind_to_exit_code(e.kind());
        }
        if let Some(e) = cause.downcast_ref::<intoto_core::resolvers::ResolveError>() {
            return kind_to_exit_code(e.kind());
        }
    }
    2
}

/// Runs a CLI binary's fallible body and terminates the process with the
/// exit code spec §6 requires: `0` on success, `1` for a verification or
/// recording policy failure, `2` for malformed/missing input.
pub fn finish(result: anyhow::Result<()>) -> ! {
    match result {
        Ok(()) => std::process::exit(0),
        Err(err) => {
            eprintln!("error: {err:#}");
            std::process::exit(exit_code_for(&err));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::kind_to_exit_code;
    use intoto_core::Kind;

    #[test]
    fn io_and_schema_kinds_are_invalid_input() {
        assert_eq!(kind_to_exit_code(Kind::Io), 2);
        assert_eq!(kind_to_exit_code(Kind::Schema), 2);
    }

    #[test]
    fn policy_kinds_are_verification_failures() {
        for kind in [Kind::Crypto, Kind::Threshold, Kind::Rule, Kind::Expired, Kind::Runtime, Kind::Timeout] {
            assert_eq!(kind_to_exit_code(kind), 1);
        }
    }

    #[test]
    fn unrecognized_error_defaults_to_invalid_input() {
        let err = anyhow::anyhow!("--step is required");
        assert_eq!(super::exit_code_for(&err), 2);
    }
}
