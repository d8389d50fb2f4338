//! Recording engine (spec §4.5) — Component E.
//!
//! Three modes share the same building blocks: hash a declared set of
//! materials, (maybe) run a command, hash a declared set of products, sign
//! the resulting [`Link`]. The one ordering guarantee spec §4.5 calls out
//! explicitly — materials hash precedes command execution precedes
//! products hash — falls out of each function's straight-line structure
//! rather than needing separate enforcement.
//!
//! `wrap-and-run` does all three steps in one call. `record-start` /
//! `record-stop` split them across two process invocations — the command
//! in between is the caller's own, run outside this crate's control —
//! with the partially-filled [`Link`] persisted to disk between the two.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::canonical::{self, EncodeError};
use crate::context::RecordingContext;
use crate::crypto::{SignError, Signer};
use crate::filesystem::{FileSource, FsError};
use crate::model::{ArtifactMap, Byproducts, Link, Metadata, Payload, SchemaError};
use crate::resolvers::{self, ResolveContext, ResolveError};
use crate::runner::{CommandRunner, RunError};

#[derive(Debug, Error)]
pub enum RecordError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Run(#[from] RunError),
    #[error(transparent)]
    Sign(#[from] SignError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error(transparent)]
    Fs(#[from] FsError),
    #[error("failed to persist in-progress link at {path}: {source}")]
    Persist { path: PathBuf, source: std::io::Error },
    #[error("failed to read in-progress link at {path}: {source}")]
    Load { path: PathBuf, source: std::io::Error },
    #[error("malformed in-progress link at {0}: {1}")]
    MalformedUnfinished(PathBuf, serde_json::Error),
}

impl crate::error::Classify for RecordError {
    fn kind(&self) -> crate::error::Kind {
        match self {
            RecordError::Resolve(e) => e.kind(),
            RecordError::Run(e) => e.kind(),
            RecordError::Sign(e) => e.kind(),
            RecordError::Schema(e) => e.kind(),
            RecordError::Encode(e) => e.kind(),
            RecordError::Fs(e) => e.kind(),
            RecordError::Persist { .. } | RecordError::Load { .. } | RecordError::MalformedUnfinished(..) => {
                crate::error::Kind::Io
            }
        }
    }
}

use crate::error::Classify;

fn resolve_ctx(ctx: &RecordingContext) -> ResolveContext<'_> {
    ResolveContext {
        base_path: ctx.base_path.clone(),
        excludes: &ctx.excludes,
        algorithms: &ctx.algorithms,
        normalize_line_endings: ctx.normalize_line_endings,
    }
}

fn hash_artifacts(
    declared: &[String],
    ctx: &RecordingContext,
    source: &dyn FileSource,
) -> Result<ArtifactMap, RecordError> {
    let rc = resolve_ctx(ctx);
    let mut combined = ArtifactMap::new();
    for entry in declared {
        combined.extend(resolvers::resolve(entry, &rc, source)?);
    }
    Ok(combined)
}

/// The on-disk filename convention for a signed link (spec §4.5): the
/// step name, the first 8 hex characters of the signing keyid, and a
/// `.link` extension.
pub fn link_filename(step: &str, keyid: &str) -> String {
    let prefix = &keyid[..keyid.len().min(8)];
    format!("{step}.{prefix}.link")
}

fn sign_link(link: Link, signer: &dyn Signer) -> Result<(Link, Metadata), RecordError> {
    link.validate()?;
    let payload = Payload::Link(link.clone());
    let bytes = canonical::encode(&payload)?;
    let sig = signer.sign(&bytes)?;
    Ok((link, Metadata::classic(payload, vec![sig])))
}

/// Mode 1: hash materials, run the command, hash products, sign — all in
/// one call (spec §4.5 "wrap-and-run").
pub fn wrap_and_run(
    step: &str,
    command: &[String],
    materials: &[String],
    products: &[String],
    ctx: &RecordingContext,
    source: &dyn FileSource,
    runner: &dyn CommandRunner,
    signer: &dyn Signer,
) -> Result<(Link, Metadata), RecordError> {
    tracing::debug!(step, count = materials.len(), "hashing materials");
    let materials_map = hash_artifacts(materials, ctx, source)?;

    let cwd = ctx.base_path.clone().unwrap_or_else(|| PathBuf::from("."));
    tracing::info!(step, command = ?command, "running step command");
    let byproducts = runner.run(command, &cwd, &BTreeMap::new(), ctx.command_timeout)?;

    tracing::debug!(step, count = products.len(), "hashing products");
    let products_map = hash_artifacts(products, ctx, source)?;

    let mut link = Link::new(step);
    link.command = command.to_vec();
    link.materials = materials_map;
    link.products = products_map;
    link.byproducts = byproducts;

    sign_link(link, signer)
}

/// Mode 2: hash materials only, returning an unsigned, product-less
/// [`Link`] the caller persists (see [`save_unfinished`]) until
/// [`record_stop`] runs.
pub fn record_start(
    step: &str,
    command: &[String],
    materials: &[String],
    ctx: &RecordingContext,
    source: &dyn FileSource,
) -> Result<Link, RecordError> {
    tracing::debug!(step, count = materials.len(), "hashing materials (record-start)");
    let mut link = Link::new(step);
    link.command = command.to_vec();
    link.materials = hash_artifacts(materials, ctx, source)?;
    Ok(link)
}

/// Mode 3: given the in-progress link from [`record_start`], hash
/// products, attach byproducts captured by the caller's own command
/// invocation, and sign.
pub fn record_stop(
    started: Link,
    products: &[String],
    byproducts: Byproducts,
    ctx: &RecordingContext,
    source: &dyn FileSource,
    signer: &dyn Signer,
) -> Result<(Link, Metadata), RecordError> {
    tracing::debug!(step = %started.name, count = products.len(), "hashing products (record-stop)");
    let mut link = started;
    link.products = hash_artifacts(products, ctx, source)?;
    link.byproducts = byproducts;
    sign_link(link, signer)
}

/// Persist the materials-only link between `record-start` and
/// `record-stop`, which normally run as two separate process invocations.
pub fn save_unfinished(link: &Link, path: &Path) -> Result<(), RecordError> {
    let bytes = serde_json::to_vec_pretty(link).map_err(|e| RecordError::MalformedUnfinished(path.to_path_buf(), e))?;
    std::fs::write(path, bytes).map_err(|source| RecordError::Persist { path: path.to_path_buf(), source })
}

pub fn load_unfinished(path: &Path) -> Result<Link, RecordError> {
    let bytes = std::fs::read(path).map_err(|source| RecordError::Load { path: path.to_path_buf(), source })?;
    serde_json::from_slice(&bytes).map_err(|e| RecordError::MalformedUnfinished(path.to_path_buf(), e))
}

/// The conventional filename for an in-progress (unsigned) link (spec
/// §4.5): a leading dot marks it as a working file, not a finished
/// artifact to be shipped.
pub fn unfinished_filename(step: &str) -> String {
    format!(".{step}.link-unfinished")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::ed25519_scheme::Ed25519Signer;
    use crate::exclude::ExcludeSet;
    use crate::filesystem::StdFileSource;
    use crate::resolvers::DigestAlgorithm;
    use crate::runner::RecordedRunner;

    fn ctx(base: PathBuf) -> RecordingContext {
        RecordingContext {
            base_path: Some(base),
            excludes: ExcludeSet::empty(),
            algorithms: vec![DigestAlgorithm::Sha256],
            normalize_line_endings: false,
            command_timeout: None,
        }
    }

    #[test]
    fn wrap_and_run_hashes_materials_before_products_reflect_the_command() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("input.txt"), b"before").unwrap();

        let signer = Ed25519Signer::from_seed(&[7u8; 32]).unwrap();
        let runner = RecordedRunner { response: Byproducts { return_value: Some(0), stdout: None, stderr: None } };

        let (link, metadata) = wrap_and_run(
            "build",
            &["true".to_string()],
            &["input.txt".to_string()],
            &["input.txt".to_string()],
            &ctx(dir.path().to_path_buf()),
            &StdFileSource,
            &runner,
            &signer,
        )
        .unwrap();

        assert_eq!(link.materials, link.products);
        assert!(metadata.signatures().len() == 1);
    }

    #[test]
    fn record_start_then_stop_round_trips_through_persisted_state() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"material").unwrap();

        let started =
            record_start("build", &["true".into()], &["a.txt".into()], &ctx(dir.path().to_path_buf()), &StdFileSource)
                .unwrap();

        let unfinished_path = dir.path().join(unfinished_filename("build"));
        save_unfinished(&started, &unfinished_path).unwrap();
        let reloaded = load_unfinished(&unfinished_path).unwrap();
        assert_eq!(reloaded.materials, started.materials);

        std::fs::write(dir.path().join("b.txt"), b"product").unwrap();
        let signer = Ed25519Signer::from_seed(&[8u8; 32]).unwrap();
        let (link, _metadata) = record_stop(
            reloaded,
            &["b.txt".into()],
            Byproducts::default(),
            &ctx(dir.path().to_path_buf()),
            &StdFileSource,
            &signer,
        )
        .unwrap();

        assert!(link.materials.contains_key("a.txt"));
        assert!(link.products.contains_key("b.txt"));
    }
}
