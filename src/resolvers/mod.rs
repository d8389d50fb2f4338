//! Artifact resolvers (spec §4.4) — Component D.
//!
//! A resolver turns a declared input (a plain path, or a `scheme:operand`
//! URI) into an [`ArtifactMap`] fragment. The registry dispatches by
//! scheme; a bare path with no `scheme:` prefix is treated as `file:`.
//!
//! All resolvers are pure functions of their inputs and the configured
//! hash algorithms (spec §4.4: "resolvers must be pure functions of their
//! inputs and the configured hash algorithms").

pub mod dir;
pub mod file;
pub mod ostree;

use std::path::PathBuf;

use sha2::{Digest, Sha256, Sha512};
use thiserror::Error;

use crate::error::{Classify, Kind};
use crate::exclude::ExcludeSet;
use crate::filesystem::{FileSource, FsError};
use crate::model::DigestSet;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("unknown resolver scheme {0:?}")]
    UnknownScheme(String),
    #[error(transparent)]
    Fs(#[from] FsError),
    #[error("path {0:?} escapes the configured base path")]
    EscapesBasePath(String),
    #[error("path {0:?} is not a normalized artifact path")]
    BadPath(String),
}

impl Classify for ResolveError {
    fn kind(&self) -> Kind {
        match self {
            ResolveError::Fs(_) => Kind::Io,
            _ => Kind::Schema,
        }
    }
}

/// Hash algorithms a resolver may be configured to emit (spec §4.4:
/// "default SHA-256; optionally SHA-512").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DigestAlgorithm {
    Sha256,
    Sha512,
    Blake3,
}

impl DigestAlgorithm {
    pub fn name(&self) -> &'static str {
        match self {
            DigestAlgorithm::Sha256 => "sha256",
            DigestAlgorithm::Sha512 => "sha512",
            DigestAlgorithm::Blake3 => "blake3",
        }
    }

    fn digest_hex(&self, bytes: &[u8]) -> String {
        match self {
            DigestAlgorithm::Sha256 => hex::encode(Sha256::digest(bytes)),
            DigestAlgorithm::Sha512 => hex::encode(Sha512::digest(bytes)),
            DigestAlgorithm::Blake3 => blake3::hash(bytes).to_hex().to_string(),
        }
    }
}

/// How resolvers should read and filter the filesystem (spec §4.4: base
/// path, exclusion filter, line-ending normalization, hash selection).
/// An explicit value threaded through calls rather than ambient global
/// state (spec §9).
pub struct ResolveContext<'a> {
    pub base_path: Option<PathBuf>,
    pub excludes: &'a ExcludeSet,
    pub algorithms: &'a [DigestAlgorithm],
    pub normalize_line_endings: bool,
}

impl<'a> ResolveContext<'a> {
    pub fn resolved_root(&self, declared: &str) -> PathBuf {
        match &self.base_path {
            Some(base) => base.join(declared),
            None => PathBuf::from(declared),
        }
    }

    pub fn digest_set(&self, bytes: &[u8]) -> DigestSet {
        self.algorithms.iter().map(|a| (a.name().to_string(), a.digest_hex(bytes))).collect()
    }
}

/// Normalize a path string per spec §4.4: separators become `/`, repeated
/// separators collapse, and a trailing separator on what is declared to be
/// a file is rejected.
pub fn normalize_path(raw: &str, is_file: bool) -> Result<String, ResolveError> {
    let unified: String = raw.chars().map(|c| if c == '\\' { '/' } else { c }).collect();
    let mut collapsed = String::with_capacity(unified.len());
    let mut prev_slash = false;
    for c in unified.chars() {
        if c == '/' {
            if prev_slash {
                continue;
            }
            prev_slash = true;
        } else {
            prev_slash = false;
        }
        collapsed.push(c);
    }
    let trimmed = collapsed.trim_start_matches("./");
    if is_file && trimmed.ends_with('/') {
        return Err(ResolveError::BadPath(raw.to_string()));
    }
    if trimmed.is_empty() {
        return Err(ResolveError::BadPath(raw.to_string()));
    }
    Ok(trimmed.to_string())
}

/// Apply the configured line-ending normalization (CRLF/CR -> LF), used
/// before hashing text artifacts when the caller has opted in.
pub fn normalize_line_endings(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\r' => {
                out.push(b'\n');
                if i + 1 < bytes.len() && bytes[i + 1] == b'\n' {
                    i += 1;
                }
            }
            b => out.push(b),
        }
        i += 1;
    }
    out
}

/// Resolve a single declared input, dispatching on its `scheme:` prefix
/// (bare paths default to `file:`).
pub fn resolve(
    declared: &str,
    ctx: &ResolveContext,
    source: &dyn FileSource,
) -> Result<crate::model::ArtifactMap, ResolveError> {
    match declared.split_once(':') {
        Some(("file", operand)) => file::resolve(operand, ctx, source),
        Some(("dir", operand)) => dir::resolve(operand, ctx, source),
        Some(("ostree", operand)) => ostree::resolve(operand, ctx),
        Some((scheme, _)) => Err(ResolveError::UnknownScheme(scheme.to_string())),
        None => file::resolve(declared, ctx, source),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_and_converts_separators() {
        assert_eq!(normalize_path("a\\\\b//c", true).unwrap(), "a/b/c");
    }

    #[test]
    fn normalize_rejects_trailing_slash_on_file() {
        assert!(normalize_path("a/b/", true).is_err());
        assert!(normalize_path("a/b/", false).is_ok());
    }

    #[test]
    fn line_ending_normalization_unifies_crlf_and_cr() {
        assert_eq!(normalize_line_endings(b"a\r\nb\rc\n"), b"a\nb\nc\n");
    }

    #[test]
    fn unknown_scheme_is_rejected() {
        let excludes = ExcludeSet::empty();
        let ctx = ResolveContext { base_path: None, excludes: &excludes, algorithms: &[DigestAlgorithm::Sha256], normalize_line_endings: false };
        let source = crate::filesystem::StdFileSource;
        let err = resolve("s3:bucket/key", &ctx, &source).unwrap_err();
        assert!(matches!(err, ResolveError::UnknownScheme(s) if s == "s3"));
    }
}
