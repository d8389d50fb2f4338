//! The filesystem collaborator (spec §1, §6): "an external file source
//! providing iterate+read operations." This crate is not in the business
//! of owning I/O policy (sandboxing, chroots, virtual filesystems) — that
//! is exactly the kind of concern spec §1 hands to a collaborator. What's
//! provided here is the trait boundary plus one straightforward
//! `std::fs`-backed implementation, so the recording engine and
//! resolvers have something real to run against.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::error::{Classify, Kind};

#[derive(Debug, Error)]
pub enum FsError {
    #[error("path not found: {0}")]
    NotFound(PathBuf),
    #[error("symlink loop detected at {0}")]
    SymlinkLoop(PathBuf),
    #[error("io error at {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
}

impl Classify for FsError {
    fn kind(&self) -> Kind {
        Kind::Io
    }
}

/// Iterate + read operations over a filesystem-like backend.
pub trait FileSource {
    /// List every regular file reachable under `root` (recursing into
    /// directories, following symlinks). Order is unspecified; callers
    /// must not depend on it (spec §5: the recorded map's ordering is
    /// stable independent of hashing/traversal order).
    fn iterate(&self, root: &Path) -> Result<Vec<PathBuf>, FsError>;

    /// True if `path` names a directory.
    fn is_dir(&self, path: &Path) -> bool;

    /// True if `path` exists at all (file or directory).
    fn exists(&self, path: &Path) -> bool;

    /// Read the full contents of the file at `path`.
    fn read(&self, path: &Path) -> Result<Vec<u8>, FsError>;
}

/// Default [`FileSource`] backed directly by `std::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdFileSource;

impl StdFileSource {
    fn walk(&self, root: &Path, visited: &mut HashSet<PathBuf>, out: &mut Vec<PathBuf>) -> Result<(), FsError> {
        let canonical = fs::canonicalize(root).map_err(|source| FsError::Io { path: root.to_path_buf(), source })?;
        if !visited.insert(canonical) {
            return Err(FsError::SymlinkLoop(root.to_path_buf()));
        }

        let metadata = fs::symlink_metadata(root).map_err(|source| FsError::Io { path: root.to_path_buf(), source })?;

        if metadata.is_dir() {
            let entries = fs::read_dir(root).map_err(|source| FsError::Io { path: root.to_path_buf(), source })?;
            let mut children: Vec<PathBuf> = entries
                .map(|e| e.map(|e| e.path()))
                .collect::<Result<_, _>>()
                .map_err(|source| FsError::Io { path: root.to_path_buf(), source })?;
            children.sort();
            for child in children {
                self.walk(&child, visited, out)?;
            }
        } else {
            // Regular file, or a symlink to one (canonicalize above resolved
            // the link; fs::metadata — not symlink_metadata — confirms the
            // target kind so symlinks-to-files are followed as spec §4.4
            // requires).
            let target_meta =
                fs::metadata(root).map_err(|source| FsError::Io { path: root.to_path_buf(), source })?;
            if target_meta.is_file() {
                out.push(root.to_path_buf());
            } else if target_meta.is_dir() {
                self.walk(root, visited, out)?;
            }
        }
        Ok(())
    }
}

impl FileSource for StdFileSource {
    fn iterate(&self, root: &Path) -> Result<Vec<PathBuf>, FsError> {
        if !root.exists() {
            return Err(FsError::NotFound(root.to_path_buf()));
        }
        let mut visited = HashSet::new();
        let mut out = Vec::new();
        self.walk(root, &mut visited, &mut out)?;
        Ok(out)
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>, FsError> {
        fs::read(path).map_err(|source| FsError::Io { path: path.to_path_buf(), source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn iterate_finds_nested_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("a/b")).unwrap();
        std::fs::write(dir.path().join("a/b/file.txt"), b"hi").unwrap();
        std::fs::write(dir.path().join("top.txt"), b"hello").unwrap();

        let source = StdFileSource;
        let mut files = source.iterate(dir.path()).unwrap();
        files.sort();
        assert_eq!(files.len(), 2);
    }

    #[test]
    fn read_returns_exact_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.bin");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(b"\x00\x01\x02").unwrap();
        let source = StdFileSource;
        assert_eq!(source.read(&path).unwrap(), vec![0, 1, 2]);
    }
}
