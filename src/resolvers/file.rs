//! The `file` resolver (spec §4.4): the default scheme. Accepts a path
//! relative to the configured base path; if it names a directory, every
//! file reachable underneath is recorded individually under its
//! base-relative, `/`-normalized path.

use std::path::Path;

use super::{normalize_line_endings, normalize_path, ResolveContext, ResolveError};
use crate::filesystem::FileSource;
use crate::model::ArtifactMap;

pub fn resolve(declared: &str, ctx: &ResolveContext, source: &dyn FileSource) -> Result<ArtifactMap, ResolveError> {
    let root = ctx.resolved_root(declared);
    if !source.exists(&root) {
        return Err(ResolveError::Fs(crate::filesystem::FsError::NotFound(root)));
    }

    let mut map = ArtifactMap::new();

    if source.is_dir(&root) {
        for path in source.iterate(&root)? {
            record_one(&path, &root, ctx, source, &mut map)?;
        }
    } else {
        record_one(&root, root.parent().unwrap_or(Path::new("")), ctx, source, &mut map)?;
    }

    Ok(map)
}

fn record_one(
    path: &Path,
    root: &Path,
    ctx: &ResolveContext,
    source: &dyn FileSource,
    map: &mut ArtifactMap,
) -> Result<(), ResolveError> {
    let relative = path
        .strip_prefix(root)
        .unwrap_or(path)
        .to_str()
        .ok_or_else(|| ResolveError::BadPath(path.display().to_string()))?;
    let normalized = normalize_path(relative, true)?;

    if ctx.excludes.is_excluded(&normalized) {
        return Ok(());
    }

    let mut bytes = source.read(path)?;
    if ctx.normalize_line_endings {
        bytes = normalize_line_endings(&bytes);
    }
    map.insert(normalized, ctx.digest_set(&bytes));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exclude::ExcludeSet;
    use crate::filesystem::StdFileSource;
    use crate::resolvers::DigestAlgorithm;
    use sha2::Digest;

    #[test]
    fn resolves_single_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"hello").unwrap();
        let excludes = ExcludeSet::empty();
        let ctx = ResolveContext {
            base_path: Some(dir.path().to_path_buf()),
            excludes: &excludes,
            algorithms: &[DigestAlgorithm::Sha256],
            normalize_line_endings: false,
        };
        let map = resolve("a.txt", &ctx, &StdFileSource).unwrap();
        assert!(map.contains_key("a.txt"));
        assert_eq!(map["a.txt"]["sha256"], hex::encode(sha2::Sha256::digest(b"hello")));
    }

    #[test]
    fn resolves_directory_recursively_and_respects_excludes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/main.rs"), b"fn main() {}").unwrap();
        std::fs::write(dir.path().join("src/skip.log"), b"noise").unwrap();
        let excludes = ExcludeSet::new(["*.log"]);
        let ctx = ResolveContext {
            base_path: Some(dir.path().to_path_buf()),
            excludes: &excludes,
            algorithms: &[DigestAlgorithm::Sha256],
            normalize_line_endings: false,
        };
        let map = resolve(".", &ctx, &StdFileSource).unwrap();
        assert!(map.contains_key("src/main.rs"));
        assert!(!map.contains_key("src/skip.log"));
    }
}
