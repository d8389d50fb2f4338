//! The `dir` resolver (spec §4.4): recursively hashes a directory tree
//! into a single synthetic digest computed over a sorted listing of
//! `path:digest` tuples, rather than recording each file separately.
//! Useful when a step's declared product is "a directory, as a whole"
//! and per-file entries in the link would be noise.

use crate::model::ArtifactMap;

use super::{file, ResolveContext, ResolveError};
use crate::filesystem::FileSource;

pub fn resolve(declared: &str, ctx: &ResolveContext, source: &dyn FileSource) -> Result<ArtifactMap, ResolveError> {
    let per_file = file::resolve(declared, ctx, source)?;

    let primary = ctx.algorithms.first().map(|a| a.name()).unwrap_or("sha256");
    let mut listing = String::new();
    for (path, digests) in &per_file {
        let digest = digests.get(primary).map(String::as_str).unwrap_or("");
        listing.push_str(path);
        listing.push(':');
        listing.push_str(digest);
        listing.push('\n');
    }

    let synthetic = ctx.digest_set(listing.as_bytes());
    let mut map = ArtifactMap::new();
    map.insert(declared.to_string(), synthetic);
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exclude::ExcludeSet;
    use crate::filesystem::StdFileSource;
    use crate::resolvers::DigestAlgorithm;

    #[test]
    fn produces_one_synthetic_entry_for_whole_tree() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("a")).unwrap();
        std::fs::write(dir.path().join("a/one.txt"), b"one").unwrap();
        std::fs::write(dir.path().join("a/two.txt"), b"two").unwrap();
        let excludes = ExcludeSet::empty();
        let ctx = ResolveContext {
            base_path: Some(dir.path().to_path_buf()),
            excludes: &excludes,
            algorithms: &[DigestAlgorithm::Sha256],
            normalize_line_endings: false,
        };
        let map = resolve("a", &ctx, &StdFileSource).unwrap();
        assert_eq!(map.len(), 1);
        assert!(map.contains_key("a"));
        assert_eq!(map["a"]["sha256"].len(), 64);
    }

    #[test]
    fn synthetic_digest_is_order_independent_of_filesystem_listing() {
        let dir1 = tempfile::tempdir().unwrap();
        std::fs::write(dir1.path().join("b.txt"), b"b").unwrap();
        std::fs::write(dir1.path().join("a.txt"), b"a").unwrap();

        let dir2 = tempfile::tempdir().unwrap();
        std::fs::write(dir2.path().join("a.txt"), b"a").unwrap();
        std::fs::write(dir2.path().join("b.txt"), b"b").unwrap();

        let excludes = ExcludeSet::empty();
        let algos = [DigestAlgorithm::Sha256];
        let ctx1 = ResolveContext {
            base_path: Some(dir1.path().to_path_buf()),
            excludes: &excludes,
            algorithms: &algos,
            normalize_line_endings: false,
        };
        let ctx2 = ResolveContext {
            base_path: Some(dir2.path().to_path_buf()),
            excludes: &excludes,
            algorithms: &algos,
            normalize_line_endings: false,
        };
        let map1 = resolve(".", &ctx1, &StdFileSource).unwrap();
        let map2 = resolve(".", &ctx2, &StdFileSource).unwrap();
        assert_eq!(map1["."]["sha256"], map2["."]["sha256"]);
    }
}
