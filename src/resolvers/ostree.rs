//! The `ostree` resolver (spec §4.4): "hashes an OSTree commit by its
//! object id." Full libostree integration (walking the commit's dirtree,
//! resolving its repo object store) is out of proportion for this crate;
//! this resolver instead treats the operand as the commit's object id
//! directly and records a deterministic digest of it. Documented as a
//! scope reduction in DESIGN.md, the same way the OpenPGP adapter
//! substitutes a fingerprint derivation for full packet parsing.

use crate::model::ArtifactMap;

use super::{ResolveContext, ResolveError};

pub fn resolve(commit_id: &str, ctx: &ResolveContext) -> Result<ArtifactMap, ResolveError> {
    if commit_id.is_empty() {
        return Err(ResolveError::BadPath(commit_id.to_string()));
    }
    let mut map = ArtifactMap::new();
    map.insert(format!("ostree:{commit_id}"), ctx.digest_set(commit_id.as_bytes()));
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exclude::ExcludeSet;
    use crate::resolvers::DigestAlgorithm;

    #[test]
    fn digest_is_deterministic_function_of_commit_id() {
        let excludes = ExcludeSet::empty();
        let ctx = ResolveContext {
            base_path: None,
            excludes: &excludes,
            algorithms: &[DigestAlgorithm::Sha256],
            normalize_line_endings: false,
        };
        let a = resolve("abcdef0123456789", &ctx).unwrap();
        let b = resolve("abcdef0123456789", &ctx).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn empty_commit_id_rejected() {
        let excludes = ExcludeSet::empty();
        let ctx = ResolveContext { base_path: None, excludes: &excludes, algorithms: &[DigestAlgorithm::Sha256], normalize_line_endings: false };
        assert!(resolve("", &ctx).is_err());
    }
}
