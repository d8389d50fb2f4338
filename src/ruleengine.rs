//! Queue-based artifact rule engine (spec §4.6) — Component F.
//!
//! Each rule consumes paths from one of two queues (seeded from the full
//! set of reported materials or products) and either removes matches from
//! the queue (MATCH/ALLOW/CREATE/DELETE/MODIFY) or inspects without
//! consuming (REQUIRE). MATCH never fails on a miss — an entry it can't
//! satisfy is simply left in the queue for a later rule to deal with
//! (spec §4.6: "entries not satisfied are left in the queue so a
//! subsequent DISALLOW can flag them"). After every rule in a list has
//! run, any path still left in the queue is implicitly authorized (spec
//! §4.6) unless the rule list ends with an explicit `DISALLOW` that
//! still matches it — which is why the idiomatic final rule is
//! `DISALLOW *`, not a default-deny the engine enforces on its own.

use std::collections::BTreeSet;

use thiserror::Error;

use crate::error::{Classify, Kind};
use crate::glob;
use crate::model::{ArtifactMap, ArtifactRule, DigestSet, Link};

/// Which side of a link's evidence a rule list is being evaluated against
/// (spec §4.6: CREATE is a no-op on the materials side, DELETE a no-op on
/// the products side; both need the *other* side's full set to decide
/// whether a path is genuinely new or gone).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Materials,
    Products,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RuleError {
    #[error("rule {0} matched no artifacts: {1}")]
    NoMatch(String, String),
    #[error("DISALLOW rule {0:?} matched artifact {1:?}")]
    Disallowed(String, String),
    #[error("REQUIRE rule: required artifact {0:?} is not present")]
    RequiredMissing(String),
    #[error("MATCH rule referenced a step/inspection with no recorded link: {0:?}")]
    MissingLinkedArtifacts(String),
}

impl Classify for RuleError {
    fn kind(&self) -> Kind {
        Kind::Rule
    }
}

/// A live working set: paths not yet claimed by a rule, plus the
/// unfiltered full set needed to re-check membership for rules like
/// MATCH that consult the *other* side of a different step's link.
struct Queue<'a> {
    full: &'a ArtifactMap,
    remaining: BTreeSet<String>,
}

impl<'a> Queue<'a> {
    fn new(full: &'a ArtifactMap) -> Self {
        Self { full, remaining: full.keys().cloned().collect() }
    }

    fn matching(&self, pattern: &str, prefix: Option<&str>) -> Vec<String> {
        self.remaining
            .iter()
            .filter(|path| {
                let candidate = strip_prefix(path, prefix);
                candidate.map(|c| glob::matches(pattern, c)).unwrap_or(false)
            })
            .cloned()
            .collect()
    }

    fn consume(&mut self, paths: &[String]) {
        for p in paths {
            self.remaining.remove(p);
        }
    }
}

fn strip_prefix<'a>(path: &'a str, prefix: Option<&str>) -> Option<&'a str> {
    match prefix {
        None => Some(path),
        Some(p) => {
            let p = p.trim_end_matches('/');
            path.strip_prefix(p).map(|rest| rest.trim_start_matches('/'))
        }
    }
}

/// Evaluate `rules` against the reported artifact set for one side of a
/// link (spec §4.6).
///
/// `side` tells the engine which side `reported` is (so CREATE can no-op
/// on materials and DELETE can no-op on products); `other_side` is the
/// *same link's* opposite side, consulted by CREATE/DELETE/MODIFY to
/// decide whether a path is genuinely new, gone, or changed. `linked`
/// supplies the other step/inspection's artifact maps, keyed by name, for
/// MATCH rules to compare against (the rule's own `side` field selects
/// materials vs. products of that linked step).
pub fn evaluate(
    rules: &[ArtifactRule],
    side: Side,
    reported: &ArtifactMap,
    other_side: &ArtifactMap,
    linked: &dyn Fn(&str) -> Option<(ArtifactMap, ArtifactMap)>,
) -> Result<(), RuleError> {
    let mut queue = Queue::new(reported);

    for rule in rules {
        match rule {
            ArtifactRule::Match { pattern, src_prefix, side, dst_prefix, from_step } => {
                let Some((materials, products)) = linked(from_step) else {
                    return Err(RuleError::MissingLinkedArtifacts(from_step.clone()));
                };
                let other = match side {
                    crate::model::rule::Side::Materials => materials,
                    crate::model::rule::Side::Products => products,
                };
                let candidates = queue.matching(pattern, src_prefix.as_deref());
                let mut matched = Vec::new();
                for path in &candidates {
                    let local_rel = strip_prefix(path, src_prefix.as_deref()).unwrap_or(path);
                    let dst_rel_path = match dst_prefix {
                        Some(dst) => format!("{}/{}", dst.trim_end_matches('/'), local_rel),
                        None => local_rel.to_string(),
                    };
                    if let (Some(local_digest), Some(other_digest)) = (reported.get(path), other.get(&dst_rel_path)) {
                        if shares_digest(local_digest, other_digest) {
                            matched.push(path.clone());
                        }
                    }
                }
                // A MATCH miss is not a failure (spec §4.6): unsatisfied
                // entries are left in the queue for a later DISALLOW (or
                // the implicit-allow default below) to decide.
                queue.consume(&matched);
            }
            ArtifactRule::Allow { pattern } => {
                let matched = queue.matching(pattern, None);
                queue.consume(&matched);
            }
            ArtifactRule::Disallow { pattern } => {
                let matched = queue.matching(pattern, None);
                if let Some(hit) = matched.first() {
                    return Err(RuleError::Disallowed(pattern.clone(), hit.clone()));
                }
            }
            ArtifactRule::Require { filename } => {
                if !reported.contains_key(filename.as_str()) {
                    return Err(RuleError::RequiredMissing(filename.clone()));
                }
            }
            ArtifactRule::Create { pattern } => {
                // Ignored on the materials side (spec §4.6 table).
                if side == Side::Materials {
                    continue;
                }
                let candidates = queue.matching(pattern, None);
                let created: Vec<String> = candidates.into_iter().filter(|p| !other_side.contains_key(p)).collect();
                if created.is_empty() {
                    return Err(RuleError::NoMatch("CREATE".into(), pattern.clone()));
                }
                queue.consume(&created);
            }
            ArtifactRule::Delete { pattern } => {
                // Ignored on the products side (spec §4.6 table).
                if side == Side::Products {
                    continue;
                }
                let candidates = queue.matching(pattern, None);
                let deleted: Vec<String> = candidates.into_iter().filter(|p| !other_side.contains_key(p)).collect();
                if deleted.is_empty() {
                    return Err(RuleError::NoMatch("DELETE".into(), pattern.clone()));
                }
                queue.consume(&deleted);
            }
            ArtifactRule::Modify { pattern } => {
                let candidates = queue.matching(pattern, None);
                let modified: Vec<String> = candidates
                    .into_iter()
                    .filter(|p| {
                        let Some(other_digest) = other_side.get(p) else { return false };
                        let local_digest = reported.get(p).expect("path came from the reported queue");
                        !shares_digest(local_digest, other_digest)
                    })
                    .collect();
                if modified.is_empty() {
                    return Err(RuleError::NoMatch("MODIFY".into(), pattern.clone()));
                }
                queue.consume(&modified);
            }
        }
    }

    // Anything still in the queue after every rule has run is implicitly
    // authorized (spec §4.6) — only an explicit DISALLOW that still
    // matches it, above, turns that into a failure.
    Ok(())
}

fn shares_digest(a: &DigestSet, b: &DigestSet) -> bool {
    a.iter().any(|(algo, digest)| b.get(algo).is_some_and(|other| other == digest))
}

/// Convenience wrapper over [`evaluate`] that sources the "linked" side
/// from a map of already-loaded links (spec §4.7 step 6: by the time
/// rules run, every MATCH target step's link has already been selected).
pub fn evaluate_against_links(
    rules: &[ArtifactRule],
    side: Side,
    reported: &ArtifactMap,
    other_side: &ArtifactMap,
    links: &std::collections::BTreeMap<String, Link>,
) -> Result<(), RuleError> {
    evaluate(rules, side, reported, other_side, &|name| {
        links.get(name).map(|l| (l.materials.clone(), l.products.clone()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::rule::Side as RuleSide;
    use std::collections::BTreeMap;

    fn digest(hex: &str) -> crate::model::DigestSet {
        let mut d = BTreeMap::new();
        d.insert("sha256".to_string(), hex.to_string());
        d
    }

    fn empty() -> ArtifactMap {
        ArtifactMap::new()
    }

    #[test]
    fn allow_then_empty_queue_passes() {
        let mut reported = ArtifactMap::new();
        reported.insert("foo.py".into(), digest("aa"));
        let rules = vec![ArtifactRule::Allow { pattern: "*.py".into() }];
        assert!(evaluate(&rules, Side::Materials, &reported, &empty(), &|_| None).is_ok());
    }

    #[test]
    fn leftover_artifact_is_implicitly_allowed_by_default() {
        let mut reported = ArtifactMap::new();
        reported.insert("foo.py".into(), digest("aa"));
        reported.insert("bar.txt".into(), digest("bb"));
        let rules = vec![ArtifactRule::Allow { pattern: "*.py".into() }];
        assert!(evaluate(&rules, Side::Materials, &reported, &empty(), &|_| None).is_ok());
    }

    #[test]
    fn trailing_disallow_star_turns_leftover_into_a_failure() {
        let mut reported = ArtifactMap::new();
        reported.insert("foo.py".into(), digest("aa"));
        reported.insert("bar.txt".into(), digest("bb"));
        let rules =
            vec![ArtifactRule::Allow { pattern: "*.py".into() }, ArtifactRule::Disallow { pattern: "*".into() }];
        let err = evaluate(&rules, Side::Materials, &reported, &empty(), &|_| None).unwrap_err();
        assert!(matches!(err, RuleError::Disallowed(_, _)));
    }

    #[test]
    fn disallow_matching_artifact_fails() {
        let mut reported = ArtifactMap::new();
        reported.insert("secret.key".into(), digest("aa"));
        let rules = vec![ArtifactRule::Disallow { pattern: "*.key".into() }];
        let err = evaluate(&rules, Side::Materials, &reported, &empty(), &|_| None).unwrap_err();
        assert!(matches!(err, RuleError::Disallowed(_, _)));
    }

    #[test]
    fn require_missing_artifact_fails() {
        let reported = ArtifactMap::new();
        let rules = vec![ArtifactRule::Require { filename: "README.md".into() }];
        let err = evaluate(&rules, Side::Materials, &reported, &empty(), &|_| None).unwrap_err();
        assert!(matches!(err, RuleError::RequiredMissing(_)));
    }

    #[test]
    fn match_consumes_when_digests_agree_with_linked_step() {
        let mut reported = ArtifactMap::new();
        reported.insert("foo.tar".into(), digest("aa"));
        let mut other_products = ArtifactMap::new();
        other_products.insert("foo.tar".into(), digest("aa"));

        let rules = vec![ArtifactRule::Match {
            pattern: "*.tar".into(),
            src_prefix: None,
            side: RuleSide::Products,
            dst_prefix: None,
            from_step: "clone".into(),
        }];
        let result = evaluate(&rules, Side::Products, &reported, &empty(), &|name| {
            if name == "clone" {
                Some((ArtifactMap::new(), other_products.clone()))
            } else {
                None
            }
        });
        assert!(result.is_ok());
    }

    #[test]
    fn match_leaves_disagreeing_entry_in_queue_instead_of_failing() {
        let mut reported = ArtifactMap::new();
        reported.insert("foo.tar".into(), digest("aa"));
        let mut other_products = ArtifactMap::new();
        other_products.insert("foo.tar".into(), digest("zz"));

        let rules = vec![ArtifactRule::Match {
            pattern: "*.tar".into(),
            src_prefix: None,
            side: RuleSide::Products,
            dst_prefix: None,
            from_step: "clone".into(),
        }];
        // No DISALLOW follows, so the unsatisfied entry is implicitly
        // allowed (spec §4.6) rather than failing the MATCH itself.
        let result = evaluate(&rules, Side::Products, &reported, &empty(), &|_| {
            Some((ArtifactMap::new(), other_products.clone()))
        });
        assert!(result.is_ok());
    }

    #[test]
    fn match_miss_then_disallow_star_fails() {
        let mut reported = ArtifactMap::new();
        reported.insert("foo.tar".into(), digest("aa"));
        let mut other_products = ArtifactMap::new();
        other_products.insert("foo.tar".into(), digest("zz"));

        let rules = vec![
            ArtifactRule::Match {
                pattern: "*.tar".into(),
                src_prefix: None,
                side: RuleSide::Products,
                dst_prefix: None,
                from_step: "clone".into(),
            },
            ArtifactRule::Disallow { pattern: "*".into() },
        ];
        let err = evaluate(&rules, Side::Products, &reported, &empty(), &|_| {
            Some((ArtifactMap::new(), other_products.clone()))
        })
        .unwrap_err();
        assert!(matches!(err, RuleError::Disallowed(_, _)));
    }

    #[test]
    fn create_consumes_product_absent_from_materials() {
        let mut products = ArtifactMap::new();
        products.insert("foo.tar.gz".into(), digest("aa"));
        let rules = vec![ArtifactRule::Create { pattern: "foo.tar.gz".into() }];
        assert!(evaluate(&rules, Side::Products, &products, &empty(), &|_| None).is_ok());
    }

    #[test]
    fn create_fails_when_path_already_present_in_materials() {
        let mut products = ArtifactMap::new();
        products.insert("foo.tar.gz".into(), digest("aa"));
        let mut materials = ArtifactMap::new();
        materials.insert("foo.tar.gz".into(), digest("aa"));
        let rules = vec![ArtifactRule::Create { pattern: "foo.tar.gz".into() }];
        let err = evaluate(&rules, Side::Products, &products, &materials, &|_| None).unwrap_err();
        assert!(matches!(err, RuleError::NoMatch(_, _)));
    }

    #[test]
    fn create_is_a_no_op_on_materials_side() {
        let mut materials = ArtifactMap::new();
        materials.insert("foo.tar.gz".into(), digest("aa"));
        let rules =
            vec![ArtifactRule::Create { pattern: "foo.tar.gz".into() }, ArtifactRule::Allow { pattern: "*".into() }];
        assert!(evaluate(&rules, Side::Materials, &materials, &empty(), &|_| None).is_ok());
    }

    #[test]
    fn delete_consumes_material_absent_from_products() {
        let mut materials = ArtifactMap::new();
        materials.insert("old.txt".into(), digest("aa"));
        let rules = vec![ArtifactRule::Delete { pattern: "old.txt".into() }];
        assert!(evaluate(&rules, Side::Materials, &materials, &empty(), &|_| None).is_ok());
    }

    #[test]
    fn delete_fails_when_path_still_present_in_products() {
        let mut materials = ArtifactMap::new();
        materials.insert("old.txt".into(), digest("aa"));
        let mut products = ArtifactMap::new();
        products.insert("old.txt".into(), digest("aa"));
        let rules = vec![ArtifactRule::Delete { pattern: "old.txt".into() }];
        let err = evaluate(&rules, Side::Materials, &materials, &products, &|_| None).unwrap_err();
        assert!(matches!(err, RuleError::NoMatch(_, _)));
    }

    #[test]
    fn modify_consumes_path_with_differing_digest_on_both_sides() {
        let mut materials = ArtifactMap::new();
        materials.insert("src.py".into(), digest("aa"));
        let mut products = ArtifactMap::new();
        products.insert("src.py".into(), digest("bb"));
        let rules = vec![ArtifactRule::Modify { pattern: "src.py".into() }];
        assert!(evaluate(&rules, Side::Materials, &materials, &products, &|_| None).is_ok());
    }

    #[test]
    fn modify_fails_when_digest_is_unchanged() {
        let mut materials = ArtifactMap::new();
        materials.insert("src.py".into(), digest("aa"));
        let mut products = ArtifactMap::new();
        products.insert("src.py".into(), digest("aa"));
        let rules = vec![ArtifactRule::Modify { pattern: "src.py".into() }];
        let err = evaluate(&rules, Side::Materials, &materials, &products, &|_| None).unwrap_err();
        assert!(matches!(err, RuleError::NoMatch(_, _)));
    }
}
