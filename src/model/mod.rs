//! Data model (spec §3, §4.3) — Component C.
//!
//! Constructs and validates payload objects. Validation happens both on
//! load (deserializing untrusted bytes) and on construction (building a
//! layout/link programmatically), so a value of type [`Layout`] or
//! [`Link`] that exists in memory has already passed the spec §3
//! invariants — callers never need to re-check them.

mod envelope;
mod layout;
mod link;
pub mod rule;

use std::collections::BTreeMap;

use thiserror::Error;

pub use envelope::{pae, Metadata, Payload};
pub use layout::{Inspection, Layout, Step};
pub use link::{Byproducts, Link};
pub use rule::ArtifactRule;

/// `{algorithm => hex digest}`, e.g. `{"sha256": "abc123..."}`.
pub type DigestSet = BTreeMap<String, String>;

/// `{normalized-path => DigestSet}`.
pub type ArtifactMap = BTreeMap<String, DigestSet>;

/// Schema-validation failures (spec §7 `Schema` kind): malformed payloads,
/// unknown rule tags, dangling references, duplicate/invalid names.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("unknown artifact rule tag {0:?}")]
    UnknownRuleTag(String),
    #[error("malformed artifact rule: {0}")]
    BadRule(String),
    #[error("invalid step/inspection name {0:?}: must be non-empty and contain no path separator")]
    BadName(String),
    #[error("duplicate step/inspection name {0:?}")]
    DuplicateName(String),
    #[error("step pubkeys reference unknown keyid {0:?}")]
    UnknownKeyId(String),
    #[error("invalid threshold for step {0:?}: {1}")]
    BadThreshold(String, String),
    #[error("MATCH rule references unknown step/inspection {0:?}")]
    DanglingMatchReference(String),
    #[error("MATCH rules form a reference cycle through {0:?}")]
    CyclicMatchReference(String),
    #[error("material/product path {0:?} is not a normalized path")]
    BadPath(String),
    #[error("malformed metadata envelope: {0}")]
    BadEnvelope(String),
}

impl crate::error::Classify for SchemaError {
    fn kind(&self) -> crate::error::Kind {
        crate::error::Kind::Schema
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_set_equality_requires_shared_algorithm() {
        let mut a: DigestSet = BTreeMap::new();
        a.insert("sha256".into(), "aa".into());
        let mut b: DigestSet = BTreeMap::new();
        b.insert("sha256".into(), "aa".into());
        b.insert("sha512".into(), "bb".into());
        // BTreeMap equality is exact-match, not subset; the rule engine
        // is responsible for the "at least one shared algorithm" relation
        // (spec §4.6), not DigestSet's own PartialEq.
        assert_ne!(a, b);
    }
}
