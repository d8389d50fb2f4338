//! Layout payload (spec §3) — the project owner's signed pipeline policy.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::rule::ArtifactRule;
use super::SchemaError;
use crate::crypto::PublicKey;

/// The project owner's signed policy document describing the expected
/// pipeline (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Layout {
    pub expires: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readme: Option<String>,
    #[serde(default)]
    pub keys: BTreeMap<String, PublicKey>,
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(default)]
    pub inspect: Vec<Inspection>,
}

/// A declared task; one Step may be evidenced by one or more Links.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub name: String,
    #[serde(default)]
    pub expected_command: Vec<String>,
    pub pubkeys: BTreeSet<String>,
    pub threshold: usize,
    #[serde(default)]
    pub expected_materials: Vec<ArtifactRule>,
    #[serde(default)]
    pub expected_products: Vec<ArtifactRule>,
}

/// A verifier-side task whose evidence is generated at verification time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Inspection {
    pub name: String,
    #[serde(default)]
    pub run: Vec<String>,
    #[serde(default)]
    pub expected_materials: Vec<ArtifactRule>,
    #[serde(default)]
    pub expected_products: Vec<ArtifactRule>,
}

/// True if `name` is safe to use as a step/inspection name: non-empty, no
/// path separator (spec §3 invariant: "Step and Inspection names are
/// unique and contain no path separators").
fn is_safe_name(name: &str) -> bool {
    !name.is_empty() && !name.contains('/') && !name.contains('\\')
}

impl Layout {
    /// Validate the invariants of spec §3. Called on load and on
    /// construction (component C).
    pub fn validate(&self) -> Result<(), SchemaError> {
        let mut seen_names: BTreeSet<&str> = BTreeSet::new();

        for step in &self.steps {
            if !is_safe_name(&step.name) {
                return Err(SchemaError::BadName(step.name.clone()));
            }
            if !seen_names.insert(step.name.as_str()) {
                return Err(SchemaError::DuplicateName(step.name.clone()));
            }
            if step.threshold == 0 {
                return Err(SchemaError::BadThreshold(step.name.clone(), "threshold must be >= 1".into()));
            }
            if step.pubkeys.is_empty() {
                return Err(SchemaError::BadThreshold(
                    step.name.clone(),
                    "pubkeys must be non-empty; an empty pubkeys set can never satisfy any threshold".into(),
                ));
            }
            if step.threshold > step.pubkeys.len() {
                return Err(SchemaError::BadThreshold(
                    step.name.clone(),
                    format!("threshold {} exceeds {} authorized keys", step.threshold, step.pubkeys.len()),
                ));
            }
            for keyid in &step.pubkeys {
                if !self.keys.contains_key(keyid) {
                    return Err(SchemaError::UnknownKeyId(keyid.clone()));
                }
            }
            for rule in step.expected_materials.iter().chain(step.expected_products.iter()) {
                self.validate_rule_reference(rule)?;
            }
        }

        for inspection in &self.inspect {
            if !is_safe_name(&inspection.name) {
                return Err(SchemaError::BadName(inspection.name.clone()));
            }
            if !seen_names.insert(inspection.name.as_str()) {
                return Err(SchemaError::DuplicateName(inspection.name.clone()));
            }
            for rule in inspection.expected_materials.iter().chain(inspection.expected_products.iter()) {
                self.validate_rule_reference(rule)?;
            }
        }

        self.check_match_cycles()?;

        Ok(())
    }

    /// Build the "depends on" graph induced by MATCH rules (an owner
    /// step/inspection depends on every `from_step` it references) and
    /// reject it if it contains a cycle (spec §9: "Implementations should
    /// detect cycles among MATCH `FROM` references and fail with Schema").
    fn check_match_cycles(&self) -> Result<(), SchemaError> {
        let mut edges: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for step in &self.steps {
            let deps = edges.entry(step.name.as_str()).or_default();
            for rule in step.expected_materials.iter().chain(step.expected_products.iter()) {
                if let ArtifactRule::Match { from_step, .. } = rule {
                    deps.insert(from_step.as_str());
                }
            }
        }
        for inspection in &self.inspect {
            let deps = edges.entry(inspection.name.as_str()).or_default();
            for rule in inspection.expected_materials.iter().chain(inspection.expected_products.iter()) {
                if let ArtifactRule::Match { from_step, .. } = rule {
                    deps.insert(from_step.as_str());
                }
            }
        }

        #[derive(Clone, Copy, PartialEq, Eq)]
        enum Mark {
            InProgress,
            Done,
        }
        let mut marks: BTreeMap<&str, Mark> = BTreeMap::new();

        fn visit<'a>(
            node: &'a str,
            edges: &BTreeMap<&'a str, BTreeSet<&'a str>>,
            marks: &mut BTreeMap<&'a str, Mark>,
        ) -> Result<(), SchemaError> {
            match marks.get(node) {
                Some(Mark::Done) => return Ok(()),
                Some(Mark::InProgress) => return Err(SchemaError::CyclicMatchReference(node.to_string())),
                None => {}
            }
            marks.insert(node, Mark::InProgress);
            if let Some(deps) = edges.get(node) {
                for &dep in deps {
                    visit(dep, edges, marks)?;
                }
            }
            marks.insert(node, Mark::Done);
            Ok(())
        }

        for &node in edges.keys() {
            visit(node, &edges, &mut marks)?;
        }
        Ok(())
    }

    /// A `MATCH ... FROM step` rule must reference a step (or inspection)
    /// actually declared in this layout; references form a DAG (spec §9)
    /// and a self-reference or otherwise-dangling name is a schema error.
    fn validate_rule_reference(&self, rule: &ArtifactRule) -> Result<(), SchemaError> {
        if let ArtifactRule::Match { from_step, .. } = rule {
            let known = self.steps.iter().any(|s| &s.name == from_step)
                || self.inspect.iter().any(|i| &i.name == from_step);
            if !known {
                return Err(SchemaError::DanglingMatchReference(from_step.clone()));
            }
        }
        Ok(())
    }

    pub fn step(&self, name: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.name == name)
    }

    pub fn inspection(&self, name: &str) -> Option<&Inspection> {
        self.inspect.iter().find(|i| i.name == name)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Scheme;

    fn sample_key(tag: u8) -> (String, PublicKey) {
        let pk = PublicKey::new(Scheme::Ed25519, vec![tag; 32]);
        (pk.key_id().unwrap(), pk)
    }

    fn base_layout() -> Layout {
        Layout {
            expires: "2999-01-01T00:00:00Z".parse().unwrap(),
            readme: None,
            keys: BTreeMap::new(),
            steps: Vec::new(),
            inspect: Vec::new(),
        }
    }

    #[test]
    fn rejects_dangling_keyid() {
        let mut layout = base_layout();
        layout.steps.push(Step {
            name: "clone".into(),
            expected_command: vec![],
            pubkeys: BTreeSet::from(["deadbeef".to_string()]),
            threshold: 1,
            expected_materials: vec![],
            expected_products: vec![],
        });
        assert!(matches!(layout.validate(), Err(SchemaError::UnknownKeyId(_))));
    }

    #[test]
    fn rejects_threshold_exceeding_pubkeys() {
        let mut layout = base_layout();
        let (keyid, key) = sample_key(1);
        layout.keys.insert(keyid.clone(), key);
        layout.steps.push(Step {
            name: "clone".into(),
            expected_command: vec![],
            pubkeys: BTreeSet::from([keyid]),
            threshold: 2,
            expected_materials: vec![],
            expected_products: vec![],
        });
        assert!(matches!(layout.validate(), Err(SchemaError::BadThreshold(_, _))));
    }

    #[test]
    fn rejects_empty_pubkeys_even_with_threshold_one() {
        let mut layout = base_layout();
        layout.steps.push(Step {
            name: "clone".into(),
            expected_command: vec![],
            pubkeys: BTreeSet::new(),
            threshold: 1,
            expected_materials: vec![],
            expected_products: vec![],
        });
        assert!(matches!(layout.validate(), Err(SchemaError::BadThreshold(_, _))));
    }

    #[test]
    fn rejects_path_separator_in_name() {
        let mut layout = base_layout();
        let (keyid, key) = sample_key(1);
        layout.keys.insert(keyid.clone(), key);
        layout.steps.push(Step {
            name: "a/b".into(),
            expected_command: vec![],
            pubkeys: BTreeSet::from([keyid]),
            threshold: 1,
            expected_materials: vec![],
            expected_products: vec![],
        });
        assert!(matches!(layout.validate(), Err(SchemaError::BadName(_))));
    }

    #[test]
    fn rejects_dangling_match_reference() {
        let mut layout = base_layout();
        let (keyid, key) = sample_key(1);
        layout.keys.insert(keyid.clone(), key);
        layout.steps.push(Step {
            name: "package".into(),
            expected_command: vec![],
            pubkeys: BTreeSet::from([keyid]),
            threshold: 1,
            expected_materials: vec![ArtifactRule::Match {
                pattern: "*".into(),
                src_prefix: None,
                side: super::super::rule::Side::Products,
                dst_prefix: None,
                from_step: "nonexistent".into(),
            }],
            expected_products: vec![],
        });
        assert!(matches!(layout.validate(), Err(SchemaError::DanglingMatchReference(_))));
    }

    #[test]
    fn rejects_cyclic_match_references() {
        let mut layout = base_layout();
        let (keyid, key) = sample_key(1);
        layout.keys.insert(keyid.clone(), key);
        layout.steps.push(Step {
            name: "a".into(),
            expected_command: vec![],
            pubkeys: BTreeSet::from([keyid.clone()]),
            threshold: 1,
            expected_materials: vec![ArtifactRule::Match {
                pattern: "*".into(),
                src_prefix: None,
                side: super::super::rule::Side::Products,
                dst_prefix: None,
                from_step: "b".into(),
            }],
            expected_products: vec![],
        });
        layout.steps.push(Step {
            name: "b".into(),
            expected_command: vec![],
            pubkeys: BTreeSet::from([keyid]),
            threshold: 1,
            expected_materials: vec![ArtifactRule::Match {
                pattern: "*".into(),
                src_prefix: None,
                side: super::super::rule::Side::Products,
                dst_prefix: None,
                from_step: "a".into(),
            }],
            expected_products: vec![],
        });
        assert!(matches!(layout.validate(), Err(SchemaError::CyclicMatchReference(_))));
    }

    #[test]
    fn accepts_acyclic_match_chain() {
        let mut layout = base_layout();
        let (keyid, key) = sample_key(1);
        layout.keys.insert(keyid.clone(), key);
        layout.steps.push(Step {
            name: "clone".into(),
            expected_command: vec![],
            pubkeys: BTreeSet::from([keyid.clone()]),
            threshold: 1,
            expected_materials: vec![],
            expected_products: vec![],
        });
        layout.steps.push(Step {
            name: "build".into(),
            expected_command: vec![],
            pubkeys: BTreeSet::from([keyid]),
            threshold: 1,
            expected_materials: vec![ArtifactRule::Match {
                pattern: "*".into(),
                src_prefix: None,
                side: super::super::rule::Side::Products,
                dst_prefix: None,
                from_step: "clone".into(),
            }],
            expected_products: vec![],
        });
        assert!(layout.validate().is_ok());
    }
}
