//! Link payload (spec §3).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{ArtifactMap, SchemaError};

/// Evidence that a step executed with particular materials/products.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub name: String,
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub materials: ArtifactMap,
    #[serde(default)]
    pub products: ArtifactMap,
    #[serde(default)]
    pub byproducts: Byproducts,
    #[serde(default)]
    pub environment: BTreeMap<String, serde_json::Value>,
}

/// Captured side effects of running a step's command (spec §3).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Byproducts {
    #[serde(rename = "return-value", default, skip_serializing_if = "Option::is_none")]
    pub return_value: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
}

impl Link {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: Vec::new(),
            materials: BTreeMap::new(),
            products: BTreeMap::new(),
            byproducts: Byproducts::default(),
            environment: BTreeMap::new(),
        }
    }

    /// Invariant check (spec §3): material/product keys are normalized
    /// paths — no backslashes, no repeated slashes, no trailing slash on
    /// a path (directories are not valid link entries).
    pub fn validate(&self) -> Result<(), SchemaError> {
        for key in self.materials.keys().chain(self.products.keys()) {
            if key.contains('\\') || key.contains("//") || (key.ends_with('/') && key.len() > 1) {
                return Err(SchemaError::BadPath(key.clone()));
            }
        }
        Ok(())
    }

    /// Two links "agree" (spec §4.7 step 4) if their command, materials,
    /// and products are identical after canonicalization.
    pub fn agrees_with(&self, other: &Link) -> bool {
        self.command == other.command && self.materials == other.materials && self.products == other.products
    }
}
