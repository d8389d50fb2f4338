//! Explicit context values (spec §9: "avoid global mutable state; thread
//! configuration through explicit context values instead"). Recording and
//! verification each get their own context struct rather than sharing one
//! do-everything bag of options.

use std::path::PathBuf;
use std::time::Duration;

use crate::exclude::ExcludeSet;
use crate::resolvers::DigestAlgorithm;

/// Configuration for a single recording run (spec §4.5).
pub struct RecordingContext {
    pub base_path: Option<PathBuf>,
    pub excludes: ExcludeSet,
    pub algorithms: Vec<DigestAlgorithm>,
    pub normalize_line_endings: bool,
    pub command_timeout: Option<Duration>,
}

impl RecordingContext {
    pub fn new() -> Self {
        Self {
            base_path: None,
            excludes: ExcludeSet::empty(),
            algorithms: vec![DigestAlgorithm::Sha256],
            normalize_line_endings: false,
            command_timeout: None,
        }
    }

    pub fn with_base_path(mut self, path: PathBuf) -> Self {
        self.base_path = Some(path);
        self
    }

    pub fn with_excludes(mut self, excludes: ExcludeSet) -> Self {
        self.excludes = excludes;
        self
    }

    pub fn with_algorithms(mut self, algorithms: Vec<DigestAlgorithm>) -> Self {
        self.algorithms = algorithms;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = Some(timeout);
        self
    }
}

impl Default for RecordingContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for a single verification run (spec §4.7).
pub struct VerificationContext {
    pub base_path: Option<PathBuf>,
    pub excludes: ExcludeSet,
    pub algorithms: Vec<DigestAlgorithm>,
    pub normalize_line_endings: bool,
    /// Parameters available for `{NAME}` substitution (spec §4.7 step 3).
    pub parameters: std::collections::BTreeMap<String, String>,
    pub link_dir: PathBuf,
}

impl VerificationContext {
    pub fn new(link_dir: PathBuf) -> Self {
        Self {
            base_path: None,
            excludes: ExcludeSet::empty(),
            algorithms: vec![DigestAlgorithm::Sha256],
            normalize_line_endings: false,
            parameters: std::collections::BTreeMap::new(),
            link_dir,
        }
    }

    pub fn with_parameters(mut self, parameters: std::collections::BTreeMap<String, String>) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_base_path(mut self, path: PathBuf) -> Self {
        self.base_path = Some(path);
        self
    }
}
