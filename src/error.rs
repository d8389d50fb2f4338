//! Stable error taxonomy shared across the crate (spec §7).
//!
//! Every leaf error type in this crate (`canonical::EncodeError`,
//! `crypto::VerifyError`, `model::SchemaError`, ...) implements [`Classify`]
//! so that callers — in particular the verification pipeline, which must
//! surface "only the first fatal error per step" — can always recover the
//! machine-readable [`Kind`] regardless of which module raised the error.

use std::fmt;

/// Machine-readable error category, stable across implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    /// Signature invalid, key unknown, or key malformed.
    Crypto,
    /// Step has fewer than `threshold` agreeing valid links.
    Threshold,
    /// A rule directed failure (DISALLOW match, MATCH miss, REQUIRE missing, ...).
    Rule,
    /// Layout is past its `expires` timestamp.
    Expired,
    /// Payload fails model validation.
    Schema,
    /// Evidence file missing or unreadable.
    Io,
    /// Child process failed to start, or an inspection command failed.
    Runtime,
    /// Recording or inspection command exceeded its timeout.
    Timeout,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Kind::Crypto => "crypto",
            Kind::Threshold => "threshold",
            Kind::Rule => "rule",
            Kind::Expired => "expired",
            Kind::Schema => "schema",
            Kind::Io => "io",
            Kind::Runtime => "runtime",
            Kind::Timeout => "timeout",
        };
        f.write_str(s)
    }
}

/// Implemented by every error type in this crate so a caller can classify
/// a failure without matching on its concrete variant set.
pub trait Classify {
    /// The stable machine tag for this error.
    fn kind(&self) -> Kind;
}

/// Structural context attached to a fatal error: which step, which rule,
/// which path triggered it. Carried alongside the typed error rather than
/// folded into the error message so callers can render diagnostics without
/// string-parsing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Context {
    pub step: Option<String>,
    pub rule_index: Option<usize>,
    pub path: Option<String>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_step(mut self, step: impl Into<String>) -> Self {
        self.step = Some(step.into());
        self
    }

    pub fn with_rule_index(mut self, idx: usize) -> Self {
        self.rule_index = Some(idx);
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(step) = &self.step {
            parts.push(format!("step={step}"));
        }
        if let Some(idx) = self.rule_index {
            parts.push(format!("rule={idx}"));
        }
        if let Some(path) = &self.path {
            parts.push(format!("path={path}"));
        }
        write!(f, "{}", parts.join(", "))
    }
}
