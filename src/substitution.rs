//! `{NAME}` parameter substitution (spec §4.7 step 3, §9): applied to a
//! deep copy of the layout *after* its signature has been verified, so a
//! malicious parameter value can never influence what was actually
//! signed. Substitution targets are the step's expected command, its
//! artifact rule operands, and an inspection's run command.
//!
//! Spec §4.7 step 3 is explicit that an undefined `{NAME}` token fails
//! verification rather than passing the literal braces through.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::error::{Classify, Kind};
use crate::model::{ArtifactRule, Layout, SchemaError};

/// A `{NAME}` token in a template had no corresponding entry in the
/// caller-supplied substitution map.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("undefined substitution parameter {0:?}")]
pub struct UndefinedParameter(pub String);

impl Classify for UndefinedParameter {
    fn kind(&self) -> Kind {
        Kind::Schema
    }
}

/// Replace every `{NAME}` occurrence in `template` with `parameters[NAME]`,
/// failing if any referenced name is undefined (spec §4.7 step 3).
pub fn substitute(template: &str, parameters: &BTreeMap<String, String>) -> Result<String, UndefinedParameter> {
    let mut out = String::with_capacity(template.len());
    let bytes = template.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'{' {
            if let Some(end) = template[i + 1..].find('}') {
                let name = &template[i + 1..i + 1 + end];
                let value = parameters.get(name).ok_or_else(|| UndefinedParameter(name.to_string()))?;
                out.push_str(value);
                i += end + 2;
                continue;
            }
        }
        let c = template[i..].chars().next().expect("i < bytes.len() so a char starts here");
        out.push(c);
        i += c.len_utf8();
    }
    Ok(out)
}

fn substitute_rule(
    rule: &ArtifactRule,
    parameters: &BTreeMap<String, String>,
) -> Result<ArtifactRule, UndefinedParameter> {
    let tokens: Vec<String> =
        rule.to_tokens().iter().map(|t| substitute(t, parameters)).collect::<Result<_, _>>()?;
    // Substitution only rewrites literal operand text, never a rule's
    // tag/shape, so a malformed result here would mean the original rule
    // was already malformed — `Layout::validate` would have caught that
    // at load time.
    Ok(ArtifactRule::from_tokens(&tokens).unwrap_or_else(|_: SchemaError| rule.clone()))
}

/// Apply substitution to every template-bearing field of a layout,
/// returning a new layout (the original, signed copy is left untouched).
pub fn substitute_layout(layout: &Layout, parameters: &BTreeMap<String, String>) -> Result<Layout, UndefinedParameter> {
    let mut out = layout.clone();
    for step in &mut out.steps {
        step.expected_command =
            step.expected_command.iter().map(|t| substitute(t, parameters)).collect::<Result<_, _>>()?;
        step.expected_materials =
            step.expected_materials.iter().map(|r| substitute_rule(r, parameters)).collect::<Result<_, _>>()?;
        step.expected_products =
            step.expected_products.iter().map(|r| substitute_rule(r, parameters)).collect::<Result<_, _>>()?;
    }
    for inspection in &mut out.inspect {
        inspection.run = inspection.run.iter().map(|t| substitute(t, parameters)).collect::<Result<_, _>>()?;
        inspection.expected_materials =
            inspection.expected_materials.iter().map(|r| substitute_rule(r, parameters)).collect::<Result<_, _>>()?;
        inspection.expected_products =
            inspection.expected_products.iter().map(|r| substitute_rule(r, parameters)).collect::<Result<_, _>>()?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_known_parameter() {
        let mut params = BTreeMap::new();
        params.insert("VERSION".to_string(), "1.2.3".to_string());
        assert_eq!(substitute("release-{VERSION}.tar.gz", &params).unwrap(), "release-1.2.3.tar.gz");
    }

    #[test]
    fn fails_on_undefined_parameter() {
        let params = BTreeMap::new();
        let err = substitute("release-{VERSION}.tar.gz", &params).unwrap_err();
        assert_eq!(err, UndefinedParameter("VERSION".to_string()));
    }

    #[test]
    fn leaves_unterminated_brace_untouched() {
        let params = BTreeMap::new();
        assert_eq!(substitute("a{b", &params).unwrap(), "a{b");
    }

    #[test]
    fn substitutes_multiple_occurrences() {
        let mut params = BTreeMap::new();
        params.insert("X".to_string(), "9".to_string());
        assert_eq!(substitute("{X}-{X}", &params).unwrap(), "9-9");
    }

    #[test]
    fn preserves_multibyte_literal_text() {
        let mut params = BTreeMap::new();
        params.insert("X".to_string(), "9".to_string());
        assert_eq!(substitute("café-{X}-日本語", &params).unwrap(), "café-9-日本語");
    }
}
