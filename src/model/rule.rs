//! Artifact rule language (spec §3, table) — the value objects the rule
//! engine (`crate::ruleengine`) evaluates.
//!
//! Rules are authored two ways in the wild: as an ordered token list
//! (`["MATCH", "foo", "WITH", "PRODUCTS", "FROM", "clone"]`, in-toto's
//! traditional wire shape) or as a structured object
//! (`{"type": "MATCH", "pattern": "foo", ...}`). Both normalize to the one
//! [`ArtifactRule`] tagged enum; on the way back out, this crate always
//! emits the token form, so canonical round-trips (spec §8) are stable
//! regardless of which shape a layout author used.

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::SchemaError;

/// Which side of a step's evidence a rule targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Materials,
    Products,
}

impl Side {
    fn as_token(&self) -> &'static str {
        match self {
            Side::Materials => "MATERIALS",
            Side::Products => "PRODUCTS",
        }
    }

    fn from_token(s: &str) -> Result<Self, SchemaError> {
        match s {
            "MATERIALS" => Ok(Side::Materials),
            "PRODUCTS" => Ok(Side::Products),
            other => Err(SchemaError::BadRule(format!("expected MATERIALS or PRODUCTS, got {other:?}"))),
        }
    }
}

/// One artifact rule (spec §3 table).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactRule {
    Match {
        pattern: String,
        src_prefix: Option<String>,
        side: Side,
        dst_prefix: Option<String>,
        from_step: String,
    },
    Allow {
        pattern: String,
    },
    Disallow {
        pattern: String,
    },
    Require {
        filename: String,
    },
    Create {
        pattern: String,
    },
    Delete {
        pattern: String,
    },
    Modify {
        pattern: String,
    },
}

impl ArtifactRule {
    /// Render to the ordered-token wire form.
    pub fn to_tokens(&self) -> Vec<String> {
        match self {
            ArtifactRule::Match { pattern, src_prefix, side, dst_prefix, from_step } => {
                let mut out = vec!["MATCH".to_string(), pattern.clone()];
                if let Some(src) = src_prefix {
                    out.push("IN".to_string());
                    out.push(src.clone());
                }
                out.push("WITH".to_string());
                out.push(side.as_token().to_string());
                if let Some(dst) = dst_prefix {
                    out.push("IN".to_string());
                    out.push(dst.clone());
                }
                out.push("FROM".to_string());
                out.push(from_step.clone());
                out
            }
            ArtifactRule::Allow { pattern } => vec!["ALLOW".to_string(), pattern.clone()],
            ArtifactRule::Disallow { pattern } => vec!["DISALLOW".to_string(), pattern.clone()],
            ArtifactRule::Require { filename } => vec!["REQUIRE".to_string(), filename.clone()],
            ArtifactRule::Create { pattern } => vec!["CREATE".to_string(), pattern.clone()],
            ArtifactRule::Delete { pattern } => vec!["DELETE".to_string(), pattern.clone()],
            ArtifactRule::Modify { pattern } => vec!["MODIFY".to_string(), pattern.clone()],
        }
    }

    /// Parse the ordered-token wire form.
    pub fn from_tokens(tokens: &[String]) -> Result<Self, SchemaError> {
        let (tag, rest) = tokens.split_first().ok_or_else(|| SchemaError::BadRule("empty rule".into()))?;
        match tag.as_str() {
            "MATCH" => parse_match(rest),
            "ALLOW" => one_operand(rest, "ALLOW").map(|pattern| ArtifactRule::Allow { pattern }),
            "DISALLOW" => one_operand(rest, "DISALLOW").map(|pattern| ArtifactRule::Disallow { pattern }),
            "REQUIRE" => one_operand(rest, "REQUIRE").map(|filename| ArtifactRule::Require { filename }),
            "CREATE" => one_operand(rest, "CREATE").map(|pattern| ArtifactRule::Create { pattern }),
            "DELETE" => one_operand(rest, "DELETE").map(|pattern| ArtifactRule::Delete { pattern }),
            "MODIFY" => one_operand(rest, "MODIFY").map(|pattern| ArtifactRule::Modify { pattern }),
            other => Err(SchemaError::UnknownRuleTag(other.to_string())),
        }
    }

    /// Parse the structured object form (`{"type": "MATCH", ...}`).
    pub fn from_structured(value: &serde_json::Value) -> Result<Self, SchemaError> {
        let obj = value.as_object().ok_or_else(|| SchemaError::BadRule("rule object must be a JSON object".into()))?;
        let get_str = |k: &str| -> Result<String, SchemaError> {
            obj.get(k)
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .ok_or_else(|| SchemaError::BadRule(format!("rule missing string field {k:?}")))
        };
        let get_opt_str = |k: &str| -> Option<String> { obj.get(k).and_then(|v| v.as_str()).map(str::to_string) };
        let tag = get_str("type")?;
        match tag.as_str() {
            "MATCH" => {
                let pattern = get_str("pattern")?;
                let side = Side::from_token(&get_str("with")?)?;
                let from_step = get_str("from_step")?;
                Ok(ArtifactRule::Match {
                    pattern,
                    src_prefix: get_opt_str("src_prefix"),
                    side,
                    dst_prefix: get_opt_str("dst_prefix"),
                    from_step,
                })
            }
            "ALLOW" => Ok(ArtifactRule::Allow { pattern: get_str("pattern")? }),
            "DISALLOW" => Ok(ArtifactRule::Disallow { pattern: get_str("pattern")? }),
            "REQUIRE" => Ok(ArtifactRule::Require { filename: get_str("filename")? }),
            "CREATE" => Ok(ArtifactRule::Create { pattern: get_str("pattern")? }),
            "DELETE" => Ok(ArtifactRule::Delete { pattern: get_str("pattern")? }),
            "MODIFY" => Ok(ArtifactRule::Modify { pattern: get_str("pattern")? }),
            other => Err(SchemaError::UnknownRuleTag(other.to_string())),
        }
    }

    /// The glob pattern this rule matches against, where applicable.
    pub fn pattern(&self) -> Option<&str> {
        match self {
            ArtifactRule::Match { pattern, .. }
            | ArtifactRule::Allow { pattern }
            | ArtifactRule::Disallow { pattern }
            | ArtifactRule::Create { pattern }
            | ArtifactRule::Delete { pattern }
            | ArtifactRule::Modify { pattern } => Some(pattern),
            ArtifactRule::Require { .. } => None,
        }
    }
}

fn one_operand(rest: &[String], tag: &str) -> Result<String, SchemaError> {
    match rest {
        [operand] => Ok(operand.clone()),
        _ => Err(SchemaError::BadRule(format!("{tag} expects exactly one operand, got {}", rest.len()))),
    }
}

fn parse_match(rest: &[String]) -> Result<ArtifactRule, SchemaError> {
    let mut it = rest.iter().peekable();
    let pattern = it.next().ok_or_else(|| SchemaError::BadRule("MATCH missing pattern".into()))?.clone();

    let mut src_prefix = None;
    if it.peek().map(|s| s.as_str()) == Some("IN") {
        it.next();
        src_prefix = Some(it.next().ok_or_else(|| SchemaError::BadRule("MATCH IN missing prefix".into()))?.clone());
    }

    if it.next().map(|s| s.as_str()) != Some("WITH") {
        return Err(SchemaError::BadRule("MATCH expects WITH".into()));
    }
    let side = Side::from_token(it.next().ok_or_else(|| SchemaError::BadRule("MATCH WITH missing side".into()))?)?;

    let mut dst_prefix = None;
    if it.peek().map(|s| s.as_str()) == Some("IN") {
        it.next();
        dst_prefix = Some(it.next().ok_or_else(|| SchemaError::BadRule("MATCH IN missing prefix".into()))?.clone());
    }

    if it.next().map(|s| s.as_str()) != Some("FROM") {
        return Err(SchemaError::BadRule("MATCH expects FROM".into()));
    }
    let from_step = it.next().ok_or_else(|| SchemaError::BadRule("MATCH FROM missing step name".into()))?.clone();

    if it.next().is_some() {
        return Err(SchemaError::BadRule("MATCH has trailing tokens".into()));
    }

    Ok(ArtifactRule::Match { pattern, src_prefix, side, dst_prefix, from_step })
}

impl Serialize for ArtifactRule {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_tokens().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ArtifactRule {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        match &value {
            serde_json::Value::Array(items) => {
                let tokens: Result<Vec<String>, _> = items
                    .iter()
                    .map(|v| v.as_str().map(str::to_string).ok_or_else(|| D::Error::custom("rule tokens must be strings")))
                    .collect();
                ArtifactRule::from_tokens(&tokens?).map_err(D::Error::custom)
            }
            serde_json::Value::Object(_) => ArtifactRule::from_structured(&value).map_err(D::Error::custom),
            _ => Err(D::Error::custom("rule must be an array of tokens or a structured object")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn match_round_trips_through_tokens() {
        let rule = ArtifactRule::Match {
            pattern: "foo.py".into(),
            src_prefix: None,
            side: Side::Products,
            dst_prefix: None,
            from_step: "clone".into(),
        };
        let tokens = rule.to_tokens();
        assert_eq!(tokens, vec!["MATCH", "foo.py", "WITH", "PRODUCTS", "FROM", "clone"]);
        assert_eq!(ArtifactRule::from_tokens(&tokens).unwrap(), rule);
    }

    #[test]
    fn match_with_prefixes() {
        let tokens: Vec<String> =
            ["MATCH", "*.py", "IN", "src", "WITH", "MATERIALS", "IN", "dst", "FROM", "build"]
                .iter()
                .map(|s| s.to_string())
                .collect();
        let rule = ArtifactRule::from_tokens(&tokens).unwrap();
        assert_eq!(
            rule,
            ArtifactRule::Match {
                pattern: "*.py".into(),
                src_prefix: Some("src".into()),
                side: Side::Materials,
                dst_prefix: Some("dst".into()),
                from_step: "build".into(),
            }
        );
        assert_eq!(rule.to_tokens(), tokens);
    }

    #[test]
    fn structured_form_normalizes_to_same_rule() {
        let json = serde_json::json!({
            "type": "DISALLOW",
            "pattern": "*"
        });
        let rule = ArtifactRule::from_structured(&json).unwrap();
        assert_eq!(rule, ArtifactRule::Disallow { pattern: "*".into() });
    }

    #[test]
    fn unknown_tag_rejected() {
        let tokens = vec!["FROBNICATE".to_string(), "x".to_string()];
        assert!(matches!(ArtifactRule::from_tokens(&tokens), Err(SchemaError::UnknownRuleTag(_))));
    }

    #[test]
    fn deserialize_accepts_both_shapes() {
        let from_array: ArtifactRule = serde_json::from_value(serde_json::json!(["ALLOW", "*.txt"])).unwrap();
        let from_object: ArtifactRule =
            serde_json::from_value(serde_json::json!({"type": "ALLOW", "pattern": "*.txt"})).unwrap();
        assert_eq!(from_array, from_object);
    }
}
