//! Canonical encoder — deterministic byte representation of a payload for
//! signing (spec §4.1).
//!
//! # Design
//! - Object keys are emitted in lexicographic order of their UTF-8 bytes.
//! - Strings use minimal JSON escaping: only `"` and `\` escaped; control
//!   characters (U+0000–U+001F) escaped as `\u00xx`; no non-ASCII escaping.
//! - Integers have no leading zeros and no decimal point; floats are
//!   rejected outright — a payload that round-trips through `serde_json`
//!   and happens to contain a float is a schema bug, not a value to coerce.
//! - Arrays preserve declared order.
//! - No whitespace between tokens.
//!
//! The encoder operates on [`serde_json::Value`] rather than directly on
//! `serde::Serialize` impls so that model types can derive `Serialize` the
//! ordinary way and funnel through one canonicalization pass before
//! signing, mirroring how the teacher crate keeps wire (de)serialization
//! (`ark-serialize`) and domain logic (`domain`, `pcs`) as separate
//! concerns rather than entangling them.

use std::fmt::Write as _;

use serde::Serialize;
use thiserror::Error;

/// Failure to render a value into the canonical byte form.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodeError {
    #[error("floating point numbers are not permitted in canonical payloads")]
    FloatNotAllowed,
    #[error("non-finite or unrepresentable number in canonical payload")]
    BadNumber,
    #[error("serde serialization failed: {0}")]
    Serde(String),
}

impl crate::error::Classify for EncodeError {
    fn kind(&self) -> crate::error::Kind {
        crate::error::Kind::Schema
    }
}

/// Encode any `Serialize` payload to its canonical byte string.
///
/// This is the only function model types should call before handing bytes
/// to a [`crate::crypto::Signer`]; verifying a signature must re-derive the
/// same bytes the same way (spec §8, "signature stability").
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, EncodeError> {
    let v = serde_json::to_value(value).map_err(|e| EncodeError::Serde(e.to_string()))?;
    let mut out = String::new();
    encode_value(&v, &mut out)?;
    Ok(out.into_bytes())
}

/// Encode an already-parsed [`serde_json::Value`] to its canonical bytes.
pub fn encode_value_bytes(value: &serde_json::Value) -> Result<Vec<u8>, EncodeError> {
    let mut out = String::new();
    encode_value(value, &mut out)?;
    Ok(out.into_bytes())
}

fn encode_value(v: &serde_json::Value, out: &mut String) -> Result<(), EncodeError> {
    match v {
        serde_json::Value::Null => out.push_str("null"),
        serde_json::Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        serde_json::Value::Number(n) => encode_number(n, out)?,
        serde_json::Value::String(s) => encode_string(s, out),
        serde_json::Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                encode_value(item, out)?;
            }
            out.push(']');
        }
        serde_json::Value::Object(map) => {
            out.push('{');
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_by(|a, b| a.as_bytes().cmp(b.as_bytes()));
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                encode_string(key, out);
                out.push(':');
                encode_value(&map[*key], out)?;
            }
            out.push('}');
        }
    }
    Ok(())
}

fn encode_number(n: &serde_json::Number, out: &mut String) -> Result<(), EncodeError> {
    if n.is_f64() && !n.is_i64() && !n.is_u64() {
        return Err(EncodeError::FloatNotAllowed);
    }
    if let Some(i) = n.as_i64() {
        write!(out, "{i}").expect("writing to String cannot fail");
        return Ok(());
    }
    if let Some(u) = n.as_u64() {
        write!(out, "{u}").expect("writing to String cannot fail");
        return Ok(());
    }
    Err(EncodeError::BadNumber)
}

fn encode_string(s: &str, out: &mut String) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            c if (c as u32) <= 0x1F => {
                write!(out, "\\u{:04x}", c as u32).expect("writing to String cannot fail");
            }
            c => out.push(c),
        }
    }
    out.push('"');
}
