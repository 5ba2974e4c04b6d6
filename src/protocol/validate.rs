//! Inbound patch validation
//!
//! The gate between a transport and the board. The schema is permissive:
//! only the envelope and each op's `t` discriminator are checked. Op bodies
//! are not validated here, and unknown fields are kept.

use serde_json::{Map, Value};
use thiserror::Error;

use super::patch::{Patch, PatchOp};

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("Payload is not valid JSON: {0}")]
    Json(String),

    #[error("Patch must be a JSON object")]
    NotAnObject,

    #[error("Patch field 'id' must be a string")]
    Id,

    #[error("Patch field 'ts' must be a number")]
    Ts,

    #[error("Patch field 'author' must be a string when present")]
    Author,

    #[error("Patch field 'ops' must be an array")]
    Ops,

    #[error("Operation {0} must be an object")]
    OpNotObject(usize),

    #[error("Operation {0} is missing a string 't' discriminator")]
    OpTag(usize),
}

/// Raw inbound payload: text to be parsed, or an already-structured value
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Text(String),
    Value(Value),
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_string())
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::Value(value)
    }
}

/// Parses and checks a payload, returning the patch it carries
pub fn validate(raw: impl Into<Payload>) -> Result<Patch, ValidationError> {
    let value = match raw.into() {
        Payload::Text(text) => {
            serde_json::from_str(&text).map_err(|e| ValidationError::Json(e.to_string()))?
        }
        Payload::Value(value) => value,
    };

    let Value::Object(mut envelope) = value else {
        return Err(ValidationError::NotAnObject);
    };

    let id = match envelope.remove("id") {
        Some(Value::String(id)) => id,
        _ => return Err(ValidationError::Id),
    };

    let ts = envelope
        .get("ts")
        .and_then(number_as_timestamp)
        .ok_or(ValidationError::Ts)?;

    let author = match envelope.remove("author") {
        None => None,
        Some(Value::String(author)) => Some(author),
        Some(_) => return Err(ValidationError::Author),
    };

    let raw_ops = match envelope.remove("ops") {
        Some(Value::Array(ops)) => ops,
        _ => return Err(ValidationError::Ops),
    };

    let ops = raw_ops
        .into_iter()
        .enumerate()
        .map(|(n, op)| check_op(n, op))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Patch {
        id,
        ts,
        ops,
        author,
    })
}

fn check_op(position: usize, op: Value) -> Result<PatchOp, ValidationError> {
    let map: Map<String, Value> = match op {
        Value::Object(map) => map,
        _ => return Err(ValidationError::OpNotObject(position)),
    };

    if !map.get("t").is_some_and(Value::is_string) {
        return Err(ValidationError::OpTag(position));
    }

    Ok(PatchOp::from_raw(map))
}

/// Accepts any JSON number; fractional milliseconds are truncated
fn number_as_timestamp(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        _ => None,
    }
}
