//! Patch envelope
//!
//! A patch is the unit of replication: `{"id", "ts", "ops", "author"?}`.
//! Each op is kept as the raw JSON object it arrived as, next to its typed
//! [`Operation`] when the discriminator is one this build understands, so
//! fields added by newer peers survive re-broadcast.

use serde::de::Deserializer;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use super::validate::{validate, Payload};
use crate::domain::{Operation, Timestamp};

/// One operation as carried on the wire
#[derive(Debug, Clone, PartialEq)]
pub struct PatchOp {
    raw: Map<String, Value>,
    op: Option<Operation>,
}

impl PatchOp {
    /// Wraps a raw op object; the typed operation is recovered when possible
    pub fn from_raw(raw: Map<String, Value>) -> Self {
        let op = serde_json::from_value(Value::Object(raw.clone())).ok();
        Self { raw, op }
    }

    /// Returns the `t` discriminator
    pub fn kind(&self) -> &str {
        self.raw.get("t").and_then(Value::as_str).unwrap_or_default()
    }

    /// The typed operation, or `None` for unknown or malformed ops
    pub fn operation(&self) -> Option<&Operation> {
        self.op.as_ref()
    }

    /// The op exactly as received, including unrecognized fields
    pub fn raw(&self) -> &Map<String, Value> {
        &self.raw
    }

    /// Fields the typed operation does not account for
    pub fn extra(&self) -> Map<String, Value> {
        let known = self
            .op
            .as_ref()
            .and_then(|op| serde_json::to_value(op).ok())
            .and_then(|v| match v {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .unwrap_or_default();

        self.raw
            .iter()
            .filter(|(key, _)| key.as_str() != "t" && !known.contains_key(key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }
}

impl From<Operation> for PatchOp {
    fn from(op: Operation) -> Self {
        let raw = match serde_json::to_value(&op) {
            Ok(Value::Object(map)) => map,
            _ => {
                let mut map = Map::new();
                map.insert("t".to_string(), Value::from(op.kind()));
                map
            }
        };
        Self { raw, op: Some(op) }
    }
}

impl Serialize for PatchOp {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.raw.serialize(serializer)
    }
}

/// An ordered batch of operations applied as one unit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Patch {
    /// Identifies this patch occurrence
    pub id: String,

    /// Creation time in milliseconds
    pub ts: Timestamp,

    pub ops: Vec<PatchOp>,

    /// Free-form author label; never authenticated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
}

impl Patch {
    /// Creates a patch from typed operations
    pub fn new(id: impl Into<String>, ts: Timestamp, ops: impl IntoIterator<Item = Operation>) -> Self {
        Self {
            id: id.into(),
            ts,
            ops: ops.into_iter().map(PatchOp::from).collect(),
            author: None,
        }
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    /// Typed operations in order, skipping unknown ones
    pub fn operations(&self) -> impl Iterator<Item = &Operation> {
        self.ops.iter().filter_map(PatchOp::operation)
    }

    /// Serializes to the JSON wire format
    pub fn to_json(&self) -> String {
        // Maps with string keys and plain values cannot fail to serialize
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Serializes to a structured JSON value
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Short human summary, e.g. `addTask, moveTask`
    pub fn summary(&self) -> String {
        self.ops
            .iter()
            .map(PatchOp::kind)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl<'de> Deserialize<'de> for Patch {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        validate(Payload::Value(value)).map_err(serde::de::Error::custom)
    }
}
