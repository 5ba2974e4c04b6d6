//! Identifiers and the id/clock source
//!
//! ID Format (locally minted):
//! - Column IDs: `c-{12-char-hash}` (e.g., `c-7f2b4c19a0de`)
//! - Task IDs: `t-{12-char-hash}`
//! - Patch IDs: `p-{12-char-hash}`
//!
//! Hash is derived from a per-process salt, a sequence counter and the
//! creation time, so two processes minting at the same instant still differ.
//! IDs received from peers are opaque strings and are never parsed.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Milliseconds since the Unix epoch
pub type Timestamp = i64;

/// Returns current timestamp in milliseconds since epoch
pub fn current_timestamp() -> Timestamp {
    Utc::now().timestamp_millis()
}

#[derive(Debug, Error, PartialEq)]
pub enum IdError {
    #[error("{0} ID must not be empty")]
    Empty(&'static str),
}

macro_rules! string_id {
    ($(#[$doc:meta])* $name:ident, $label:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wraps a raw id string without validation
            pub fn new(raw: impl Into<String>) -> Self {
                Self(raw.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let s = s.trim();
                if s.is_empty() {
                    return Err(IdError::Empty($label));
                }
                Ok(Self(s.to_string()))
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }
    };
}

string_id!(
    /// Column identifier
    ColumnId,
    "Column"
);

string_id!(
    /// Task identifier
    TaskId,
    "Task"
);

/// Kind of entity an id is minted for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdKind {
    Column,
    Task,
    Patch,
}

impl IdKind {
    /// Returns the id prefix for this kind
    pub fn prefix(&self) -> &'static str {
        match self {
            IdKind::Column => "c",
            IdKind::Task => "t",
            IdKind::Patch => "p",
        }
    }
}

/// Source of fresh identifiers and timestamps
pub trait IdSource {
    /// Mints an id that is never handed out again
    fn next_id(&self, kind: IdKind) -> String;

    /// Current time; successive calls never go backwards
    fn now(&self) -> Timestamp;
}

/// Generates a 12-character hash from salt, sequence and time
fn generate_hash(salt: &str, sequence: u64, nanos: i64) -> String {
    let input = format!("{}:{}:{}", salt, sequence, nanos);
    let hash = blake3::hash(input.as_bytes());
    let hex = hash.to_hex();
    hex[..12].to_string()
}

/// Wall-clock id source used by the CLI
pub struct SystemIds {
    salt: String,
    counter: AtomicU64,
    last_ts: AtomicI64,
}

impl SystemIds {
    pub fn new() -> Self {
        let started = Utc::now().timestamp_nanos_opt().unwrap_or(0);
        Self {
            salt: format!("{}-{}", std::process::id(), started),
            counter: AtomicU64::new(0),
            last_ts: AtomicI64::new(0),
        }
    }
}

impl Default for SystemIds {
    fn default() -> Self {
        Self::new()
    }
}

impl IdSource for SystemIds {
    fn next_id(&self, kind: IdKind) -> String {
        let sequence = self.counter.fetch_add(1, Ordering::Relaxed);
        let nanos = Utc::now().timestamp_nanos_opt().unwrap_or(0);
        format!("{}-{}", kind.prefix(), generate_hash(&self.salt, sequence, nanos))
    }

    fn now(&self) -> Timestamp {
        let wall = current_timestamp();
        let mut prev = self.last_ts.load(Ordering::Relaxed);
        loop {
            // Strictly increasing even when the wall clock stalls or steps back
            let next = wall.max(prev + 1);
            match self
                .last_ts
                .compare_exchange_weak(prev, next, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return next,
                Err(actual) => prev = actual,
            }
        }
    }
}

/// Deterministic id source: `c-1`, `t-1`, `p-1`, ... and a clock that
/// advances by one on every read
pub struct SequentialIds {
    columns: AtomicU64,
    tasks: AtomicU64,
    patches: AtomicU64,
    clock: AtomicI64,
}

impl SequentialIds {
    /// Creates a source whose first `now()` returns `start + 1`
    pub fn starting_at(start: Timestamp) -> Self {
        Self {
            columns: AtomicU64::new(0),
            tasks: AtomicU64::new(0),
            patches: AtomicU64::new(0),
            clock: AtomicI64::new(start),
        }
    }
}

impl Default for SequentialIds {
    fn default() -> Self {
        Self::starting_at(0)
    }
}

impl IdSource for SequentialIds {
    fn next_id(&self, kind: IdKind) -> String {
        let counter = match kind {
            IdKind::Column => &self.columns,
            IdKind::Task => &self.tasks,
            IdKind::Patch => &self.patches,
        };
        let n = counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}-{}", kind.prefix(), n)
    }

    fn now(&self) -> Timestamp {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }
}
