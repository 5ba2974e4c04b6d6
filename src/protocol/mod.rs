//! # Patch Protocol
//!
//! Wire shape of patches and the validation gate for inbound payloads.
//!
//! ## Wire Format
//!
//! ```text
//! {"id": "p-…", "ts": 1700000000000, "author": "ana",
//!  "ops": [{"t": "addTask", "task": {…}}, {"t": "moveTask", …}]}
//! ```
//!
//! - `author` is optional and never authenticated
//! - every op carries a string discriminator `t`
//! - extra fields on ops are kept and re-sent unchanged
//!
//! ## Key Types
//!
//! - [`Patch`] - The unit of replication
//! - [`PatchOp`] - One op, raw and typed
//! - [`validate`] - Envelope check for anything arriving from a transport

mod patch;
mod validate;

pub use patch::{Patch, PatchOp};
pub use validate::{validate, Payload, ValidationError};
pub use crate::domain::Operation;
