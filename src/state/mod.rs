//! # State Container
//!
//! [`BoardStore`] is the only thing that mutates the board. Local commands
//! become patches that are applied, persisted and disseminated; inbound
//! patches from the transport are applied and persisted but never sent back
//! out.
//!
//! The store is single-owner: nothing in it is shared across threads.
//! Background threads (persistence worker, journal watcher, remote link)
//! only ever talk to it through queues, so a patch is always applied to
//! completion before anyone can read the state again.

mod store;

pub use store::{BoardStore, ObserverId, StoreError, StoreOptions};
