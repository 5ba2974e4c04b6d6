//! In-process fan-out
//!
//! A [`MemoryHub`] connects transports living in the same process. Each
//! member gets a [`HubChannel`]; sending on it delivers to every other
//! member's inbox.

use std::sync::{Arc, Mutex, MutexGuard};

use super::{Channel, Inbox, TransportError};
use crate::protocol::Patch;

#[derive(Debug, Default)]
struct Members {
    next_id: u64,
    inboxes: Vec<(u64, Inbox)>,
}

/// Shared meeting point for [`HubChannel`]s
#[derive(Debug, Clone, Default)]
pub struct MemoryHub {
    members: Arc<Mutex<Members>>,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a member whose inbound patches go to `inbox`
    pub fn join(&self, inbox: Inbox) -> HubChannel {
        let mut members = self.lock();
        let id = members.next_id;
        members.next_id += 1;
        members.inboxes.push((id, inbox));

        HubChannel {
            id,
            hub: self.clone(),
        }
    }

    /// Number of current members
    pub fn len(&self) -> usize {
        self.lock().inboxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, Members> {
        self.members.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// One member's connection to a [`MemoryHub`]; leaves the hub on drop
#[derive(Debug)]
pub struct HubChannel {
    id: u64,
    hub: MemoryHub,
}

impl Channel for HubChannel {
    fn kind(&self) -> &'static str {
        "hub"
    }

    fn send(&self, patch: &Patch) -> Result<(), TransportError> {
        let value = patch.to_value();
        let mut members = self.hub.lock();

        // Members whose transport is gone are pruned as we go
        members
            .inboxes
            .retain(|(id, inbox)| *id == self.id || inbox.push(value.clone()));
        Ok(())
    }
}

impl Drop for HubChannel {
    fn drop(&mut self) {
        self.hub.lock().inboxes.retain(|(id, _)| *id != self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ColumnId, Operation};
    use crate::transport::Transport;

    fn patch() -> Patch {
        Patch::new("p1", 1, [Operation::RemoveColumn { id: ColumnId::new("c1") }])
    }

    #[test]
    fn delivers_to_everyone_but_the_sender() {
        let hub = MemoryHub::new();
        let mut a = Transport::new();
        let mut b = Transport::new();
        let mut c = Transport::new();

        let a_channel = hub.join(a.inbox());
        let _b_channel = hub.join(b.inbox());
        let _c_channel = hub.join(c.inbox());

        a_channel.send(&patch()).unwrap();

        assert!(a.poll().is_empty());
        assert_eq!(b.poll().len(), 1);
        assert_eq!(c.poll().len(), 1);
    }

    #[test]
    fn dropping_a_channel_leaves_the_hub() {
        let hub = MemoryHub::new();
        let a = Transport::new();
        let channel = hub.join(a.inbox());
        assert_eq!(hub.len(), 1);

        drop(channel);
        assert!(hub.is_empty());
    }

    #[test]
    fn dead_members_are_pruned() {
        let hub = MemoryHub::new();
        let a = Transport::new();
        let a_channel = hub.join(a.inbox());
        {
            let gone = Transport::new();
            // Keep the membership but drop the receiving transport
            std::mem::forget(hub.join(gone.inbox()));
        }
        assert_eq!(hub.len(), 2);

        a_channel.send(&patch()).unwrap();
        assert_eq!(hub.len(), 1);
    }
}
