//! # Transport
//!
//! Disseminates locally-produced patches and collects patches produced
//! elsewhere.
//!
//! A [`Transport`] owns up to a handful of [`Channel`]s. Outbound, every
//! channel gets a copy of the patch and failures are only logged. Inbound,
//! channels push raw payloads into a shared [`Inbox`] from whatever thread
//! they run on; the owner of the transport drains it with [`Transport::poll`]
//! or [`Transport::wait`], which validate each payload, hand valid patches to
//! the registered listeners and return them. Invalid payloads are dropped
//! with a debug log and never reach a listener.
//!
//! ## Channels
//!
//! | Channel | Reach | Type |
//! |---------|-------|------|
//! | Journal | other processes on this device | [`JournalChannel`] |
//! | Hub | other transports in this process | [`HubChannel`] |
//! | Remote | a WebSocket peer | [`RemoteLink`] |
//!
//! A transport never hears its own patches back: the journal skips lines
//! with its own origin, the hub skips the sender, and the remote peer is
//! expected not to echo.

mod hub;
mod journal;
mod remote;

use std::path::Path;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::domain::current_timestamp;
use crate::protocol::{validate, Patch, Payload};
use crate::storage::SyncConfig;

pub use hub::{HubChannel, MemoryHub};
pub use journal::{JournalChannel, JournalTail};
pub use remote::RemoteLink;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("Failed to watch journal: {0}")]
    Watch(#[from] notify::Error),

    #[error("Failed to encode patch: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Unsupported remote URL '{0}' (only ws:// is supported)")]
    UnsupportedUrl(String),

    #[error("Channel '{0}' is closed")]
    Closed(&'static str),
}

/// One way of reaching other peers
pub trait Channel {
    /// Short name used in logs
    fn kind(&self) -> &'static str;

    /// Sends a patch without waiting for delivery
    fn send(&self, patch: &Patch) -> Result<(), TransportError>;
}

/// Sending half of a transport's inbound queue
///
/// Cheap to clone; channels keep one per background thread.
#[derive(Debug, Clone)]
pub struct Inbox {
    tx: Sender<Payload>,
}

impl Inbox {
    /// Queues a raw payload; returns false once the transport is gone
    pub fn push(&self, payload: impl Into<Payload>) -> bool {
        self.tx.send(payload.into()).is_ok()
    }
}

/// Handle returned by [`Transport::on_patch`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Box<dyn FnMut(&Patch)>;

/// Label identifying this process on shared channels
pub fn process_origin() -> String {
    format!("{}-{}", std::process::id(), current_timestamp())
}

/// The set of channels a board disseminates on and listens to
pub struct Transport {
    channels: Vec<Box<dyn Channel>>,
    inbox: Inbox,
    rx: Receiver<Payload>,
    listeners: Vec<(ListenerId, Listener)>,
    next_listener: u64,
}

impl Default for Transport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport {
    /// Creates a transport with no channels
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            channels: Vec::new(),
            inbox: Inbox { tx },
            rx,
            listeners: Vec::new(),
            next_listener: 0,
        }
    }

    /// Builds the channels named by `sync`, skipping any that fail to open
    pub fn from_config(sync: &SyncConfig, journal_path: &Path, origin: &str) -> Self {
        let mut transport = Self::new();

        if sync.local {
            match JournalChannel::open(
                journal_path,
                origin,
                Duration::from_millis(sync.journal_debounce_ms),
                transport.inbox(),
            ) {
                Ok(channel) => {
                    debug!(path = %journal_path.display(), "journal channel open");
                    transport.add_channel(channel.with_max_bytes(sync.journal_max_bytes));
                }
                Err(e) => warn!(error = %e, "journal channel unavailable"),
            }
        }

        match sync.effective_remote_url() {
            Some(url) => match RemoteLink::connect(&url, transport.inbox()) {
                Ok(link) => {
                    info!(url = %url, "remote link connected");
                    transport.add_channel(link);
                }
                Err(e) => info!(url = %url, error = %e, "remote link unavailable"),
            },
            None => debug!("no remote endpoint configured"),
        }

        transport
    }

    /// Returns a handle channels use to deliver inbound payloads
    pub fn inbox(&self) -> Inbox {
        self.inbox.clone()
    }

    pub fn add_channel(&mut self, channel: impl Channel + 'static) {
        self.channels.push(Box::new(channel));
    }

    /// Builder form of [`Transport::add_channel`]
    pub fn with_channel(mut self, channel: impl Channel + 'static) -> Self {
        self.add_channel(channel);
        self
    }

    /// Kinds of the channels present, in the order they were added
    pub fn channel_kinds(&self) -> Vec<&'static str> {
        self.channels.iter().map(|c| c.kind()).collect()
    }

    /// Registers a callback for every valid inbound patch
    pub fn on_patch(&mut self, listener: impl FnMut(&Patch) + 'static) -> ListenerId {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Unregisters a listener; returns false if it was not registered
    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(existing, _)| *existing != id);
        self.listeners.len() != before
    }

    /// Sends `patch` on every channel, best effort
    pub fn broadcast(&self, patch: &Patch) {
        for channel in &self.channels {
            match channel.send(patch) {
                Ok(()) => debug!(channel = channel.kind(), patch = %patch.id, "patch sent"),
                Err(e) => warn!(channel = channel.kind(), patch = %patch.id, error = %e, "send failed"),
            }
        }
    }

    /// Validates one raw payload and notifies listeners if it is a patch
    pub fn handle_incoming(&mut self, payload: impl Into<Payload>) -> Option<Patch> {
        match validate(payload) {
            Ok(patch) => {
                debug!(patch = %patch.id, ops = patch.ops.len(), "patch received");
                for (_, listener) in &mut self.listeners {
                    listener(&patch);
                }
                Some(patch)
            }
            Err(e) => {
                debug!(error = %e, "inbound payload discarded");
                None
            }
        }
    }

    /// Handles everything queued so far without blocking
    pub fn poll(&mut self) -> Vec<Patch> {
        let mut patches = Vec::new();
        while let Ok(payload) = self.rx.try_recv() {
            patches.extend(self.handle_incoming(payload));
        }
        patches
    }

    /// Waits up to `timeout` for the first payload, then drains the rest
    pub fn wait(&mut self, timeout: Duration) -> Vec<Patch> {
        let mut patches = Vec::new();
        match self.rx.recv_timeout(timeout) {
            Ok(payload) => patches.extend(self.handle_incoming(payload)),
            // The transport holds an inbox itself, so the queue never disconnects
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                return patches
            }
        }
        patches.extend(self.poll());
        patches
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Operation, TaskId};
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn remove_patch(id: &str) -> Patch {
        Patch::new(id, 1, [Operation::RemoveTask { id: TaskId::new("t1") }])
    }

    struct FailingChannel;

    impl Channel for FailingChannel {
        fn kind(&self) -> &'static str {
            "failing"
        }

        fn send(&self, _patch: &Patch) -> Result<(), TransportError> {
            Err(TransportError::Closed("failing"))
        }
    }

    #[test]
    fn valid_payload_reaches_listeners() {
        let mut transport = Transport::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        transport.on_patch(move |patch| sink.borrow_mut().push(patch.id.clone()));

        transport.inbox().push(remove_patch("p1").to_json());
        transport.inbox().push(json!({"id": "p2", "ts": 2, "ops": []}));

        let patches = transport.poll();
        assert_eq!(patches.len(), 2);
        assert_eq!(*seen.borrow(), vec!["p1", "p2"]);
    }

    #[test]
    fn invalid_payload_is_dropped_silently() {
        let mut transport = Transport::new();
        let calls = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&calls);
        transport.on_patch(move |_| *counter.borrow_mut() += 1);

        transport.inbox().push("not json");
        transport.inbox().push(json!({"id": "p1", "ts": 1}));

        assert!(transport.poll().is_empty());
        assert_eq!(*calls.borrow(), 0);
    }

    #[test]
    fn removed_listener_is_not_called() {
        let mut transport = Transport::new();
        let calls = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&calls);
        let id = transport.on_patch(move |_| *counter.borrow_mut() += 1);

        assert!(transport.remove_listener(id));
        assert!(!transport.remove_listener(id));

        transport.handle_incoming(remove_patch("p1").to_value());
        assert_eq!(*calls.borrow(), 0);
    }

    #[test]
    fn broadcast_survives_failing_channel() {
        let hub = MemoryHub::new();
        let mut peer = Transport::new();
        let _peer_channel = hub.join(peer.inbox());

        let sender = Transport::new();
        let channel = hub.join(sender.inbox());
        let sender = sender.with_channel(FailingChannel).with_channel(channel);

        sender.broadcast(&remove_patch("p1"));

        let received = peer.wait(Duration::from_secs(1));
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].id, "p1");
    }

    #[test]
    fn wait_times_out_when_idle() {
        let mut transport = Transport::new();
        assert!(transport.wait(Duration::from_millis(10)).is_empty());
    }

    #[test]
    fn from_config_skips_unreachable_remote() {
        let dir = tempfile::TempDir::new().unwrap();
        let sync = SyncConfig {
            remote_url: Some("wss://example.invalid/board".to_string()),
            ..SyncConfig::default()
        };

        let transport = Transport::from_config(
            &sync,
            &dir.path().join("channels").join("taskmanager.jsonl"),
            "origin-a",
        );

        assert_eq!(transport.channel_kinds(), vec!["journal"]);
    }

    #[test]
    fn from_config_without_local_channel() {
        let dir = tempfile::TempDir::new().unwrap();
        let sync = SyncConfig {
            local: false,
            ..SyncConfig::default()
        };

        let transport = Transport::from_config(&sync, &dir.path().join("j.jsonl"), "origin-a");
        assert!(transport.channel_kinds().is_empty());
    }
}
