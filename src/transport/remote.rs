//! WebSocket link to a remote peer
//!
//! Patches travel as text frames carrying the JSON envelope. The socket is
//! owned by a worker thread; sends are queued and return immediately, and
//! received text frames are pushed to the transport inbox.

use std::net::TcpStream;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};

use super::{Channel, Inbox, TransportError};
use crate::protocol::Patch;

/// How long a read blocks before the worker checks its outbound queue
const POLL_INTERVAL: Duration = Duration::from_millis(50);

type Socket = WebSocket<MaybeTlsStream<TcpStream>>;

/// Client side of a WebSocket connection
pub struct RemoteLink {
    url: String,
    outbound: Option<Sender<String>>,
    worker: Option<JoinHandle<()>>,
}

impl RemoteLink {
    /// Connects to `url` (`ws://` only) and starts the worker
    pub fn connect(url: &str, inbox: Inbox) -> Result<Self, TransportError> {
        if !url.starts_with("ws://") {
            return Err(TransportError::UnsupportedUrl(url.to_string()));
        }

        let (socket, _response) = tungstenite::connect(url)?;
        if let MaybeTlsStream::Plain(stream) = socket.get_ref() {
            stream.set_read_timeout(Some(POLL_INTERVAL))?;
        }

        let (tx, rx) = mpsc::channel();
        let worker_url = url.to_string();
        let worker = thread::Builder::new()
            .name("board-remote".to_string())
            .spawn(move || run(socket, rx, inbox, &worker_url))?;

        Ok(Self {
            url: url.to_string(),
            outbound: Some(tx),
            worker: Some(worker),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns true while the worker still owns an open socket
    pub fn is_connected(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }
}

impl Channel for RemoteLink {
    fn kind(&self) -> &'static str {
        "remote"
    }

    fn send(&self, patch: &Patch) -> Result<(), TransportError> {
        let outbound = self.outbound.as_ref().ok_or(TransportError::Closed("remote"))?;
        outbound
            .send(patch.to_json())
            .map_err(|_| TransportError::Closed("remote"))
    }
}

impl Drop for RemoteLink {
    fn drop(&mut self) {
        // The worker notices the closed queue on its next poll and says goodbye
        self.outbound.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!(url = %self.url, "remote worker panicked");
            }
        }
    }
}

fn is_timeout(err: &tungstenite::Error) -> bool {
    matches!(
        err,
        tungstenite::Error::Io(e)
            if matches!(e.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut)
    )
}

fn run(mut socket: Socket, outbound: Receiver<String>, inbox: Inbox, url: &str) {
    loop {
        loop {
            match outbound.try_recv() {
                Ok(text) => {
                    if let Err(e) = socket.send(Message::text(text)) {
                        warn!(url, error = %e, "remote send failed; link closed");
                        return;
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    let _ = socket.close(None);
                    let _ = socket.flush();
                    debug!(url, "remote link closed");
                    return;
                }
            }
        }

        match socket.read() {
            Ok(Message::Text(text)) => {
                if !inbox.push(text.as_str().to_owned()) {
                    return;
                }
            }
            Ok(Message::Close(_)) => {
                info!(url, "remote peer closed the link");
                return;
            }
            Ok(_) => {}
            Err(e) if is_timeout(&e) => {}
            Err(e) => {
                warn!(url, error = %e, "remote link failed");
                return;
            }
        }
    }
}
