//! Intra-device fan-out through an append-only journal
//!
//! Every process on the device that uses the same channel name appends to
//! `.board/channels/<channel>.jsonl`, one `{"origin", "patch"}` object per
//! line. Each process tails the file from where it stood when the channel
//! opened, so history is never replayed, and skips the lines it wrote
//! itself.
//!
//! The journal is a relay, not a log. Once it reaches its size cap the next
//! writer truncates it before appending; tails notice the shorter file and
//! start over from the top.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use fs2::FileExt;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, Debouncer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::{Channel, Inbox, TransportError};
use crate::protocol::Patch;

#[derive(Debug, Serialize, Deserialize)]
struct JournalLine {
    origin: String,
    patch: Value,
}

/// Reader that returns patches appended since the last read
#[derive(Debug)]
pub struct JournalTail {
    path: PathBuf,
    origin: String,
    offset: u64,
}

impl JournalTail {
    /// Starts at the current end of the journal
    pub fn from_end(path: impl Into<PathBuf>, origin: impl Into<String>) -> Result<Self, TransportError> {
        let path = path.into();
        let offset = match fs::metadata(&path) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            origin: origin.into(),
            offset,
        })
    }

    /// Byte position of the next unread line
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Reads complete lines written by other origins since the last call
    ///
    /// A trailing line without its newline is left for the next call.
    pub fn read_new(&mut self) -> Result<Vec<Value>, TransportError> {
        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        file.lock_shared()?;

        let len = file.metadata()?.len();
        if len < self.offset {
            debug!(path = %self.path.display(), "journal truncated; rewinding");
            self.offset = 0;
        }

        file.seek(SeekFrom::Start(self.offset))?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;
        FileExt::unlock(&file)?;

        let complete = match buf.iter().rposition(|&b| b == b'\n') {
            Some(last) => last + 1,
            None => return Ok(Vec::new()),
        };
        self.offset += complete as u64;

        let mut patches = Vec::new();
        for line in buf[..complete].split(|&b| b == b'\n') {
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            match serde_json::from_slice::<JournalLine>(line) {
                Ok(entry) if entry.origin == self.origin => {}
                Ok(entry) => patches.push(entry.patch),
                Err(e) => debug!(error = %e, "skipping unreadable journal line"),
            }
        }

        Ok(patches)
    }
}

/// Journal-backed channel with a file watcher feeding the inbox
pub struct JournalChannel {
    path: PathBuf,
    origin: String,
    max_bytes: u64,
    _watcher: Debouncer<RecommendedWatcher>,
}

impl JournalChannel {
    /// Opens (creating if needed) the journal and starts tailing it
    pub fn open(
        path: &Path,
        origin: &str,
        debounce: Duration,
        inbox: Inbox,
    ) -> Result<Self, TransportError> {
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;
        OpenOptions::new().create(true).append(true).open(path)?;

        let mut tail = JournalTail::from_end(path, origin)?;
        let file_name = path.file_name().map(|n| n.to_os_string());

        let mut debouncer = new_debouncer(debounce, move |result: DebounceEventResult| {
            let events = match result {
                Ok(events) => events,
                Err(e) => {
                    warn!(error = ?e, "journal watch error");
                    return;
                }
            };

            let touched = events
                .iter()
                .any(|event| event.path.file_name().map(|n| n.to_os_string()) == file_name);
            if !touched {
                return;
            }

            match tail.read_new() {
                Ok(patches) => {
                    for patch in patches {
                        if !inbox.push(patch) {
                            return;
                        }
                    }
                }
                Err(e) => warn!(error = %e, "failed to read journal"),
            }
        })?;

        // Watching the directory also catches the file being recreated
        debouncer
            .watcher()
            .watch(&dir, RecursiveMode::NonRecursive)?;

        Ok(Self {
            path: path.to_path_buf(),
            origin: origin.to_string(),
            max_bytes: Self::DEFAULT_MAX_BYTES,
            _watcher: debouncer,
        })
    }

    /// Size past which the next append starts the file over
    pub const DEFAULT_MAX_BYTES: u64 = 1024 * 1024;

    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Appends one patch line under an exclusive lock
///
/// A journal already at `max_bytes` is emptied first.
fn append(path: &Path, origin: &str, patch: &Patch, max_bytes: u64) -> Result<(), TransportError> {
    let line = serde_json::to_string(&JournalLine {
        origin: origin.to_string(),
        patch: patch.to_value(),
    })?;

    let file = OpenOptions::new().create(true).append(true).open(path)?;
    file.lock_exclusive()?;

    let len = file.metadata()?.len();
    if len >= max_bytes {
        debug!(path = %path.display(), bytes = len, "journal at size cap; truncating");
        file.set_len(0)?;
    }

    {
        let mut writer = BufWriter::new(&file);
        writeln!(writer, "{}", line)?;
        writer.flush()?;
    }

    // Lock is released when file is dropped
    Ok(())
}

impl Channel for JournalChannel {
    fn kind(&self) -> &'static str {
        "journal"
    }

    fn send(&self, patch: &Patch) -> Result<(), TransportError> {
        append(&self.path, &self.origin, patch, self.max_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Operation, TaskId};
    use crate::transport::Transport;
    use std::time::Instant;
    use tempfile::TempDir;

    const UNCAPPED: u64 = u64::MAX;

    fn patch(id: &str) -> Patch {
        Patch::new(id, 1, [Operation::RemoveTask { id: TaskId::new("t1") }])
    }

    #[test]
    fn tail_skips_own_origin_and_history() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("board.jsonl");

        append(&path, "a", &patch("old"), UNCAPPED).unwrap();
        let mut tail = JournalTail::from_end(&path, "a").unwrap();

        append(&path, "a", &patch("mine"), UNCAPPED).unwrap();
        append(&path, "b", &patch("theirs"), UNCAPPED).unwrap();

        let patches = tail.read_new().unwrap();
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0]["id"], "theirs");

        assert!(tail.read_new().unwrap().is_empty());
    }

    #[test]
    fn tail_waits_for_complete_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("board.jsonl");
        let mut tail = JournalTail::from_end(&path, "a").unwrap();

        let line = serde_json::to_string(&JournalLine {
            origin: "b".into(),
            patch: patch("p1").to_value(),
        })
        .unwrap();
        let (head, rest) = line.split_at(10);

        let mut file = OpenOptions::new().create(true).append(true).open(&path).unwrap();
        write!(file, "{}", head).unwrap();
        assert!(tail.read_new().unwrap().is_empty());
        assert_eq!(tail.offset(), 0);

        writeln!(file, "{}", rest).unwrap();
        assert_eq!(tail.read_new().unwrap().len(), 1);
    }

    #[test]
    fn tail_skips_garbage_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("board.jsonl");
        let mut tail = JournalTail::from_end(&path, "a").unwrap();

        fs::write(&path, "garbage\n\n").unwrap();
        append(&path, "b", &patch("p1"), UNCAPPED).unwrap();

        assert_eq!(tail.read_new().unwrap().len(), 1);
    }

    #[test]
    fn full_journal_starts_over_and_tail_follows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("board.jsonl");

        append(&path, "b", &patch("p1"), UNCAPPED).unwrap();
        append(&path, "b", &patch("p2"), UNCAPPED).unwrap();
        let mut tail = JournalTail::from_end(&path, "a").unwrap();

        append(&path, "b", &patch("p3"), 1).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 1);

        let patches = tail.read_new().unwrap();
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0]["id"], "p3");
    }

    #[test]
    fn watcher_delivers_other_origin() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("channels").join("taskmanager.jsonl");

        let mut receiver = Transport::new();
        let _listening = JournalChannel::open(
            &path,
            "receiver",
            Duration::from_millis(20),
            receiver.inbox(),
        )
        .unwrap();

        let sender = Transport::new();
        let channel =
            JournalChannel::open(&path, "sender", Duration::from_millis(20), sender.inbox()).unwrap();
        channel.send(&patch("p1")).unwrap();

        let deadline = Instant::now() + Duration::from_secs(10);
        let mut received = Vec::new();
        while received.is_empty() && Instant::now() < deadline {
            received = receiver.wait(Duration::from_millis(100));
        }

        assert_eq!(received.len(), 1);
        assert_eq!(received[0].id, "p1");
    }
}
