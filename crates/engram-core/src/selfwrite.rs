//! Suppression ring for the process's own file writes.
//!
//! Any watcher implementation observes the writes its own process makes.
//! Stores record every write (and deletion) here; the watcher consults the
//! ring on each event and drops matches inside the suppression window. This
//! is a correctness requirement: without it every tool call would echo a
//! spurious external-change event back through the bus.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Default suppression window.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(2);

/// Bounded so a burst of writes cannot grow the ring without limit.
const MAX_ENTRIES: usize = 256;

#[derive(Debug)]
struct Entry {
    path: PathBuf,
    /// Content hash for writes; `None` marks a deletion.
    hash: Option<String>,
    recorded_at: Instant,
}

#[derive(Debug)]
pub struct SelfWriteRing {
    window: Duration,
    entries: Mutex<VecDeque<Entry>>,
}

impl Default for SelfWriteRing {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

impl SelfWriteRing {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            entries: Mutex::new(VecDeque::new()),
        }
    }

    pub fn record_write(&self, path: &Path, content_hash: &str) {
        self.push(Entry {
            path: path.to_path_buf(),
            hash: Some(content_hash.to_string()),
            recorded_at: Instant::now(),
        });
    }

    pub fn record_delete(&self, path: &Path) {
        self.push(Entry {
            path: path.to_path_buf(),
            hash: None,
            recorded_at: Instant::now(),
        });
    }

    /// Does a watch event for `path` with this on-disk content match one of
    /// our own recent writes?
    pub fn matches_write(&self, path: &Path, content_hash: &str) -> bool {
        self.matches(path, Some(content_hash))
    }

    /// Does a deletion event for `path` match one of our own removals?
    pub fn matches_delete(&self, path: &Path) -> bool {
        self.matches(path, None)
    }

    fn matches(&self, path: &Path, hash: Option<&str>) -> bool {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        entries.retain(|e| now.duration_since(e.recorded_at) < self.window);
        entries
            .iter()
            .any(|e| e.path == path && e.hash.as_deref() == hash)
    }

    fn push(&self, entry: Entry) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        entries.retain(|e| now.duration_since(e.recorded_at) < self.window);
        if entries.len() >= MAX_ENTRIES {
            entries.pop_front();
        }
        entries.push_back(entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recorded_write_matches_within_window() {
        let ring = SelfWriteRing::default();
        let path = Path::new("/corpus/memories/p/a.md");
        ring.record_write(path, "abc");
        assert!(ring.matches_write(path, "abc"));
        assert!(!ring.matches_write(path, "other-hash"));
        assert!(!ring.matches_write(Path::new("/other.md"), "abc"));
    }

    #[test]
    fn deletions_match_separately_from_writes() {
        let ring = SelfWriteRing::default();
        let path = Path::new("/corpus/memories/p/a.md");
        ring.record_delete(path);
        assert!(ring.matches_delete(path));
        assert!(!ring.matches_write(path, "abc"));
    }

    #[test]
    fn entries_expire_after_the_window() {
        let ring = SelfWriteRing::new(Duration::from_millis(10));
        let path = Path::new("/corpus/memories/p/a.md");
        ring.record_write(path, "abc");
        std::thread::sleep(Duration::from_millis(25));
        assert!(!ring.matches_write(path, "abc"));
    }

    #[test]
    fn ring_is_bounded() {
        let ring = SelfWriteRing::default();
        for i in 0..(MAX_ENTRIES + 50) {
            ring.record_write(Path::new("/p"), &format!("h{i}"));
        }
        let len = ring.entries.lock().unwrap().len();
        assert!(len <= MAX_ENTRIES);
    }
}
