//! Cursor store backends.
//!
//! A store holds the whole stream → cursor map. It is read once at startup
//! and replaced as a unit on every commit, so a reader never observes a
//! half-written map.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use etl_types::Cursor;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::error::StateError;

/// Stream name → cursor. `None` marks a stream that has never committed a row.
pub type CursorMap = BTreeMap<String, Option<Cursor>>;

/// Durable home of the cursor map.
pub trait CursorStore: Send + Sync {
    /// Read the persisted map. Missing or unreadable state yields an empty map.
    fn load(&self) -> Result<CursorMap, StateError>;

    /// Replace the persisted map with `cursors`.
    fn commit(&self, cursors: &CursorMap) -> Result<(), StateError>;
}

/// Cursor map stored as a JSON object in a single file.
///
/// File shape:
/// ```json
/// { "film_work": ["2021-06-16T20:14:09.221Z", "3d825f60-..."], "genre": null }
/// ```
#[derive(Debug, Clone)]
pub struct JsonFileCursorStore {
    path: PathBuf,
}

impl JsonFileCursorStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CursorStore for JsonFileCursorStore {
    fn load(&self) -> Result<CursorMap, StateError> {
        let raw = match std::fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "No cursor file, starting from scratch");
                return Ok(CursorMap::new());
            }
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice::<CursorMap>(&raw) {
            Ok(cursors) => {
                debug!(path = %self.path.display(), streams = cursors.len(), "Loaded cursors");
                Ok(cursors)
            }
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Cursor file is unreadable, starting from scratch"
                );
                Ok(CursorMap::new())
            }
        }
    }

    fn commit(&self, cursors: &CursorMap) -> Result<(), StateError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        // Temp file in the same directory so the rename stays on one filesystem
        let mut tmp = NamedTempFile::new_in(&dir)?;
        serde_json::to_writer_pretty(&mut tmp, cursors)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)?;

        debug!(path = %self.path.display(), streams = cursors.len(), "Committed cursors");
        Ok(())
    }
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct MemoryCursorStore {
    cursors: Mutex<CursorMap>,
    commits: AtomicUsize,
}

impl MemoryCursorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing map, as if it had been persisted earlier.
    pub fn with_cursors(cursors: CursorMap) -> Self {
        Self {
            cursors: Mutex::new(cursors),
            commits: AtomicUsize::new(0),
        }
    }

    /// Copy of the last committed map.
    pub fn snapshot(&self) -> Result<CursorMap, StateError> {
        self.cursors
            .lock()
            .map(|c| c.clone())
            .map_err(|_| StateError::Poisoned)
    }

    /// Number of commits accepted so far.
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }
}

impl CursorStore for MemoryCursorStore {
    fn load(&self) -> Result<CursorMap, StateError> {
        self.snapshot()
    }

    fn commit(&self, cursors: &CursorMap) -> Result<(), StateError> {
        let mut guard = self.cursors.lock().map_err(|_| StateError::Poisoned)?;
        *guard = cursors.clone();
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono::Utc;
    use tempfile::TempDir;

    fn cursor(secs: i64, id: &str) -> Cursor {
        Cursor::new(Utc.timestamp_opt(secs, 0).unwrap(), id)
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileCursorStore::new(dir.path().join("cursors.json"));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_commit_then_load() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileCursorStore::new(dir.path().join("cursors.json"));

        let mut map = CursorMap::new();
        map.insert("film_work".to_string(), Some(cursor(100, "fw-1")));
        map.insert("genre".to_string(), None);
        store.commit(&map).unwrap();

        assert_eq!(store.load().unwrap(), map);
    }

    #[test]
    fn test_commit_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("state").join("cursors.json");
        let store = JsonFileCursorStore::new(&path);

        store.commit(&CursorMap::new()).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_file_shape() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileCursorStore::new(dir.path().join("cursors.json"));

        let mut map = CursorMap::new();
        map.insert("person".to_string(), Some(cursor(0, "p1")));
        map.insert("genre".to_string(), None);
        store.commit(&map).unwrap();

        let raw = std::fs::read_to_string(store.path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"person": ["1970-01-01T00:00:00Z", "p1"], "genre": null})
        );
    }

    #[test]
    fn test_memory_store_counts_commits() {
        let store = MemoryCursorStore::new();
        assert_eq!(store.commit_count(), 0);

        let mut map = CursorMap::new();
        map.insert("genre".to_string(), Some(cursor(5, "g")));
        store.commit(&map).unwrap();

        assert_eq!(store.commit_count(), 1);
        assert_eq!(store.load().unwrap(), map);
    }
}
