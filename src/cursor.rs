//! Poller cursor and event-id idempotency tracking.
//!
//! The cursor is persisted to disk so a restart resumes roughly where it left
//! off; idempotency is a purely in-memory, bounded recency set, so a restart
//! may briefly re-learn from events it already scored once.

use std::collections::{HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CursorError {
    #[error("failed to read cursor file {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("failed to parse cursor file {path}: {source}")]
    Parse { path: PathBuf, source: serde_json::Error },
    #[error("failed to write cursor file {path}: {source}")]
    Write { path: PathBuf, source: std::io::Error },
}

/// On-disk cursor shape: `{cursor: string, updated_at: number}`, matching
/// the upstream ingestion worker's persisted format.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct CursorState {
    cursor: Option<String>,
    updated_at: f64,
}

fn now_unix_seconds() -> f64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs_f64()).unwrap_or(0.0)
}

/// Tracks the poller's resume position on disk.
///
/// Writes are atomic: the new state is written to a sibling `.tmp` file and
/// renamed over the target, so a crash mid-write never leaves a truncated
/// cursor file behind.
pub struct Cursor {
    path: PathBuf,
    state: CursorState,
}

impl Cursor {
    /// Load the cursor from `path`, starting fresh if the file doesn't exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CursorError> {
        let path = path.as_ref().to_path_buf();

        let state = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|source| CursorError::Parse { path: path.clone(), source })?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => CursorState::default(),
            Err(source) => return Err(CursorError::Read { path, source }),
        };

        Ok(Self { path, state })
    }

    pub fn last_event_id(&self) -> Option<&str> {
        self.state.cursor.as_deref()
    }

    /// Advance the cursor and persist it, only if the id actually changed.
    pub fn advance(&mut self, event_id: &str) -> Result<(), CursorError> {
        if self.state.cursor.as_deref() == Some(event_id) {
            return Ok(());
        }
        self.state.cursor = Some(event_id.to_owned());
        self.state.updated_at = now_unix_seconds();
        self.persist()
    }

    fn persist(&self) -> Result<(), CursorError> {
        let bytes = serde_json::to_vec(&self.state)
            .map_err(|source| CursorError::Parse { path: self.path.clone(), source })?;

        let tmp_path = self.path.with_extension("tmp");
        fs::write(&tmp_path, &bytes)
            .map_err(|source| CursorError::Write { path: tmp_path.clone(), source })?;
        fs::rename(&tmp_path, &self.path)
            .map_err(|source| CursorError::Write { path: self.path.clone(), source })?;

        Ok(())
    }
}

/// Bounded FIFO set of recently seen event ids, used to drop duplicates
/// delivered by an at-least-once upstream feed.
pub struct SeenEvents {
    capacity: usize,
    order: VecDeque<String>,
    members: HashSet<String>,
}

impl SeenEvents {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, order: VecDeque::with_capacity(capacity), members: HashSet::new() }
    }

    /// Record `event_id`, evicting the oldest entry if at capacity.
    ///
    /// Returns `true` if this id was already known (a duplicate).
    pub fn check_and_record(&mut self, event_id: &str) -> bool {
        if self.members.contains(event_id) {
            return true;
        }

        if self.order.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.members.remove(&oldest);
            }
        }

        self.order.push_back(event_id.to_owned());
        self.members.insert(event_id.to_owned());
        false
    }
}
