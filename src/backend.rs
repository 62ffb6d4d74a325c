//! Persistence seam towards the external record store.
//!
//! Writes are conditional on the row's `version`: an update carries the
//! version it was computed against and the store rejects it if another
//! session has written in between. [`MemoryBackend`] implements the same
//! contract in-process for tests and the bench runner.

use parking_lot::Mutex;
use std::collections::HashMap;

use crate::core_types::UserId;
use crate::record::{UserPatch, UserRecordDto};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("user {0} not found")]
    NotFound(UserId),

    #[error("version conflict: expected {expected}, store has {actual}")]
    VersionConflict { expected: u64, actual: u64 },

    #[error("persistence failure: {0}")]
    PersistenceFailure(String),
}

pub trait Backend {
    fn fetch_user(&self, id: &UserId) -> Result<UserRecordDto, BackendError>;

    /// Apply `patch` if the stored version equals `expected_version`.
    /// Returns the new version.
    fn update_user(
        &self,
        id: &UserId,
        expected_version: u64,
        patch: &UserPatch,
    ) -> Result<u64, BackendError>;
}

// ---------------------------------------------------------------------------
// MemoryBackend
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct MemoryState {
    rows: HashMap<UserId, UserRecordDto>,
    /// Number of upcoming writes to fail with `PersistenceFailure`.
    failures_pending: u32,
    writes: u64,
    conflicts: u64,
}

/// In-process store with compare-and-swap writes and failure injection.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, row: UserRecordDto) {
        let id = UserId(row.id.clone());
        self.state.lock().rows.insert(id, row);
    }

    /// Make the next `count` writes fail.
    pub fn fail_next_writes(&self, count: u32) {
        self.state.lock().failures_pending = count;
    }

    pub fn write_count(&self) -> u64 {
        self.state.lock().writes
    }

    pub fn conflict_count(&self) -> u64 {
        self.state.lock().conflicts
    }
}

impl Backend for MemoryBackend {
    fn fetch_user(&self, id: &UserId) -> Result<UserRecordDto, BackendError> {
        self.state
            .lock()
            .rows
            .get(id)
            .cloned()
            .ok_or_else(|| BackendError::NotFound(id.clone()))
    }

    fn update_user(
        &self,
        id: &UserId,
        expected_version: u64,
        patch: &UserPatch,
    ) -> Result<u64, BackendError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if state.failures_pending > 0 {
            state.failures_pending -= 1;
            return Err(BackendError::PersistenceFailure("injected write failure".to_string()));
        }

        let row = match state.rows.get_mut(id) {
            Some(row) => row,
            None => return Err(BackendError::NotFound(id.clone())),
        };
        let actual = row.version.max(0) as u64;
        if actual != expected_version {
            state.conflicts += 1;
            return Err(BackendError::VersionConflict { expected: expected_version, actual });
        }

        row.apply(patch);
        row.version += 1;
        let new_version = row.version as u64;
        state.writes += 1;
        Ok(new_version)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
