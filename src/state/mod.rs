//! Checkpoint state for extraction passes
//!
//! [`ExtractionState`] is the single persisted record of pass progress: per
//! record type completion and page cursor, FIFO queues of parent identifiers
//! awaiting dependent fetches, sync timestamps and the sync scope.

use crate::record::RecordType;
use crate::scope::SyncScope;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet, VecDeque};
use tracing::{debug, info};

pub mod store;

pub use store::{CheckpointStore, FileCheckpointStore, MemoryCheckpointStore};

/// Current checkpoint schema version
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Maximum allowed checkpoint file size (10 MB) to prevent memory exhaustion
pub const MAX_STATE_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Completion flag and page cursor of one record type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeProgress {
    /// Every page was fetched and sunk in the current pass
    pub complete: bool,
    /// Page cursor
    pub page: u32,
}

impl Default for TypeProgress {
    fn default() -> Self {
        Self {
            complete: false,
            page: 1,
        }
    }
}

/// Persisted progress of one sync pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionState {
    schema_version: String,
    per_type: BTreeMap<RecordType, TypeProgress>,
    pending_child_ids: BTreeMap<RecordType, VecDeque<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_sync_started: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_successful_sync_started: Option<DateTime<Utc>>,
    #[serde(default)]
    scope: SyncScope,
}

impl Default for ExtractionState {
    fn default() -> Self {
        Self::new(SyncScope::default())
    }
}

impl ExtractionState {
    /// Initial state: every type incomplete at page 1, empty queues, no timestamps
    pub fn new(scope: SyncScope) -> Self {
        let mut state = Self {
            schema_version: SCHEMA_VERSION.to_string(),
            per_type: BTreeMap::new(),
            pending_child_ids: BTreeMap::new(),
            last_sync_started: None,
            last_successful_sync_started: None,
            scope,
        };
        state.fill_missing_types();
        state
    }

    /// Add entries for record types a loaded checkpoint does not mention
    pub(crate) fn fill_missing_types(&mut self) {
        for record_type in RecordType::ALL {
            self.per_type.entry(record_type).or_default();
            if record_type.is_dependent() {
                self.pending_child_ids.entry(record_type).or_default();
            }
        }
    }

    /// Schema version recorded in this state
    pub fn schema_version(&self) -> &str {
        &self.schema_version
    }

    /// Sync scope
    pub fn scope(&self) -> &SyncScope {
        &self.scope
    }

    /// Replace the sync scope
    pub fn set_scope(&mut self, scope: SyncScope) {
        self.scope = scope;
    }

    /// Progress of one type
    pub fn type_progress(&self, record_type: RecordType) -> TypeProgress {
        self.per_type
            .get(&record_type)
            .copied()
            .unwrap_or_default()
    }

    /// Whether a type is complete in this pass
    pub fn is_complete(&self, record_type: RecordType) -> bool {
        self.type_progress(record_type).complete
    }

    /// Page cursor of a type
    pub fn page(&self, record_type: RecordType) -> u32 {
        self.type_progress(record_type).page
    }

    /// Set the page cursor of a type
    pub fn set_page(&mut self, record_type: RecordType, page: u32) {
        self.per_type.entry(record_type).or_default().page = page;
    }

    /// Mark a type complete
    pub fn mark_complete(&mut self, record_type: RecordType) {
        self.per_type.entry(record_type).or_default().complete = true;
        debug!(record_type = %record_type, "Record type marked complete");
    }

    /// Number of complete types
    pub fn completed_type_count(&self) -> usize {
        RecordType::ALL
            .iter()
            .filter(|t| self.is_complete(**t))
            .count()
    }

    /// Queue of parent identifiers awaiting a dependent fetch
    pub fn pending(&self, record_type: RecordType) -> impl Iterator<Item = &str> {
        self.pending_child_ids
            .get(&record_type)
            .into_iter()
            .flatten()
            .map(String::as_str)
    }

    /// Length of a dependent type's queue
    pub fn pending_len(&self, record_type: RecordType) -> usize {
        self.pending_child_ids
            .get(&record_type)
            .map_or(0, VecDeque::len)
    }

    /// Total queued identifiers across dependent types
    pub fn total_pending(&self) -> usize {
        self.pending_child_ids.values().map(VecDeque::len).sum()
    }

    /// Front of a dependent type's queue, without removing it
    pub fn front_pending(&self, record_type: RecordType) -> Option<&str> {
        self.pending_child_ids
            .get(&record_type)
            .and_then(VecDeque::front)
            .map(String::as_str)
    }

    /// Remove the front identifier once its dependent fetch is done
    pub fn pop_pending(&mut self, record_type: RecordType) -> Option<String> {
        self.pending_child_ids
            .get_mut(&record_type)
            .and_then(VecDeque::pop_front)
    }

    /// Append parent identifiers to a dependent type's queue
    ///
    /// Identifiers already queued are skipped so an incremental re-fetch of a
    /// parent does not schedule the same dependent fetch twice. Order is kept.
    ///
    /// # Returns
    /// Number of identifiers actually added
    pub fn enqueue_children<I>(&mut self, record_type: RecordType, ids: I) -> usize
    where
        I: IntoIterator<Item = String>,
    {
        let queue = self.pending_child_ids.entry(record_type).or_default();
        let mut seen: HashSet<String> = queue.iter().cloned().collect();
        let before = queue.len();
        for id in ids {
            if seen.insert(id.clone()) {
                queue.push_back(id);
            }
        }
        queue.len() - before
    }

    /// Reset every type to incomplete at page 1; queues are left untouched
    pub fn reset_for_incremental(&mut self) {
        for progress in self.per_type.values_mut() {
            *progress = TypeProgress::default();
        }
        info!(
            pending = self.total_pending(),
            "Incremental pass: record types reset, pending queues kept"
        );
    }

    /// Every type complete
    pub fn all_complete(&self) -> bool {
        RecordType::ALL.iter().all(|t| self.is_complete(*t))
    }

    /// Every dependent queue empty
    pub fn queues_empty(&self) -> bool {
        self.total_pending() == 0
    }

    /// A pass is finished when every type is complete and every queue is drained
    pub fn is_pass_complete(&self) -> bool {
        self.all_complete() && self.queues_empty()
    }

    /// Start of the pass in progress
    pub fn last_sync_started(&self) -> Option<DateTime<Utc>> {
        self.last_sync_started
    }

    /// Start of the last pass that finished
    pub fn last_successful_sync_started(&self) -> Option<DateTime<Utc>> {
        self.last_successful_sync_started
    }

    /// Stamp the start of a new pass
    pub fn start_pass(&mut self, started: DateTime<Utc>) {
        self.last_sync_started = Some(started);
    }

    /// Record that the pass in progress finished
    pub fn record_successful_pass(&mut self) {
        if self.last_sync_started.is_some() {
            self.last_successful_sync_started = self.last_sync_started;
        }
    }

    /// Validate schema version (accepts current version only)
    pub fn validate_schema_version(&self) -> Result<(), StateError> {
        if self.schema_version != SCHEMA_VERSION {
            return Err(StateError::SchemaVersionMismatch {
                expected: SCHEMA_VERSION.to_string(),
                found: self.schema_version.clone(),
            });
        }
        Ok(())
    }
}

/// Checkpoint persistence errors
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// Schema version mismatch
    #[error("schema version mismatch: expected {expected}, found {found}")]
    SchemaVersionMismatch {
        /// Expected version
        expected: String,
        /// Found version
        found: String,
    },

    /// Checkpoint file exceeds maximum allowed size
    #[error("checkpoint file too large: {size} bytes (max: {max} bytes)")]
    StateTooLarge {
        /// Actual file size
        size: u64,
        /// Maximum allowed size
        max: u64,
    },

    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Deserialization error
    #[error("deserialization error: {0}")]
    DeserializationError(String),

    /// Lock error
    #[error("lock error: {0}")]
    LockError(String),
}
