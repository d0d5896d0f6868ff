//! Checkpoint stores
//!
//! [`FileCheckpointStore`] writes atomically (temp file, fsync, rename) under
//! an advisory `fd-lock` on a sibling `.lock` file. [`MemoryCheckpointStore`]
//! keeps the state in process for tests and embedding hosts.

use super::{ExtractionState, StateError, MAX_STATE_FILE_SIZE, SCHEMA_VERSION};
use fd_lock::RwLock;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::{debug, info, warn};

/// Load and save checkpoint state between invocations
pub trait CheckpointStore: Send + Sync {
    /// Load the last saved state; `None` when nothing was saved yet
    fn load(&self) -> Result<Option<ExtractionState>, StateError>;

    /// Persist `state`, replacing the previous checkpoint
    fn save(&self, state: &ExtractionState) -> Result<(), StateError>;

    /// Load the saved state or build the initial one
    fn load_or_default(&self) -> Result<ExtractionState, StateError> {
        Ok(self.load()?.unwrap_or_default())
    }
}

/// JSON checkpoint file
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    path: PathBuf,
}

impl FileCheckpointStore {
    /// Store backed by `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Checkpoint file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the checkpoint file if present
    pub fn clear(&self) -> Result<bool, StateError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                info!(path = %self.path.display(), "Checkpoint removed");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StateError::IoError(e.to_string())),
        }
    }

    fn lock_file(&self) -> Result<std::fs::File, StateError> {
        let lock_path = self.path.with_extension("lock");
        OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| StateError::LockError(format!("Failed to create lock file: {e}")))
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn load(&self) -> Result<Option<ExtractionState>, StateError> {
        let path = self.path.as_path();
        if !path.exists() {
            debug!(path = %path.display(), "No checkpoint on disk");
            return Ok(None);
        }

        debug!(path = %path.display(), "Loading checkpoint");

        let lock = RwLock::new(self.lock_file()?);
        let _guard = lock
            .read()
            .map_err(|e| StateError::LockError(format!("Failed to acquire read lock: {e}")))?;

        let metadata = std::fs::metadata(path).map_err(|e| StateError::IoError(e.to_string()))?;
        if metadata.len() > MAX_STATE_FILE_SIZE {
            return Err(StateError::StateTooLarge {
                size: metadata.len(),
                max: MAX_STATE_FILE_SIZE,
            });
        }

        let contents =
            std::fs::read_to_string(path).map_err(|e| StateError::IoError(e.to_string()))?;

        let mut state: ExtractionState = serde_json::from_str(&contents).map_err(|e| {
            warn!(error = %e, "Failed to deserialize checkpoint");
            StateError::DeserializationError(e.to_string())
        })?;

        if let Err(e) = state.validate_schema_version() {
            warn!(
                found_version = %state.schema_version(),
                expected_version = SCHEMA_VERSION,
                "Checkpoint schema version mismatch"
            );
            return Err(e);
        }
        state.fill_missing_types();

        info!(
            path = %path.display(),
            completed_types = state.completed_type_count(),
            pending = state.total_pending(),
            "Checkpoint loaded"
        );
        Ok(Some(state))
    }

    fn save(&self, state: &ExtractionState) -> Result<(), StateError> {
        let path = self.path.as_path();
        debug!(path = %path.display(), "Saving checkpoint");

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StateError::IoError(e.to_string()))?;
        }

        let json = serde_json::to_string_pretty(state)
            .map_err(|e| StateError::SerializationError(e.to_string()))?;

        let mut lock = RwLock::new(self.lock_file()?);
        let _guard = lock
            .write()
            .map_err(|e| StateError::LockError(format!("Failed to acquire write lock: {e}")))?;

        let parent_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut temp_file = tempfile::NamedTempFile::new_in(parent_dir)
            .map_err(|e| StateError::IoError(format!("Failed to create temp file: {e}")))?;

        temp_file
            .write_all(json.as_bytes())
            .map_err(|e| StateError::IoError(format!("Failed to write to temp file: {e}")))?;
        temp_file
            .flush()
            .map_err(|e| StateError::IoError(format!("Failed to flush temp file: {e}")))?;
        temp_file
            .as_file()
            .sync_all()
            .map_err(|e| StateError::IoError(format!("Failed to sync temp file: {e}")))?;

        temp_file
            .persist(path)
            .map_err(|e| StateError::IoError(format!("Failed to persist temp file: {e}")))?;

        // Make the rename itself durable
        if let Ok(dir) = std::fs::File::open(parent_dir) {
            let _ = dir.sync_all();
        }

        debug!(
            path = %path.display(),
            completed_types = state.completed_type_count(),
            pending = state.total_pending(),
            "Checkpoint saved"
        );
        Ok(())
    }
}

/// In-process checkpoint store
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    state: Mutex<Option<ExtractionState>>,
    saves: AtomicUsize,
}

impl MemoryCheckpointStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with `state`
    pub fn with_state(state: ExtractionState) -> Self {
        Self {
            state: Mutex::new(Some(state)),
            saves: AtomicUsize::new(0),
        }
    }

    /// Last saved state
    pub fn snapshot(&self) -> Option<ExtractionState> {
        self.state.lock().ok().and_then(|guard| guard.clone())
    }

    /// Number of successful saves
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn load(&self) -> Result<Option<ExtractionState>, StateError> {
        let guard = self
            .state
            .lock()
            .map_err(|e| StateError::LockError(e.to_string()))?;
        Ok(guard.clone())
    }

    fn save(&self, state: &ExtractionState) -> Result<(), StateError> {
        let mut guard = self
            .state
            .lock()
            .map_err(|e| StateError::LockError(e.to_string()))?;
        *guard = Some(state.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
