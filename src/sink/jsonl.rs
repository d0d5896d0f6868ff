//! JSON Lines repository
//!
//! Appends one normalized item per line. A batch is serialized in full before
//! the file is touched. If the write or the sync fails, the file is truncated
//! back to its length before the batch, so a failed push leaves no partial
//! batch behind.

use super::normalize::normalizer_for;
use super::{prepare_batch, NormalizeFn, Repository, SinkError, SinkResult};
use crate::record::RecordType;
use async_trait::async_trait;
use serde_json::Value;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Append-only JSONL file
pub struct JsonlRepository {
    name: String,
    path: PathBuf,
    normalize: Option<NormalizeFn>,
    written: Mutex<u64>,
}

impl JsonlRepository {
    /// Create a repository
    ///
    /// # Arguments
    /// * `name` - Repository name used for lookup
    /// * `path` - Output file, created on first push
    /// * `normalize` - Mapping applied to every item, or `None` to store items as-is
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, normalize: Option<NormalizeFn>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            normalize,
            written: Mutex::new(0),
        }
    }

    /// Repository for a record type at `dir/<sink_name>.jsonl`
    pub fn for_record_type(dir: &Path, record_type: RecordType) -> Self {
        Self::new(
            record_type.sink_name(),
            dir.join(format!("{}.jsonl", record_type.sink_name())),
            Some(normalizer_for(record_type)),
        )
    }

    /// Output file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Items written through this handle
    pub async fn items_written(&self) -> u64 {
        *self.written.lock().await
    }
}

#[async_trait]
impl Repository for JsonlRepository {
    fn name(&self) -> &str {
        &self.name
    }

    async fn push(&self, items: &[Value]) -> SinkResult<usize> {
        let prepared = prepare_batch(&self.name, self.normalize, items)?;
        if prepared.is_empty() {
            return Ok(0);
        }

        let mut buffer = String::new();
        for item in &prepared {
            let line =
                serde_json::to_string(item).map_err(|e| SinkError::SerializationError(e.to_string()))?;
            buffer.push_str(&line);
            buffer.push('\n');
        }

        let mut written = self.written.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| SinkError::IoError(format!("Failed to open {}: {e}", self.path.display())))?;
        append_batch(&mut file, buffer.as_bytes())?;

        *written += prepared.len() as u64;
        debug!(
            repository = %self.name,
            count = prepared.len(),
            total = *written,
            "Batch appended"
        );
        Ok(prepared.len())
    }
}

/// File operations a batch append needs
trait BatchTarget: Write {
    fn current_len(&self) -> io::Result<u64>;
    fn truncate_to(&mut self, len: u64) -> io::Result<()>;
    fn sync(&mut self) -> io::Result<()>;
}

impl BatchTarget for File {
    fn current_len(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }

    fn sync(&mut self) -> io::Result<()> {
        self.sync_data()
    }
}

/// Write and sync `bytes`, truncating back to the previous length on failure
fn append_batch<T: BatchTarget>(target: &mut T, bytes: &[u8]) -> SinkResult<()> {
    let previous_len = target
        .current_len()
        .map_err(|e| SinkError::IoError(format!("Failed to stat output file: {e}")))?;

    let result = target
        .write_all(bytes)
        .map_err(|e| format!("Failed to write batch: {e}"))
        .and_then(|()| target.sync().map_err(|e| format!("Failed to sync batch: {e}")));

    if let Err(message) = result {
        if let Err(e) = target.truncate_to(previous_len) {
            warn!(error = %e, previous_len, "Failed to roll back partial batch");
        }
        return Err(SinkError::IoError(message));
    }
    Ok(())
}
