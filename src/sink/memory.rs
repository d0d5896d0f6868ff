//! In-memory repository with failure injection

use super::normalize::normalizer_for;
use super::{prepare_batch, NormalizeFn, Repository, SinkError, SinkResult};
use crate::record::RecordType;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// Repository keeping pushed items in memory
#[derive(Debug)]
pub struct MemoryRepository {
    name: String,
    normalize: Option<NormalizeFn>,
    items: Mutex<Vec<Value>>,
    push_calls: AtomicUsize,
    fail: AtomicBool,
}

impl MemoryRepository {
    /// Repository storing items as-is
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            normalize: None,
            items: Mutex::new(Vec::new()),
            push_calls: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
        }
    }

    /// Repository applying the record type's normalizer
    pub fn for_record_type(record_type: RecordType) -> Self {
        Self {
            normalize: Some(normalizer_for(record_type)),
            ..Self::new(record_type.sink_name())
        }
    }

    /// Make every following push fail (or succeed again)
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Items pushed so far
    pub fn items(&self) -> Vec<Value> {
        self.items
            .lock()
            .map(|items| items.clone())
            .unwrap_or_default()
    }

    /// Number of push calls, failed ones included
    pub fn push_count(&self) -> usize {
        self.push_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    fn name(&self) -> &str {
        &self.name
    }

    async fn push(&self, items: &[Value]) -> SinkResult<usize> {
        self.push_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(SinkError::Rejected {
                repository: self.name.clone(),
                message: "injected failure".to_string(),
            });
        }

        let prepared = prepare_batch(&self.name, self.normalize, items)?;
        let count = prepared.len();
        self.items
            .lock()
            .map_err(|e| SinkError::IoError(e.to_string()))?
            .extend(prepared);
        Ok(count)
    }
}
