//! Repository sinks
//!
//! A repository accepts a batch of raw items for one record type and durably
//! persists their normalized form. Each push is all-or-nothing: every item is
//! normalized before anything is written.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use crate::record::RecordType;

pub mod jsonl;
pub mod memory;
pub mod normalize;

pub use jsonl::JsonlRepository;
pub use memory::MemoryRepository;

/// Repository name for the external domain metadata document
pub const METADATA_REPOSITORY: &str = "external_domain_metadata";

/// Sink errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// An item could not be normalized
    #[error("cannot normalize {repository} item: {message}")]
    NormalizeError {
        /// Repository name
        repository: String,
        /// What was wrong with the item
        message: String,
    },

    /// The repository refused the batch
    #[error("repository {repository} rejected batch: {message}")]
    Rejected {
        /// Repository name
        repository: String,
        /// Reason given
        message: String,
    },
}

/// Result type for sink operations
pub type SinkResult<T> = Result<T, SinkError>;

/// Normalized item shape written by repositories
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedItem {
    /// Source identifier
    pub id: String,
    /// Creation timestamp (RFC 3339)
    pub created_date: String,
    /// Last modification timestamp (RFC 3339)
    pub modified_date: String,
    /// Mapped fields
    pub data: Value,
}

/// Maps one raw item to its normalized form
pub type NormalizeFn = fn(&Value) -> Result<NormalizedItem, String>;

/// Apply `normalize` to every item, or pass items through when there is none
pub(crate) fn prepare_batch(
    repository: &str,
    normalize: Option<NormalizeFn>,
    items: &[Value],
) -> SinkResult<Vec<Value>> {
    let Some(normalize) = normalize else {
        return Ok(items.to_vec());
    };
    items
        .iter()
        .map(|item| {
            let normalized = normalize(item).map_err(|message| SinkError::NormalizeError {
                repository: repository.to_string(),
                message,
            })?;
            serde_json::to_value(normalized).map_err(|e| SinkError::SerializationError(e.to_string()))
        })
        .collect()
}

/// Destination for the items of one record type
#[async_trait]
pub trait Repository: Send + Sync {
    /// Repository name
    fn name(&self) -> &str;

    /// Persist a batch atomically
    ///
    /// # Returns
    /// Number of items persisted
    async fn push(&self, items: &[Value]) -> SinkResult<usize>;
}

/// Repositories keyed by name
#[derive(Default, Clone)]
pub struct RepositoryRegistry {
    repositories: BTreeMap<String, Arc<dyn Repository>>,
}

impl RepositoryRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a repository under its own name, replacing any previous one
    pub fn register(&mut self, repository: Arc<dyn Repository>) {
        self.repositories
            .insert(repository.name().to_string(), repository);
    }

    /// Builder form of [`register`](Self::register)
    pub fn with(mut self, repository: Arc<dyn Repository>) -> Self {
        self.register(repository);
        self
    }

    /// Look up a repository
    pub fn get(&self, name: &str) -> Option<Arc<dyn Repository>> {
        self.repositories.get(name).cloned()
    }

    /// Registered names in sorted order
    pub fn names(&self) -> Vec<&str> {
        self.repositories.keys().map(String::as_str).collect()
    }

    /// JSON Lines files under `dir`: one per record type plus the metadata repository
    pub fn jsonl(dir: &Path) -> SinkResult<Self> {
        std::fs::create_dir_all(dir).map_err(|e| SinkError::IoError(e.to_string()))?;
        let mut registry = Self::new();
        for record_type in RecordType::ALL {
            registry.register(Arc::new(JsonlRepository::for_record_type(dir, record_type)));
        }
        registry.register(Arc::new(JsonlRepository::new(
            METADATA_REPOSITORY,
            dir.join(format!("{METADATA_REPOSITORY}.jsonl")),
            None,
        )));
        Ok(registry)
    }
}

impl std::fmt::Debug for RepositoryRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositoryRegistry")
            .field("repositories", &self.names())
            .finish()
    }
}
