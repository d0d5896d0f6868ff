//! Source fetchers for the project-management API

use crate::record::RecordType;
use crate::scope::SyncScope;
use async_trait::async_trait;
use serde_json::Value;

pub mod pagination;
pub mod projects_http;
pub mod strategy;

/// Fetcher errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetcherError {
    /// HTTP request error
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Response parse error
    #[error("parse error: {0}")]
    ParseError(String),

    /// API error response
    #[error("API error: {0}")]
    ApiError(String),

    /// Server-side rate limit with its retry-after hint
    #[error("rate limit exceeded, retry after {retry_after_ms} ms")]
    RateLimited {
        /// Milliseconds the server asked us to wait
        retry_after_ms: u64,
    },

    /// Network error
    #[error("network error: {0}")]
    NetworkError(String),

    /// Pagination did not terminate
    #[error("max pages ({0}) exceeded - possible infinite pagination")]
    MaxPagesExceeded(u32),
}

/// Result type for fetcher operations
pub type FetcherResult<T> = Result<T, FetcherError>;

/// Collection addressed by a single page request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Collection {
    /// Projects visible in the portal (sync unit discovery)
    Projects,
    /// Paged list of a primary record type
    Records(RecordType),
    /// Paged list of a dependent type under one parent identifier
    Children {
        /// Dependent record type
        record_type: RecordType,
        /// Identifier of the parent record
        parent_id: String,
    },
}

impl Collection {
    /// Endpoint family label used for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Collection::Projects => "projects",
            Collection::Records(record_type) => record_type.name(),
            Collection::Children { record_type, .. } => record_type.name(),
        }
    }

    /// Unique label including the parent identifier
    pub fn label(&self) -> String {
        match self {
            Collection::Children {
                record_type,
                parent_id,
            } => format!("{record_type}/{parent_id}"),
            other => other.kind().to_string(),
        }
    }
}

/// One page request against the source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    /// Collection to read
    pub collection: Collection,
    /// Portal and project
    pub scope: SyncScope,
    /// 1-based page number
    pub page: u32,
    /// Items per page
    pub page_size: usize,
    /// Only return records modified after this RFC 3339 timestamp
    pub modified_since: Option<String>,
}

/// Client able to read one page of any collection
#[async_trait]
pub trait SourceClient: Send + Sync {
    /// Fetch one page and return the raw response body
    ///
    /// # Errors
    /// Returns [`FetcherError::RateLimited`] when the server rejects the call
    /// with a rate-limit status, other variants for transport failures.
    async fn get_page(&self, request: &PageRequest) -> FetcherResult<Value>;
}
