//! CLI error types and conversions

use crate::event::EventError;
use crate::extractor::ExtractError;
use crate::fetcher::FetcherError;
use crate::scope::ScopeError;
use crate::sink::SinkError;
use crate::state::StateError;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Event error
    #[error("event error: {0}")]
    EventError(#[from] EventError),

    /// Scope error
    #[error("scope error: {0}")]
    ScopeError(#[from] ScopeError),

    /// Fetcher error
    #[error("fetcher error: {0}")]
    FetcherError(#[from] FetcherError),

    /// Sink error
    #[error("sink error: {0}")]
    SinkError(#[from] SinkError),

    /// Checkpoint error
    #[error("checkpoint error: {0}")]
    StateError(#[from] StateError),

    /// Extraction error
    #[error("extraction error: {0}")]
    ExtractError(#[from] ExtractError),

    /// The invocation ended with an error signal
    #[error("invocation aborted: {0}")]
    Aborted(String),

    /// Invalid argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    ConfigurationError(String),
}
