//! Extraction engine
//!
//! The orchestrator sequences record types in dependency order, drives the
//! paginated fetcher per type, drains pending parent identifiers for
//! dependent types, and decides after every step whether to continue,
//! suspend (rate limited or out of time) or abort.
//!
//! # Components
//!
//! - [`orchestrator`] - Pass state machine
//! - [`rate_limit`] - Request window with latched cooldown and injectable clock
//! - [`deadline`] - Invocation deadline and out-of-band suspend requests
//! - [`progress`] - Completion estimate and per-invocation counters
//! - [`config`] - Defaults and tunables
//!
//! # Error Handling
//!
//! Fatal conditions are [`ExtractError`] values. The orchestrator turns each
//! one into a single Error signal; only signal delivery failures escape
//! [`ExtractionOrchestrator::run`] as `Err`.

pub mod config;
pub mod deadline;
pub mod orchestrator;
pub mod progress;
pub mod rate_limit;

pub use config::ExtractorConfig;
pub use deadline::{InvocationDeadline, SharedDeadline};
pub use orchestrator::{ExtractionOrchestrator, PassEntry, PassOutcome, PassReport, SuspendReason};
pub use rate_limit::{Admission, Clock, ManualClock, RateWindow, SharedClock, SystemClock};

use crate::fetcher::FetcherError;
use crate::record::RecordType;
use crate::scope::ScopeError;
use crate::signal::SignalError;
use crate::sink::SinkError;
use crate::state::StateError;

/// Extraction errors
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    /// Missing or malformed scope identifiers
    #[error("validation error: {0}")]
    Validation(#[from] ScopeError),

    /// Unusable configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// A primary record type could not be fetched
    #[error("failed to fetch {record_type}: {source}")]
    Transport {
        /// Record type being fetched
        record_type: RecordType,
        /// Underlying fetch error
        #[source]
        source: FetcherError,
    },

    /// A repository refused a batch
    #[error("failed to sink {record_type}: {source}")]
    Sink {
        /// Record type being sunk
        record_type: RecordType,
        /// Underlying sink error
        #[source]
        source: SinkError,
    },

    /// No repository registered under a sink name
    #[error("no repository registered for {0}")]
    MissingRepository(String),

    /// Checkpoint could not be loaded or saved
    #[error("checkpoint error: {0}")]
    State(#[from] StateError),

    /// Signal could not be delivered
    #[error("signal error: {0}")]
    Signal(#[from] SignalError),

    /// The pass ran out of work without satisfying completion
    #[error("pass incomplete: {0}")]
    Incomplete(String),
}

impl ExtractError {
    /// Whether the checkpoint should be saved before reporting the error.
    ///
    /// Validation and configuration errors happen before any mutation; state
    /// errors mean the store itself is unusable.
    pub fn persists_state(&self) -> bool {
        matches!(
            self,
            ExtractError::Transport { .. }
                | ExtractError::Sink { .. }
                | ExtractError::MissingRepository(_)
                | ExtractError::Incomplete(_)
        )
    }
}
