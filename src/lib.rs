//! # Sync Extractor Library
//!
//! Resumable, rate-limit-aware extraction of project management records
//! (users, tasks, issues and their comments) into downstream repositories.
//! A host platform runs the extractor as a series of bounded-duration worker
//! invocations; each invocation picks up from a persisted checkpoint and ends
//! in exactly one signal.
//!
//! ## Features
//!
//! - **Resumable passes**: Checkpoint saved after every record type and before every suspension
//! - **Rate limiting**: Fixed request window with latched cooldown, reported as Delay signals
//! - **Dependency order**: Comments are fetched only after their parents, one parent at a time
//! - **Incremental sync**: Only records modified since the last successful pass
//! - **Deadline aware**: Suspends with a Progress signal when the invocation runs out of time
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use sync_extractor::event::SyncMode;
//! use sync_extractor::extractor::{ExtractionOrchestrator, PassEntry};
//! use sync_extractor::fetcher::projects_http::{ProjectsHttpClient, PROJECTS_API_BASE};
//! use sync_extractor::scope::SyncScope;
//! use sync_extractor::signal::LogEmitter;
//! use sync_extractor::sink::RepositoryRegistry;
//! use sync_extractor::state::{CheckpointStore, FileCheckpointStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(FileCheckpointStore::new("state/checkpoint.json"));
//! let mut state = store.load_or_default()?;
//! state.set_scope(SyncScope::parse("7001/1500")?);
//!
//! let mut orchestrator = ExtractionOrchestrator::new(
//!     Arc::new(ProjectsHttpClient::new("token", PROJECTS_API_BASE)?),
//!     Arc::new(RepositoryRegistry::jsonl("out".as_ref())?),
//!     Arc::new(LogEmitter),
//!     store,
//! );
//! let report = orchestrator.run(&mut state, PassEntry::Start(SyncMode::Full)).await?;
//! println!("{}: {}", report.outcome, report.progress.format_summary());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`record`] - Closed set of record types and their dependencies
//! - [`scope`] - Portal and project identifiers
//! - [`extractor`] - Pass orchestration, rate window, deadline
//! - [`fetcher`] - Source client, pagination and per-type strategies
//! - [`state`] - Checkpoint state and stores
//! - [`sink`] - Repositories and normalization
//! - [`signal`] - Signals reported to the host
//! - [`event`] - Invocation events
//! - [`worker`] - Phase dispatch
//! - [`metrics`] - Prometheus metrics

#![warn(missing_docs)]
#![warn(clippy::all)]

/// CLI command implementations
pub mod cli;

/// Invocation events
pub mod event;

/// Extraction pass orchestration
pub mod extractor;

/// Source access and pagination
pub mod fetcher;

/// Observability metrics
pub mod metrics;

/// Record types
pub mod record;

/// Sync scope
pub mod scope;

/// Signals
pub mod signal;

/// Repositories
pub mod sink;

/// Checkpoint state
pub mod state;

/// Phase dispatch
pub mod worker;

pub use event::{ExtractionEvent, SyncMode};
pub use extractor::{ExtractError, ExtractionOrchestrator, ExtractorConfig, PassEntry, PassOutcome};
pub use record::RecordType;
pub use scope::SyncScope;
pub use signal::Signal;
pub use state::ExtractionState;
pub use worker::Worker;
