//! Signals reported to the host platform
//!
//! Each invocation ends in exactly one terminal signal for its phase. A data
//! pass may additionally report Delay (rate limited) or Progress (timed out)
//! when it suspends instead of finishing.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tracing::{error, info, warn};

use crate::metrics;

/// One external sync unit (a project) offered to the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalSyncUnit {
    /// Project identifier
    pub id: String,
    /// Project name
    pub name: String,
    /// Human-readable description
    pub description: String,
    /// Number of items, when the source reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_count: Option<u64>,
}

/// Signal emitted to the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum Signal {
    /// Data pass suspended at the deadline
    Progress {
        /// Estimated completion, 0..=100
        percent_complete: u8,
    },
    /// Pass suspended by a rate limit; reschedule after the delay
    Delay {
        /// Milliseconds to wait
        delay_ms: u64,
    },
    /// Data pass finished
    Done,
    /// Data pass aborted
    Error {
        /// Single failure message
        message: String,
    },
    /// Sync unit discovery finished
    SyncUnitsDone {
        /// Discovered units
        units: Vec<ExternalSyncUnit>,
    },
    /// Sync unit discovery failed
    SyncUnitsError {
        /// Single failure message
        message: String,
    },
    /// Metadata published
    MetadataDone,
    /// Metadata publication failed
    MetadataError {
        /// Single failure message
        message: String,
    },
}

impl Signal {
    /// Short name for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Signal::Progress { .. } => "progress",
            Signal::Delay { .. } => "delay",
            Signal::Done => "done",
            Signal::Error { .. } => "error",
            Signal::SyncUnitsDone { .. } => "sync_units_done",
            Signal::SyncUnitsError { .. } => "sync_units_error",
            Signal::MetadataDone => "metadata_done",
            Signal::MetadataError { .. } => "metadata_error",
        }
    }

    /// Whether this signal ends its phase with a failure
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Signal::Error { .. } | Signal::SyncUnitsError { .. } | Signal::MetadataError { .. }
        )
    }
}

/// Signal delivery errors
#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    /// The host could not be reached
    #[error("failed to deliver {kind} signal: {message}")]
    Delivery {
        /// Signal kind
        kind: &'static str,
        /// Underlying failure
        message: String,
    },
}

/// Sink for signals
#[async_trait]
pub trait SignalEmitter: Send + Sync {
    /// Deliver one signal
    async fn emit(&self, signal: Signal) -> Result<(), SignalError>;
}

fn log_signal(signal: &Signal) {
    match signal {
        Signal::Error { message }
        | Signal::SyncUnitsError { message }
        | Signal::MetadataError { message } => {
            error!(signal = signal.kind(), message = %message, "Emitting signal")
        }
        Signal::Delay { delay_ms } => warn!(signal = signal.kind(), delay_ms, "Emitting signal"),
        Signal::Progress { percent_complete } => {
            info!(signal = signal.kind(), percent_complete, "Emitting signal")
        }
        Signal::SyncUnitsDone { units } => {
            info!(signal = signal.kind(), units = units.len(), "Emitting signal")
        }
        Signal::Done | Signal::MetadataDone => info!(signal = signal.kind(), "Emitting signal"),
    }
}

/// Emitter that only logs
#[derive(Debug, Default, Clone, Copy)]
pub struct LogEmitter;

#[async_trait]
impl SignalEmitter for LogEmitter {
    async fn emit(&self, signal: Signal) -> Result<(), SignalError> {
        log_signal(&signal);
        metrics::record_signal(signal.kind());
        Ok(())
    }
}

/// Emitter that logs and records every signal
#[derive(Debug, Default)]
pub struct RecordingEmitter {
    signals: Mutex<Vec<Signal>>,
}

impl RecordingEmitter {
    /// Empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Signals emitted so far
    pub fn signals(&self) -> Vec<Signal> {
        self.signals
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    /// Last emitted signal
    pub fn last(&self) -> Option<Signal> {
        self.signals.lock().ok().and_then(|s| s.last().cloned())
    }
}

#[async_trait]
impl SignalEmitter for RecordingEmitter {
    async fn emit(&self, signal: Signal) -> Result<(), SignalError> {
        log_signal(&signal);
        metrics::record_signal(signal.kind());
        self.signals
            .lock()
            .map_err(|e| SignalError::Delivery {
                kind: signal.kind(),
                message: e.to_string(),
            })?
            .push(signal);
        Ok(())
    }
}
