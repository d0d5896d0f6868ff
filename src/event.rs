//! Invocation events
//!
//! The host starts every worker invocation with one event naming the phase,
//! the connection credentials, the sync unit being extracted, the sync mode
//! and an approximate deadline.
//!
//! ```json
//! {
//!   "event_type": "EXTRACTION_DATA_START",
//!   "connection_data": { "key": "...", "org_id": "7001", "org_name": "Acme" },
//!   "event_context": { "external_sync_unit_id": "1500", "mode": "incremental" },
//!   "deadline_ms": 1700000600000
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::scope::SyncScope;

/// Event kinds the worker understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    /// List the projects that can be extracted
    ExtractionExternalSyncUnitsStart,
    /// Publish the external domain metadata
    ExtractionMetadataStart,
    /// Begin a data pass
    ExtractionDataStart,
    /// Resume a suspended data pass
    ExtractionDataContinue,
}

impl EventType {
    /// Phase this event belongs to
    pub fn phase(&self) -> Phase {
        match self {
            EventType::ExtractionExternalSyncUnitsStart => Phase::DiscoverSyncUnits,
            EventType::ExtractionMetadataStart => Phase::FetchMetadata,
            EventType::ExtractionDataStart | EventType::ExtractionDataContinue => {
                Phase::ExtractData
            }
        }
    }
}

/// Worker phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Sync unit discovery
    DiscoverSyncUnits,
    /// Metadata publication
    FetchMetadata,
    /// Data extraction pass
    ExtractData,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::DiscoverSyncUnits => write!(f, "discover-sync-units"),
            Phase::FetchMetadata => write!(f, "fetch-metadata"),
            Phase::ExtractData => write!(f, "extract-data"),
        }
    }
}

/// Sync mode of a data pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Extract everything
    #[default]
    Full,
    /// Extract records modified since the last successful pass
    Incremental,
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncMode::Full => write!(f, "full"),
            SyncMode::Incremental => write!(f, "incremental"),
        }
    }
}

/// Credentials and organization of the connection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionData {
    /// OAuth access token
    #[serde(default)]
    pub key: String,
    /// Portal identifier
    #[serde(default)]
    pub org_id: String,
    /// Portal display name
    #[serde(default)]
    pub org_name: String,
}

/// Sync unit and mode of the invocation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventContext {
    /// Project identifier
    #[serde(default)]
    pub external_sync_unit_id: String,
    /// Project name
    #[serde(default)]
    pub external_sync_unit_name: String,
    /// Sync mode
    #[serde(default)]
    pub mode: SyncMode,
}

/// One invocation event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionEvent {
    /// Event kind
    pub event_type: EventType,
    /// Credentials and portal
    #[serde(default)]
    pub connection_data: ConnectionData,
    /// Project and mode
    #[serde(default)]
    pub event_context: EventContext,
    /// Approximate deadline as Unix milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline_ms: Option<u64>,
}

/// Event errors
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    /// Event JSON could not be parsed
    #[error("invalid event: {0}")]
    Parse(String),

    /// No access token in the connection data
    #[error("event carries no access token")]
    MissingCredentials,
}

impl ExtractionEvent {
    /// Parse an event from JSON
    ///
    /// # Errors
    /// [`EventError::Parse`] for malformed JSON or an unknown event type.
    pub fn from_json(json: &str) -> Result<Self, EventError> {
        serde_json::from_str(json).map_err(|e| EventError::Parse(e.to_string()))
    }

    /// Phase of this event
    pub fn phase(&self) -> Phase {
        self.event_type.phase()
    }

    /// Sync mode of this event
    pub fn mode(&self) -> SyncMode {
        self.event_context.mode
    }

    /// Portal and project addressed by this event
    pub fn scope(&self) -> SyncScope {
        SyncScope::new(
            self.connection_data.org_id.as_str(),
            self.event_context.external_sync_unit_id.as_str(),
        )
    }

    /// Check credentials are present
    pub fn validate(&self) -> Result<(), EventError> {
        if self.connection_data.key.trim().is_empty() {
            return Err(EventError::MissingCredentials);
        }
        Ok(())
    }
}
