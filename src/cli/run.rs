//! Run command: replay one worker invocation

use chrono::Utc;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::CliError;
use crate::event::{ConnectionData, EventContext, EventType, ExtractionEvent, SyncMode};
use crate::extractor::config::{
    DEFAULT_DRAIN_SAFETY_MARGIN, DEFAULT_PAGE_SIZE, DEFAULT_RATE_QUOTA, DEFAULT_RATE_WINDOW_MS,
};
use crate::extractor::{ExtractorConfig, InvocationDeadline, PassOutcome, SharedDeadline};
use crate::fetcher::projects_http::{ProjectsHttpClient, PROJECTS_API_BASE};
use crate::scope::SyncScope;
use crate::signal::RecordingEmitter;
use crate::sink::RepositoryRegistry;
use crate::state::FileCheckpointStore;
use crate::worker::Worker;

/// Phase to run when no event file is given
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PhaseArg {
    /// List projects in the portal
    SyncUnits,
    /// Publish external domain metadata
    Metadata,
    /// Start a data pass
    DataStart,
    /// Continue a suspended data pass
    DataContinue,
}

impl From<PhaseArg> for EventType {
    fn from(phase: PhaseArg) -> Self {
        match phase {
            PhaseArg::SyncUnits => EventType::ExtractionExternalSyncUnitsStart,
            PhaseArg::Metadata => EventType::ExtractionMetadataStart,
            PhaseArg::DataStart => EventType::ExtractionDataStart,
            PhaseArg::DataContinue => EventType::ExtractionDataContinue,
        }
    }
}

/// Sync mode argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    /// Extract everything
    Full,
    /// Extract changes since the last successful pass
    Incremental,
}

impl From<ModeArg> for SyncMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Full => SyncMode::Full,
            ModeArg::Incremental => SyncMode::Incremental,
        }
    }
}

/// Run command arguments
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Event JSON file; when omitted the event is built from --phase, --scope and --mode
    #[arg(long)]
    pub event: Option<PathBuf>,

    /// Phase to run
    #[arg(long, value_enum, default_value = "data-start")]
    pub phase: PhaseArg,

    /// Portal and project as PORTAL/PROJECT (overrides the event file)
    #[arg(long)]
    pub scope: Option<String>,

    /// Sync mode (overrides the event file)
    #[arg(long, value_enum)]
    pub mode: Option<ModeArg>,

    /// OAuth access token (overrides the event file)
    #[arg(long, env = "SYNC_EXTRACTOR_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Checkpoint file
    #[arg(long, default_value = "state/checkpoint.json")]
    pub state: PathBuf,

    /// Directory for JSONL repositories
    #[arg(long, default_value = "out")]
    pub out_dir: PathBuf,

    /// API root URL
    #[arg(long, default_value = PROJECTS_API_BASE)]
    pub base_url: String,

    /// Suspend after this many seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Items per page
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    pub page_size: usize,

    /// Requests allowed per rate window
    #[arg(long, default_value_t = DEFAULT_RATE_QUOTA)]
    pub quota: u32,

    /// Rate window length in milliseconds
    #[arg(long, default_value_t = DEFAULT_RATE_WINDOW_MS)]
    pub window_ms: u64,

    /// Requests held back from each drain batch
    #[arg(long, default_value_t = DEFAULT_DRAIN_SAFETY_MARGIN)]
    pub safety_margin: u32,
}

impl RunArgs {
    /// Build the event for this invocation
    pub fn build_event(&self) -> Result<ExtractionEvent, CliError> {
        let mut event = match &self.event {
            Some(path) => {
                let json = std::fs::read_to_string(path).map_err(|e| {
                    CliError::InvalidArgument(format!("cannot read event {}: {e}", path.display()))
                })?;
                ExtractionEvent::from_json(&json)?
            }
            None => ExtractionEvent {
                event_type: self.phase.into(),
                connection_data: ConnectionData::default(),
                event_context: EventContext::default(),
                deadline_ms: None,
            },
        };

        if let Some(scope) = &self.scope {
            let scope = SyncScope::parse(scope)?;
            event.connection_data.org_id = scope.portal_id().to_string();
            event.event_context.external_sync_unit_id = scope.project_id().to_string();
        }
        if let Some(mode) = self.mode {
            event.event_context.mode = mode.into();
        }
        if let Some(token) = &self.token {
            event.connection_data.key = token.clone();
        }
        Ok(event)
    }

    /// Build the extractor configuration
    pub fn config(&self) -> Result<ExtractorConfig, CliError> {
        let config = ExtractorConfig::default()
            .with_page_size(self.page_size)
            .with_rate_limit(self.quota, Duration::from_millis(self.window_ms))
            .with_drain_safety_margin(self.safety_margin);
        config.validate().map_err(CliError::ConfigurationError)?;
        Ok(config)
    }

    /// Earliest of the event deadline and `--timeout-secs`
    fn deadline(&self, event: &ExtractionEvent) -> SharedDeadline {
        let from_timeout = self
            .timeout_secs
            .map(|secs| Utc::now().timestamp_millis().max(0) as u64 + secs * 1000);
        let expires_at = match (event.deadline_ms, from_timeout) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        InvocationDeadline::from_option(expires_at).into_shared()
    }

    /// Execute one invocation and print the emitted signals as JSON lines
    pub async fn execute(&self) -> Result<(), CliError> {
        let event = self.build_event()?;
        let config = self.config()?;
        let deadline = self.deadline(&event);

        tokio::spawn({
            let deadline = Arc::clone(&deadline);
            async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Ctrl+C received - suspending at the next step...");
                    deadline.request_suspend();
                }
            }
        });

        let source = ProjectsHttpClient::new(event.connection_data.key.clone(), self.base_url.clone())?;
        let repositories = RepositoryRegistry::jsonl(&self.out_dir)?;
        let store = FileCheckpointStore::new(&self.state);
        let emitter = Arc::new(RecordingEmitter::new());

        info!(
            phase = %event.phase(),
            state = %self.state.display(),
            out_dir = %self.out_dir.display(),
            "Running invocation"
        );

        let worker = Worker::new(
            Arc::new(source),
            Arc::new(repositories),
            emitter.clone(),
            Arc::new(store),
        )
        .with_config(config)
        .with_deadline(deadline);

        let outcome = worker.handle(&event).await?;

        for signal in emitter.signals() {
            match serde_json::to_string(&signal) {
                Ok(line) => println!("{line}"),
                Err(e) => warn!(error = %e, "Failed to render signal"),
            }
        }

        match outcome {
            PassOutcome::Aborted { message } => Err(CliError::Aborted(message)),
            outcome => {
                info!(outcome = %outcome, "Invocation finished");
                Ok(())
            }
        }
    }
}
