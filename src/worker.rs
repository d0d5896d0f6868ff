//! Phase dispatch for one worker invocation
//!
//! A [`Worker`] receives one [`ExtractionEvent`] and runs the matching phase:
//! sync unit discovery, metadata publication, or a data pass through the
//! [`ExtractionOrchestrator`]. Each phase ends in exactly one terminal signal
//! of its own kind.

use futures_util::FutureExt;
use once_cell::sync::Lazy;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, info_span, warn, Instrument};

use crate::event::{EventType, ExtractionEvent, Phase};
use crate::extractor::{
    ExtractError, ExtractionOrchestrator, ExtractorConfig, InvocationDeadline, PassEntry,
    PassOutcome, RateWindow, SharedClock, SharedDeadline, SuspendReason, SystemClock,
};
use crate::fetcher::pagination::{FetchOutcome, PageGate, PaginationHelper};
use crate::fetcher::strategy::{extract_projects, id_to_string};
use crate::fetcher::{Collection, PageRequest, SourceClient};
use crate::scope::ScopeError;
use crate::signal::{ExternalSyncUnit, Signal, SignalEmitter};
use crate::sink::{RepositoryRegistry, METADATA_REPOSITORY};
use crate::state::{CheckpointStore, ExtractionState};

static EXTERNAL_DOMAIN_METADATA: Lazy<Result<Value, String>> = Lazy::new(|| {
    serde_json::from_str(include_str!("metadata/external_domain_metadata.json"))
        .map_err(|e| e.to_string())
});

/// Embedded description of the record types and fields this extractor produces
pub fn external_domain_metadata() -> Result<&'static Value, String> {
    EXTERNAL_DOMAIN_METADATA.as_ref().map_err(Clone::clone)
}

/// Runs one phase per event
pub struct Worker {
    source: Arc<dyn SourceClient>,
    repositories: Arc<RepositoryRegistry>,
    emitter: Arc<dyn SignalEmitter>,
    store: Arc<dyn CheckpointStore>,
    config: ExtractorConfig,
    clock: SharedClock,
    deadline: SharedDeadline,
}

impl Worker {
    /// Create a worker with default config, the system clock and no deadline
    pub fn new(
        source: Arc<dyn SourceClient>,
        repositories: Arc<RepositoryRegistry>,
        emitter: Arc<dyn SignalEmitter>,
        store: Arc<dyn CheckpointStore>,
    ) -> Self {
        Self {
            source,
            repositories,
            emitter,
            store,
            config: ExtractorConfig::default(),
            clock: SystemClock::shared(),
            deadline: InvocationDeadline::unbounded().into_shared(),
        }
    }

    /// Set configuration
    pub fn with_config(mut self, config: ExtractorConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the clock
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Set the invocation deadline
    ///
    /// An event's own `deadline_ms` tightens it further for that invocation.
    pub fn with_deadline(mut self, deadline: SharedDeadline) -> Self {
        self.deadline = deadline;
        self
    }

    /// Handle one event
    ///
    /// # Errors
    /// Only signal delivery failures; every other failure is reported through
    /// the phase's error signal and returned as [`PassOutcome::Aborted`].
    pub async fn handle(&self, event: &ExtractionEvent) -> Result<PassOutcome, ExtractError> {
        let phase = event.phase();
        let deadline = self.deadline.bounded_by(event.deadline_ms);
        let span = info_span!("worker", phase = %phase, scope = %event.scope());

        async move {
            info!(event_type = ?event.event_type, mode = %event.mode(), "Handling event");

            if let Err(e) = event.validate() {
                return self.fail(phase, e.to_string()).await;
            }

            match phase {
                Phase::DiscoverSyncUnits => self.discover_sync_units(event, &deadline).await,
                Phase::FetchMetadata => self.publish_metadata(&deadline).await,
                Phase::ExtractData => self.extract_data(event, &deadline).await,
            }
        }
        .instrument(span)
        .await
    }

    async fn discover_sync_units(
        &self,
        event: &ExtractionEvent,
        deadline: &SharedDeadline,
    ) -> Result<PassOutcome, ExtractError> {
        let scope = event.scope();
        if scope.portal_id().is_empty() {
            return self
                .fail(Phase::DiscoverSyncUnits, ScopeError::MissingPortal.to_string())
                .await;
        }

        let mut rate_window = RateWindow::new(
            self.config.rate_quota,
            self.config.rate_window,
            self.clock.clone(),
        );
        let page_size = self.config.page_size;
        let mut gate = PageGate::new(
            &mut rate_window,
            deadline,
            page_size,
            self.config.max_pages,
        );
        let source = Arc::clone(&self.source);

        let outcome = PaginationHelper::fetch_all(
            &mut gate,
            move |page| {
                let request = PageRequest {
                    collection: Collection::Projects,
                    scope: scope.clone(),
                    page,
                    page_size,
                    modified_since: None,
                };
                let source = Arc::clone(&source);
                async move { source.get_page(&request).await }.boxed()
            },
            extract_projects,
        )
        .await;

        match outcome {
            FetchOutcome::Items { items, pages } => {
                let units: Vec<ExternalSyncUnit> = items.iter().filter_map(to_sync_unit).collect();
                if units.len() < items.len() {
                    warn!(
                        skipped = items.len() - units.len(),
                        "Ignoring projects without an identifier"
                    );
                }
                info!(units = units.len(), pages, "Discovered sync units");
                self.emitter.emit(Signal::SyncUnitsDone { units }).await?;
                Ok(PassOutcome::Done)
            }
            FetchOutcome::RateLimited { delay_ms } => {
                self.emitter.emit(Signal::Delay { delay_ms }).await?;
                Ok(PassOutcome::Suspended(SuspendReason::RateLimited { delay_ms }))
            }
            FetchOutcome::Interrupted => {
                self.fail(
                    Phase::DiscoverSyncUnits,
                    "invocation timed out".to_string(),
                )
                .await
            }
            FetchOutcome::Failed(e) => self.fail(Phase::DiscoverSyncUnits, e.to_string()).await,
        }
    }

    async fn publish_metadata(&self, deadline: &SharedDeadline) -> Result<PassOutcome, ExtractError> {
        if deadline.is_reached(self.clock.now_ms()) {
            return self
                .fail(Phase::FetchMetadata, "invocation timed out".to_string())
                .await;
        }

        let metadata = match external_domain_metadata() {
            Ok(metadata) => metadata,
            Err(e) => return self.fail(Phase::FetchMetadata, e).await,
        };
        let Some(repository) = self.repositories.get(METADATA_REPOSITORY) else {
            return self
                .fail(
                    Phase::FetchMetadata,
                    format!("no repository registered for {METADATA_REPOSITORY}"),
                )
                .await;
        };

        if let Err(e) = repository.push(std::slice::from_ref(metadata)).await {
            return self.fail(Phase::FetchMetadata, e.to_string()).await;
        }

        info!(repository = METADATA_REPOSITORY, "Published external domain metadata");
        self.emitter.emit(Signal::MetadataDone).await?;
        Ok(PassOutcome::Done)
    }

    async fn extract_data(
        &self,
        event: &ExtractionEvent,
        deadline: &SharedDeadline,
    ) -> Result<PassOutcome, ExtractError> {
        let entry = match event.event_type {
            EventType::ExtractionDataStart => PassEntry::Start(event.mode()),
            _ => PassEntry::Continue(event.mode()),
        };

        let mut state = match self.store.load_or_default() {
            Ok(state) => state,
            Err(e) => return self.fail(Phase::ExtractData, e.to_string()).await,
        };

        let scope = event.scope();
        if !scope.is_empty() {
            let starting = matches!(entry, PassEntry::Start(_));
            if state.scope().is_empty() {
                state.set_scope(scope);
            } else if state.scope() != &scope {
                if starting {
                    info!(
                        checkpoint = %state.scope(),
                        event = %scope,
                        "Start event names a new scope, discarding the previous checkpoint"
                    );
                    state = ExtractionState::new(scope);
                } else {
                    warn!(
                        checkpoint = %state.scope(),
                        event = %scope,
                        "Continue event names a different scope, keeping the checkpoint's"
                    );
                }
            }
        }

        let mut orchestrator = ExtractionOrchestrator::new(
            Arc::clone(&self.source),
            Arc::clone(&self.repositories),
            Arc::clone(&self.emitter),
            Arc::clone(&self.store),
        )
        .with_config(self.config.clone())
        .with_clock(self.clock.clone())
        .with_deadline(Arc::clone(deadline));

        let report = orchestrator.run(&mut state, entry).await?;
        Ok(report.outcome)
    }

    async fn fail(&self, phase: Phase, message: String) -> Result<PassOutcome, ExtractError> {
        let signal = match phase {
            Phase::DiscoverSyncUnits => Signal::SyncUnitsError {
                message: format!("Failed to extract external sync units: {message}"),
            },
            Phase::FetchMetadata => Signal::MetadataError {
                message: format!("Failed to extract metadata: {message}"),
            },
            Phase::ExtractData => Signal::Error {
                message: message.clone(),
            },
        };
        self.emitter.emit(signal).await?;
        Ok(PassOutcome::Aborted { message })
    }
}

fn to_sync_unit(project: &Value) -> Option<ExternalSyncUnit> {
    let id = ["id_string", "id"]
        .iter()
        .find_map(|key| project.get(key).and_then(id_to_string))?;
    let name = project
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or(&id)
        .to_string();
    let description = project
        .get("description")
        .and_then(Value::as_str)
        .filter(|d| !d.trim().is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("Project {name}"));
    let item_count = project.get("task_count").and_then(|counts| {
        let open = counts.get("open").and_then(Value::as_u64);
        let closed = counts.get("closed").and_then(Value::as_u64);
        match (open, closed) {
            (None, None) => None,
            (open, closed) => Some(open.unwrap_or(0) + closed.unwrap_or(0)),
        }
    });

    Some(ExternalSyncUnit {
        id,
        name,
        description,
        item_count,
    })
}
