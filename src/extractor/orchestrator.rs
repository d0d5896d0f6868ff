//! Extraction pass state machine
//!
//! `Idle -> ResettingIfIncremental -> FetchingType(T) -> DrainingChildren(T)
//! -> Done | Suspended(reason) | Aborted(error)`
//!
//! Primary types are fetched whole: a rate limit anywhere in a type discards
//! its pages and the type restarts at page 1 on resume. Dependent types are
//! drained one parent identifier at a time; an identifier leaves its queue
//! only after its items were sunk (or its fetch failed and it was skipped).
//! The checkpoint is saved after every type transition and before every
//! suspension.

use chrono::{DateTime, SecondsFormat, Utc};
use futures_util::FutureExt;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::config::ExtractorConfig;
use super::deadline::{InvocationDeadline, SharedDeadline};
use super::progress::{percent_complete, PassProgress};
use super::rate_limit::{RateWindow, SharedClock, SystemClock};
use super::ExtractError;
use crate::event::SyncMode;
use crate::fetcher::pagination::{FetchOutcome, PageGate, PaginationHelper};
use crate::fetcher::strategy::{strategy_for, FetchContext, RecordStrategy};
use crate::fetcher::SourceClient;
use crate::metrics::{self, PassMetrics};
use crate::record::RecordType;
use crate::signal::{Signal, SignalEmitter};
use crate::sink::RepositoryRegistry;
use crate::state::{CheckpointStore, ExtractionState};

/// How an invocation enters the pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassEntry {
    /// First invocation of a pass: stamps the start and applies the incremental reset
    Start(SyncMode),
    /// Later invocation resuming a suspended pass
    Continue(SyncMode),
}

impl PassEntry {
    /// Sync mode of the pass
    pub fn mode(&self) -> SyncMode {
        match self {
            PassEntry::Start(mode) | PassEntry::Continue(mode) => *mode,
        }
    }

    /// Short label for logs and metrics
    pub fn label(&self) -> &'static str {
        match self {
            PassEntry::Start(_) => "start",
            PassEntry::Continue(_) => "continue",
        }
    }
}

impl fmt::Display for PassEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.label(), self.mode())
    }
}

/// Why a pass stopped without finishing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuspendReason {
    /// Local window or server rejected a request
    RateLimited {
        /// Milliseconds until requests are accepted again
        delay_ms: u64,
    },
    /// Invocation deadline reached
    TimedOut,
}

/// Terminal state of one invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    /// Every type complete and every queue empty
    Done,
    /// Stopped early; a later invocation continues
    Suspended(SuspendReason),
    /// Fatal error
    Aborted {
        /// Message carried by the Error signal
        message: String,
    },
}

impl PassOutcome {
    /// Short label for logs and metrics
    pub fn label(&self) -> &'static str {
        match self {
            PassOutcome::Done => "done",
            PassOutcome::Suspended(SuspendReason::RateLimited { .. }) => "rate_limited",
            PassOutcome::Suspended(SuspendReason::TimedOut) => "timed_out",
            PassOutcome::Aborted { .. } => "aborted",
        }
    }
}

impl fmt::Display for PassOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Outcome plus counters of one invocation
#[derive(Debug, Clone)]
pub struct PassReport {
    /// How the invocation ended
    pub outcome: PassOutcome,
    /// What it did
    pub progress: PassProgress,
}

enum Step {
    Continue,
    Stop(PassOutcome),
}

enum Batch {
    Attempt(u32),
    Stop(PassOutcome),
}

/// Drives one extraction pass per invocation
pub struct ExtractionOrchestrator {
    source: Arc<dyn SourceClient>,
    repositories: Arc<RepositoryRegistry>,
    emitter: Arc<dyn SignalEmitter>,
    store: Arc<dyn CheckpointStore>,
    config: ExtractorConfig,
    clock: SharedClock,
    deadline: SharedDeadline,
    rate_window: RateWindow,
}

impl ExtractionOrchestrator {
    /// Create an orchestrator with default config, the system clock and no deadline
    ///
    /// # Arguments
    /// * `source` - Client for the external API
    /// * `repositories` - Sinks keyed by record type sink name
    /// * `emitter` - Destination for signals
    /// * `store` - Checkpoint store saved at every transition
    pub fn new(
        source: Arc<dyn SourceClient>,
        repositories: Arc<RepositoryRegistry>,
        emitter: Arc<dyn SignalEmitter>,
        store: Arc<dyn CheckpointStore>,
    ) -> Self {
        let config = ExtractorConfig::default();
        let clock = SystemClock::shared();
        let rate_window = RateWindow::new(config.rate_quota, config.rate_window, clock.clone());
        Self {
            source,
            repositories,
            emitter,
            store,
            config,
            clock,
            deadline: InvocationDeadline::unbounded().into_shared(),
            rate_window,
        }
    }

    /// Set configuration; resets the rate window
    pub fn with_config(mut self, config: ExtractorConfig) -> Self {
        self.config = config;
        self.rebuild_rate_window();
        self
    }

    /// Set the clock; resets the rate window
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self.rebuild_rate_window();
        self
    }

    /// Set the invocation deadline
    pub fn with_deadline(mut self, deadline: SharedDeadline) -> Self {
        self.deadline = deadline;
        self
    }

    fn rebuild_rate_window(&mut self) {
        self.rate_window = RateWindow::new(
            self.config.rate_quota,
            self.config.rate_window,
            self.clock.clone(),
        );
    }

    /// Rate window used by this invocation
    pub fn rate_window(&self) -> &RateWindow {
        &self.rate_window
    }

    /// Run one invocation of the pass recorded in `state`
    ///
    /// `state` is mutated in place and saved to the store at every transition.
    /// Exactly one of Done, Delay, Progress or Error is emitted.
    ///
    /// # Errors
    /// Only signal delivery failures are returned; every other fatal condition
    /// is reported through an Error signal and [`PassOutcome::Aborted`].
    pub async fn run(
        &mut self,
        state: &mut ExtractionState,
        entry: PassEntry,
    ) -> Result<PassReport, ExtractError> {
        let span = info_span!("extraction_pass", scope = %state.scope(), entry = %entry);
        async move {
            info!("Starting extraction pass");
            let pass_metrics = PassMetrics::start(entry.label());
            let mut progress = PassProgress::new();

            let outcome = match self.run_pass(state, entry, &mut progress).await {
                Ok(outcome) => outcome,
                Err(ExtractError::Signal(e)) => return Err(ExtractError::Signal(e)),
                Err(error) => self.abort(state, error).await?,
            };

            pass_metrics.record_outcome(&outcome);
            info!(
                outcome = %outcome,
                summary = %progress.format_summary(),
                "Extraction pass invocation finished"
            );
            Ok(PassReport { outcome, progress })
        }
        .instrument(span)
        .await
    }

    async fn run_pass(
        &mut self,
        state: &mut ExtractionState,
        entry: PassEntry,
        progress: &mut PassProgress,
    ) -> Result<PassOutcome, ExtractError> {
        self.config.validate().map_err(ExtractError::Config)?;
        state.scope().validate()?;

        if let PassEntry::Start(mode) = entry {
            let started = DateTime::<Utc>::from_timestamp_millis(self.clock.now_ms() as i64)
                .unwrap_or_else(Utc::now);
            state.start_pass(started);
            if mode == SyncMode::Incremental {
                state.reset_for_incremental();
            }
            self.store.save(state)?;
        }

        let ctx = FetchContext {
            scope: state.scope().clone(),
            modified_since: match entry.mode() {
                SyncMode::Incremental => state
                    .last_successful_sync_started()
                    .map(|ts| ts.to_rfc3339_opts(SecondsFormat::Secs, true)),
                SyncMode::Full => None,
            },
        };

        for record_type in RecordType::primaries() {
            if state.is_complete(record_type) {
                debug!(record_type = %record_type, "Record type already complete, skipping");
                continue;
            }
            if let Step::Stop(outcome) = self.extract_primary(state, record_type, &ctx, progress).await? {
                return Ok(outcome);
            }
        }

        for record_type in RecordType::dependents() {
            if state.is_complete(record_type) && state.pending_len(record_type) == 0 {
                debug!(record_type = %record_type, "Record type already complete, skipping");
                continue;
            }
            if let Some(parent) = record_type.parent() {
                if !state.is_complete(parent) {
                    return Err(ExtractError::Incomplete(format!(
                        "{record_type} cannot start before {parent} is complete"
                    )));
                }
            }
            if let Step::Stop(outcome) = self.drain_children(state, record_type, &ctx, progress).await? {
                return Ok(outcome);
            }
        }

        if !state.is_pass_complete() {
            return Err(ExtractError::Incomplete(format!(
                "{} of {} record types complete, {} identifiers pending",
                state.completed_type_count(),
                RecordType::ALL.len(),
                state.total_pending()
            )));
        }

        state.record_successful_pass();
        self.store.save(state)?;
        self.emit(Signal::Done).await?;
        Ok(PassOutcome::Done)
    }

    async fn extract_primary(
        &mut self,
        state: &mut ExtractionState,
        record_type: RecordType,
        ctx: &FetchContext,
        progress: &mut PassProgress,
    ) -> Result<Step, ExtractError> {
        let strategy = strategy_for(record_type);
        info!(record_type = %record_type, "Fetching record type");

        match self.fetch_collection(strategy, ctx, None).await {
            FetchOutcome::Items { items, pages } => {
                progress.record_pages(pages);
                if items.is_empty() {
                    info!(record_type = %record_type, "No items returned");
                } else {
                    let count = self.sink(strategy, &items).await?;
                    progress.record_sunk(record_type, count);

                    for child in record_type.children() {
                        let added = state.enqueue_children(child, strategy.extract_child_ids(&items));
                        debug!(
                            record_type = %child,
                            added,
                            pending = state.pending_len(child),
                            "Queued parent identifiers"
                        );
                    }
                }

                state.set_page(record_type, pages);
                state.mark_complete(record_type);
                self.store.save(state)?;
                info!(
                    record_type = %record_type,
                    items = items.len(),
                    pages,
                    "Record type complete"
                );
                Ok(Step::Continue)
            }
            FetchOutcome::RateLimited { delay_ms } => {
                self.suspend_rate_limited(state, delay_ms).await.map(Step::Stop)
            }
            FetchOutcome::Interrupted => self.suspend_timed_out(state).await.map(Step::Stop),
            FetchOutcome::Failed(source) => Err(ExtractError::Transport {
                record_type,
                source,
            }),
        }
    }

    async fn drain_children(
        &mut self,
        state: &mut ExtractionState,
        record_type: RecordType,
        ctx: &FetchContext,
        progress: &mut PassProgress,
    ) -> Result<Step, ExtractError> {
        let strategy = strategy_for(record_type);
        info!(
            record_type = %record_type,
            pending = state.pending_len(record_type),
            "Draining pending parent identifiers"
        );

        while state.pending_len(record_type) > 0 {
            if self.deadline.is_reached(self.clock.now_ms()) {
                return self.suspend_timed_out(state).await.map(Step::Stop);
            }

            let batch = match self.plan_batch(state).await? {
                Batch::Attempt(size) => size,
                Batch::Stop(outcome) => return Ok(Step::Stop(outcome)),
            };
            debug!(
                record_type = %record_type,
                batch,
                pending = state.pending_len(record_type),
                "Starting drain batch"
            );

            for _ in 0..batch {
                let Some(parent_id) = state.front_pending(record_type).map(str::to_string) else {
                    break;
                };

                match self.fetch_collection(strategy, ctx, Some(&parent_id)).await {
                    FetchOutcome::Items { mut items, pages } => {
                        progress.record_pages(pages);
                        if !items.is_empty() {
                            for item in &mut items {
                                strategy.annotate_child(item, &parent_id);
                            }
                            let count = self.sink(strategy, &items).await?;
                            progress.record_sunk(record_type, count);
                        }
                        state.pop_pending(record_type);
                    }
                    FetchOutcome::RateLimited { delay_ms } => {
                        debug!(
                            record_type = %record_type,
                            parent_id = %parent_id,
                            remaining = state.pending_len(record_type),
                            "Drain interrupted by rate limit"
                        );
                        return self.suspend_rate_limited(state, delay_ms).await.map(Step::Stop);
                    }
                    FetchOutcome::Interrupted => {
                        return self.suspend_timed_out(state).await.map(Step::Stop);
                    }
                    FetchOutcome::Failed(e) => {
                        warn!(
                            record_type = %record_type,
                            parent_id = %parent_id,
                            error = %e,
                            "Skipping parent after fetch error"
                        );
                        metrics::record_child_skipped(record_type.name());
                        progress.record_skipped();
                        state.pop_pending(record_type);
                    }
                }
            }
        }

        state.mark_complete(record_type);
        self.store.save(state)?;
        info!(
            record_type = %record_type,
            items = progress.items_sunk(record_type),
            "Dependent record type complete"
        );
        Ok(Step::Continue)
    }

    /// Number of identifiers to attempt before re-checking the quota
    ///
    /// Below the safety margin the pass sleeps until the window resets, unless
    /// the reset lies beyond the deadline; then it suspends with a Delay.
    async fn plan_batch(&mut self, state: &ExtractionState) -> Result<Batch, ExtractError> {
        let margin = self.config.drain_safety_margin;
        let remaining = self.rate_window.remaining_quota();
        if remaining > margin {
            return Ok(Batch::Attempt(remaining - margin));
        }

        info!(
            remaining,
            margin,
            "Remaining quota below safety margin, waiting for window reset"
        );
        loop {
            let wait_ms = self.rate_window.ms_until_reset();
            if wait_ms == 0 {
                break;
            }
            if let Some(left) = self.deadline.remaining_ms(self.clock.now_ms()) {
                if wait_ms >= left {
                    info!(wait_ms, left_ms = left, "Rate window resets after the deadline");
                    return self.suspend_rate_limited(state, wait_ms).await.map(Batch::Stop);
                }
            }

            debug!(wait_ms, "Sleeping until rate window reset");
            tokio::select! {
                biased;
                _ = self.deadline.wait_for_suspend() => {
                    return self.suspend_timed_out(state).await.map(Batch::Stop);
                }
                _ = self.clock.sleep_ms(wait_ms) => {}
            }
        }

        let refreshed = self.rate_window.remaining_quota();
        Ok(Batch::Attempt(refreshed.saturating_sub(margin).max(1)))
    }

    async fn fetch_collection(
        &mut self,
        strategy: &'static dyn RecordStrategy,
        ctx: &FetchContext,
        parent_id: Option<&str>,
    ) -> FetchOutcome {
        let source = Arc::clone(&self.source);
        let ctx = ctx.clone();
        let parent_id = parent_id.map(str::to_string);
        let page_size = self.config.page_size;
        let mut gate = PageGate::new(
            &mut self.rate_window,
            &self.deadline,
            page_size,
            self.config.max_pages,
        );

        PaginationHelper::fetch_all(
            &mut gate,
            move |page| {
                let request = strategy.page_request(&ctx, page, page_size, parent_id.as_deref());
                let source = Arc::clone(&source);
                async move { source.get_page(&request).await }.boxed()
            },
            |body| strategy.extract_items(body),
        )
        .await
    }

    async fn sink(&self, strategy: &dyn RecordStrategy, items: &[Value]) -> Result<usize, ExtractError> {
        let record_type = strategy.record_type();
        let name = strategy.sink_name();
        let repository = self
            .repositories
            .get(name)
            .ok_or_else(|| ExtractError::MissingRepository(name.to_string()))?;

        let count = repository
            .push(items)
            .await
            .map_err(|source| ExtractError::Sink {
                record_type,
                source,
            })?;
        metrics::record_items_sunk(record_type.name(), count);
        debug!(record_type = %record_type, count, "Batch sunk");
        Ok(count)
    }

    async fn suspend_rate_limited(
        &self,
        state: &ExtractionState,
        delay_ms: u64,
    ) -> Result<PassOutcome, ExtractError> {
        self.store.save(state)?;
        info!(delay_ms, "Suspending pass: rate limited");
        self.emit(Signal::Delay { delay_ms }).await?;
        Ok(PassOutcome::Suspended(SuspendReason::RateLimited { delay_ms }))
    }

    async fn suspend_timed_out(&self, state: &ExtractionState) -> Result<PassOutcome, ExtractError> {
        self.store.save(state)?;
        let percent = percent_complete(state);
        info!(percent_complete = percent, "Suspending pass: deadline reached");
        self.emit(Signal::Progress {
            percent_complete: percent,
        })
        .await?;
        Ok(PassOutcome::Suspended(SuspendReason::TimedOut))
    }

    async fn abort(
        &self,
        state: &ExtractionState,
        error: ExtractError,
    ) -> Result<PassOutcome, ExtractError> {
        let message = error.to_string();
        if error.persists_state() {
            if let Err(e) = self.store.save(state) {
                warn!(error = %e, "Failed to save checkpoint after fatal error");
            }
        }
        error!(error = %message, "Extraction pass aborted");
        self.emit(Signal::Error {
            message: message.clone(),
        })
        .await?;
        Ok(PassOutcome::Aborted { message })
    }

    async fn emit(&self, signal: Signal) -> Result<(), ExtractError> {
        self.emitter.emit(signal).await?;
        Ok(())
    }
}
