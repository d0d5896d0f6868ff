//! Integration tests for rate-limit and deadline suspension

use crate::support::*;
use std::sync::Arc;
use std::time::Duration;
use sync_extractor::event::SyncMode;
use sync_extractor::extractor::{
    Clock, ExtractionOrchestrator, ExtractorConfig, InvocationDeadline, ManualClock, PassEntry,
    PassOutcome, SuspendReason,
};
use sync_extractor::record::RecordType;
use sync_extractor::scope::SyncScope;
use sync_extractor::signal::{RecordingEmitter, Signal};
use sync_extractor::state::{CheckpointStore, ExtractionState, MemoryCheckpointStore};

const WINDOW_MS: u64 = 120_000;

struct Harness {
    repos: Repositories,
    emitter: Arc<RecordingEmitter>,
    store: Arc<MemoryCheckpointStore>,
    clock: ManualClock,
}

impl Harness {
    fn new() -> Self {
        Self {
            repos: Repositories::new(),
            emitter: Arc::new(RecordingEmitter::new()),
            store: Arc::new(MemoryCheckpointStore::new()),
            clock: ManualClock::new(T0),
        }
    }

    fn orchestrator(&self, source: &Arc<ScriptedSource>, config: ExtractorConfig) -> ExtractionOrchestrator {
        ExtractionOrchestrator::new(
            source.clone(),
            self.repos.registry.clone(),
            self.emitter.clone(),
            self.store.clone(),
        )
        .with_clock(self.clock.shared())
        .with_config(config)
    }
}

fn config(quota: u32, margin: u32) -> ExtractorConfig {
    ExtractorConfig::default()
        .with_rate_limit(quota, Duration::from_millis(WINDOW_MS))
        .with_drain_safety_margin(margin)
}

#[tokio::test]
async fn test_rejection_mid_type_sinks_nothing() {
    let h = Harness::new();
    let source = Arc::new(ScriptedSource::new().with_pages(
        "users",
        vec![
            users_page(&["u1", "u2"]),
            users_page(&["u3", "u4"]),
            users_page(&["u5", "u6"]),
            users_page(&["u7", "u8"]),
            users_page(&["u9"]),
        ],
    ));
    let mut state = ExtractionState::new(SyncScope::new("7001", "1500"));

    let report = h
        .orchestrator(&source, config(2, 1).with_page_size(2))
        .run(&mut state, PassEntry::Start(SyncMode::Full))
        .await
        .unwrap();

    assert_eq!(
        report.outcome,
        PassOutcome::Suspended(SuspendReason::RateLimited { delay_ms: WINDOW_MS })
    );
    assert_eq!(source.calls(), vec!["users#1", "users#2"]);
    assert!(h.repos.repo(RecordType::Users).items().is_empty());
    assert_eq!(h.repos.repo(RecordType::Users).push_count(), 0);
    assert_eq!(state.page(RecordType::Users), 1);
    assert!(!state.is_complete(RecordType::Users));
    assert_eq!(h.emitter.signals(), vec![Signal::Delay { delay_ms: WINDOW_MS }]);
    assert_eq!(h.store.snapshot(), Some(state));
}

#[tokio::test]
async fn test_server_rate_limit_reports_retry_after() {
    let h = Harness::new();
    let source = Arc::new(
        ScriptedSource::new()
            .with_pages("users", vec![users_page(&["u1"])])
            .with_pages("tasks", vec![server_rate_limited(45_000)]),
    );
    let mut state = ExtractionState::new(SyncScope::new("7001", "1500"));

    let report = h
        .orchestrator(&source, ExtractorConfig::default())
        .run(&mut state, PassEntry::Start(SyncMode::Full))
        .await
        .unwrap();

    assert_eq!(
        report.outcome,
        PassOutcome::Suspended(SuspendReason::RateLimited { delay_ms: 45_000 })
    );
    assert!(state.is_complete(RecordType::Users));
    assert!(!state.is_complete(RecordType::Tasks));
    assert_eq!(h.emitter.signals(), vec![Signal::Delay { delay_ms: 45_000 }]);
}

#[tokio::test]
async fn test_interrupted_drain_resumes_with_exact_remainder() {
    let h = Harness::new();
    let first = Arc::new(
        ScriptedSource::new()
            .with_pages("tasks", vec![tasks_page(&["A", "B", "C", "D"])])
            .with_pages("task_comments/A", vec![comments_page(&["a1"])])
            .with_pages("task_comments/B", vec![comments_page(&["b1"])]),
    );
    let mut state = ExtractionState::new(SyncScope::new("7001", "1500"));
    let deadline = InvocationDeadline::at(T0 + 1_000).into_shared();

    // users, tasks and issues use 3 of 6 requests; the first batch is 6 - 3 - 1 = 2
    let report = h
        .orchestrator(&first, config(6, 1))
        .with_deadline(deadline)
        .run(&mut state, PassEntry::Start(SyncMode::Full))
        .await
        .unwrap();

    assert_eq!(
        report.outcome,
        PassOutcome::Suspended(SuspendReason::RateLimited { delay_ms: WINDOW_MS })
    );
    let saved = h.store.snapshot().unwrap();
    assert_eq!(
        saved.pending(RecordType::TaskComments).collect::<Vec<_>>(),
        vec!["C", "D"]
    );
    assert!(saved.is_complete(RecordType::Tasks));
    assert!(!saved.is_complete(RecordType::TaskComments));
    assert_eq!(h.repos.ids(RecordType::TaskComments), vec!["a1", "b1"]);
    assert_eq!(h.emitter.signals(), vec![Signal::Delay { delay_ms: WINDOW_MS }]);

    // next invocation: fresh tracker, state reloaded from the store
    h.clock.advance(WINDOW_MS);
    let second = Arc::new(
        ScriptedSource::new()
            .with_pages("task_comments/C", vec![comments_page(&["c1"])])
            .with_pages("task_comments/D", vec![comments_page(&["d1"])]),
    );
    let mut resumed = h.store.load().unwrap().unwrap();
    let report = h
        .orchestrator(&second, config(6, 1))
        .run(&mut resumed, PassEntry::Continue(SyncMode::Full))
        .await
        .unwrap();

    assert_eq!(report.outcome, PassOutcome::Done);
    assert_eq!(second.calls(), vec!["task_comments/C#1", "task_comments/D#1"]);
    assert_eq!(h.repos.ids(RecordType::TaskComments), vec!["a1", "b1", "c1", "d1"]);
    assert!(resumed.is_pass_complete());
    assert_eq!(h.emitter.last(), Some(Signal::Done));
}

#[tokio::test]
async fn test_drain_waits_for_window_when_deadline_allows() {
    let h = Harness::new();
    let source = Arc::new(
        ScriptedSource::new().with_pages("tasks", vec![tasks_page(&["A", "B", "C", "D"])]),
    );
    let mut state = ExtractionState::new(SyncScope::new("7001", "1500"));

    let report = h
        .orchestrator(&source, config(6, 1))
        .run(&mut state, PassEntry::Start(SyncMode::Full))
        .await
        .unwrap();

    assert_eq!(report.outcome, PassOutcome::Done);
    assert_eq!(source.call_count(), 3 + 4);
    assert!(h.clock.now_ms() >= T0 + WINDOW_MS);
    assert_eq!(h.emitter.signals(), vec![Signal::Done]);
}

#[tokio::test]
async fn test_child_rate_limit_keeps_identifier_at_front() {
    let h = Harness::new();
    let source = Arc::new(
        ScriptedSource::new()
            .with_pages("tasks", vec![tasks_page(&["A", "B", "C"])])
            .with_pages("task_comments/A", vec![comments_page(&["a1"])])
            .with_pages("task_comments/B", vec![server_rate_limited(30_000)]),
    );
    let mut state = ExtractionState::new(SyncScope::new("7001", "1500"));

    let report = h
        .orchestrator(&source, ExtractorConfig::default())
        .run(&mut state, PassEntry::Start(SyncMode::Full))
        .await
        .unwrap();

    assert_eq!(
        report.outcome,
        PassOutcome::Suspended(SuspendReason::RateLimited { delay_ms: 30_000 })
    );
    assert_eq!(
        state.pending(RecordType::TaskComments).collect::<Vec<_>>(),
        vec!["B", "C"]
    );
    assert_eq!(h.repos.ids(RecordType::TaskComments), vec!["a1"]);
}

#[tokio::test]
async fn test_deadline_suspends_with_progress() {
    let h = Harness::new();
    let source = Arc::new(
        ScriptedSource::new()
            .with_pages("tasks", vec![tasks_page(&["A"])])
            .with_clock_step(h.clock.clone(), 1_000),
    );
    let mut state = ExtractionState::new(SyncScope::new("7001", "1500"));
    let deadline = InvocationDeadline::at(T0 + 2_500).into_shared();

    let report = h
        .orchestrator(&source, ExtractorConfig::default())
        .with_deadline(deadline)
        .run(&mut state, PassEntry::Start(SyncMode::Full))
        .await
        .unwrap();

    assert_eq!(report.outcome, PassOutcome::Suspended(SuspendReason::TimedOut));
    assert_eq!(source.calls(), vec!["users#1", "tasks#1", "issues#1"]);
    assert_eq!(
        h.emitter.signals(),
        vec![Signal::Progress {
            percent_complete: 60
        }]
    );
    let saved = h.store.snapshot().unwrap();
    assert_eq!(saved.completed_type_count(), 3);
    assert_eq!(saved.pending(RecordType::TaskComments).collect::<Vec<_>>(), vec!["A"]);
}

#[tokio::test]
async fn test_suspend_request_stops_before_first_request() {
    let h = Harness::new();
    let source = Arc::new(ScriptedSource::new());
    let mut state = ExtractionState::new(SyncScope::new("7001", "1500"));
    let deadline = InvocationDeadline::unbounded().into_shared();
    deadline.request_suspend();

    let report = h
        .orchestrator(&source, ExtractorConfig::default())
        .with_deadline(deadline)
        .run(&mut state, PassEntry::Start(SyncMode::Full))
        .await
        .unwrap();

    assert_eq!(report.outcome, PassOutcome::Suspended(SuspendReason::TimedOut));
    assert_eq!(source.call_count(), 0);
    assert_eq!(
        h.emitter.signals(),
        vec![Signal::Progress {
            percent_complete: 0
        }]
    );
    assert!(state.last_sync_started().is_some());
}
