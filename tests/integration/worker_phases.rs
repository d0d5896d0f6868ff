//! Integration tests for event dispatch across worker phases

use crate::support::*;
use serde_json::json;
use std::sync::Arc;
use sync_extractor::event::{ExtractionEvent, SyncMode};
use sync_extractor::extractor::{InvocationDeadline, ManualClock, PassOutcome, SuspendReason};
use sync_extractor::record::RecordType;
use sync_extractor::signal::{RecordingEmitter, Signal};
use sync_extractor::sink::{MemoryRepository, RepositoryRegistry, METADATA_REPOSITORY};
use sync_extractor::scope::SyncScope;
use sync_extractor::state::{
    CheckpointStore, ExtractionState, FileCheckpointStore, MemoryCheckpointStore,
};
use sync_extractor::worker::Worker;
use tempfile::TempDir;

fn event(event_type: &str, project: &str) -> ExtractionEvent {
    ExtractionEvent::from_json(
        &json!({
            "event_type": event_type,
            "connection_data": { "key": "tok", "org_id": "7001", "org_name": "Acme" },
            "event_context": { "external_sync_unit_id": project, "mode": "full" }
        })
        .to_string(),
    )
    .unwrap()
}

#[tokio::test]
async fn test_sync_units_lists_projects() {
    let source = Arc::new(ScriptedSource::new().with_pages(
        "projects",
        vec![Ok(json!({
            "projects": [
                { "id_string": "1500", "name": "Website", "description": "Public site" },
                { "id": 1600, "name": "Mobile" },
                { "name": "no id" }
            ]
        }))],
    ));
    let emitter = Arc::new(RecordingEmitter::new());
    let worker = Worker::new(
        source.clone(),
        Arc::new(RepositoryRegistry::new()),
        emitter.clone(),
        Arc::new(MemoryCheckpointStore::new()),
    );

    let outcome = worker
        .handle(&event("EXTRACTION_EXTERNAL_SYNC_UNITS_START", ""))
        .await
        .unwrap();

    assert_eq!(outcome, PassOutcome::Done);
    assert_eq!(source.calls(), vec!["projects#1"]);
    match emitter.last() {
        Some(Signal::SyncUnitsDone { units }) => {
            let ids: Vec<_> = units.iter().map(|u| u.id.as_str()).collect();
            assert_eq!(ids, vec!["1500", "1600"]);
            assert_eq!(units[0].description, "Public site");
            assert_eq!(units[1].description, "Project Mobile");
        }
        other => panic!("expected SyncUnitsDone, got {other:?}"),
    }
}

#[tokio::test]
async fn test_sync_units_failure_is_reported_once() {
    let source = Arc::new(
        ScriptedSource::new().with_pages("projects", vec![api_error("Portal not found")]),
    );
    let emitter = Arc::new(RecordingEmitter::new());
    let worker = Worker::new(
        source,
        Arc::new(RepositoryRegistry::new()),
        emitter.clone(),
        Arc::new(MemoryCheckpointStore::new()),
    );

    let outcome = worker
        .handle(&event("EXTRACTION_EXTERNAL_SYNC_UNITS_START", ""))
        .await
        .unwrap();

    assert!(matches!(outcome, PassOutcome::Aborted { .. }));
    let signals = emitter.signals();
    assert_eq!(signals.len(), 1);
    assert!(matches!(&signals[0], Signal::SyncUnitsError { message } if message.contains("Portal not found")));
}

#[tokio::test]
async fn test_metadata_is_pushed_to_metadata_repository() {
    let repo = Arc::new(MemoryRepository::new(METADATA_REPOSITORY));
    let emitter = Arc::new(RecordingEmitter::new());
    let worker = Worker::new(
        Arc::new(ScriptedSource::new()),
        Arc::new(RepositoryRegistry::new().with(repo.clone())),
        emitter.clone(),
        Arc::new(MemoryCheckpointStore::new()),
    );

    let outcome = worker
        .handle(&event("EXTRACTION_METADATA_START", "1500"))
        .await
        .unwrap();

    assert_eq!(outcome, PassOutcome::Done);
    assert_eq!(emitter.signals(), vec![Signal::MetadataDone]);
    let items = repo.items();
    assert_eq!(items.len(), 1);
    assert!(items[0]["record_types"]["tasks"]["fields"]["owners"].is_object());
}

#[tokio::test]
async fn test_metadata_without_repository_fails() {
    let emitter = Arc::new(RecordingEmitter::new());
    let worker = Worker::new(
        Arc::new(ScriptedSource::new()),
        Arc::new(RepositoryRegistry::new()),
        emitter.clone(),
        Arc::new(MemoryCheckpointStore::new()),
    );

    worker
        .handle(&event("EXTRACTION_METADATA_START", "1500"))
        .await
        .unwrap();

    assert!(matches!(emitter.last(), Some(Signal::MetadataError { .. })));
}

#[tokio::test]
async fn test_missing_token_is_rejected() {
    let source = Arc::new(ScriptedSource::new());
    let emitter = Arc::new(RecordingEmitter::new());
    let worker = Worker::new(
        source.clone(),
        Arc::new(RepositoryRegistry::new()),
        emitter.clone(),
        Arc::new(MemoryCheckpointStore::new()),
    );
    let mut event = event("EXTRACTION_DATA_START", "1500");
    event.connection_data.key.clear();

    let outcome = worker.handle(&event).await.unwrap();

    assert!(matches!(outcome, PassOutcome::Aborted { .. }));
    assert_eq!(source.call_count(), 0);
    assert!(matches!(emitter.last(), Some(Signal::Error { .. })));
}

#[tokio::test]
async fn test_data_pass_writes_jsonl_and_checkpoint() {
    let temp = TempDir::new().unwrap();
    let out_dir = temp.path().join("out");
    let state_path = temp.path().join("state").join("checkpoint.json");

    let source = Arc::new(
        ScriptedSource::new()
            .with_pages("users", vec![users_page(&["u1"])])
            .with_pages("tasks", vec![tasks_page(&["A"])])
            .with_pages("task_comments/A", vec![comments_page(&["c1"])]),
    );
    let emitter = Arc::new(RecordingEmitter::new());
    let store = Arc::new(FileCheckpointStore::new(&state_path));
    let worker = Worker::new(
        source,
        Arc::new(RepositoryRegistry::jsonl(&out_dir).unwrap()),
        emitter.clone(),
        store.clone(),
    )
    .with_clock(ManualClock::new(T0).shared());

    let outcome = worker
        .handle(&event("EXTRACTION_DATA_START", "1500"))
        .await
        .unwrap();

    assert_eq!(outcome, PassOutcome::Done);
    assert_eq!(emitter.signals(), vec![Signal::Done]);

    let saved = store.load().unwrap().unwrap();
    assert!(saved.is_pass_complete());
    assert_eq!(saved.scope().to_string(), "7001/1500");

    let comments = std::fs::read_to_string(out_dir.join("task_comments.jsonl")).unwrap();
    let lines: Vec<serde_json::Value> = comments
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["id"], "c1");
    assert_eq!(lines[0]["data"]["parent_id"], "A");
    assert_eq!(lines[0]["created_date"], "1970-01-01T00:00:00Z");

    assert!(std::fs::read_to_string(out_dir.join("users.jsonl"))
        .unwrap()
        .contains("\"u1\""));
}

#[tokio::test]
async fn test_continue_keeps_checkpoint_scope() {
    let source = Arc::new(ScriptedSource::new());
    let emitter = Arc::new(RecordingEmitter::new());
    let mut state = sync_extractor::state::ExtractionState::new(
        sync_extractor::scope::SyncScope::new("7001", "1500"),
    );
    state.mark_complete(RecordType::Users);
    let store = Arc::new(MemoryCheckpointStore::with_state(state));
    let worker = Worker::new(
        source.clone(),
        Repositories::new().registry,
        emitter.clone(),
        store.clone(),
    )
    .with_clock(ManualClock::new(T0).shared());

    let mut event = event("EXTRACTION_DATA_CONTINUE", "9999");
    event.event_context.mode = SyncMode::Full;
    let outcome = worker.handle(&event).await.unwrap();

    assert_eq!(outcome, PassOutcome::Done);
    assert!(!source.calls().contains(&"users#1".to_string()));
    assert_eq!(store.snapshot().unwrap().scope().project_id(), "1500");
}

#[tokio::test]
async fn test_start_for_new_project_discards_previous_checkpoint() {
    let source = Arc::new(
        ScriptedSource::new().with_pages("tasks", vec![tasks_page(&["NEW-TASK"])]),
    );
    let emitter = Arc::new(RecordingEmitter::new());
    let mut previous = ExtractionState::new(SyncScope::new("7001", "1500"));
    for record_type in RecordType::ALL {
        previous.mark_complete(record_type);
    }
    previous.enqueue_children(RecordType::TaskComments, vec!["OLD-TASK".to_string()]);
    let store = Arc::new(MemoryCheckpointStore::with_state(previous));
    let worker = Worker::new(
        source.clone(),
        Repositories::new().registry,
        emitter.clone(),
        store.clone(),
    )
    .with_clock(ManualClock::new(T0).shared());

    let outcome = worker
        .handle(&event("EXTRACTION_DATA_START", "1600"))
        .await
        .unwrap();

    assert_eq!(outcome, PassOutcome::Done);
    assert_eq!(
        source.calls(),
        vec!["users#1", "tasks#1", "issues#1", "task_comments/NEW-TASK#1"]
    );
    let saved = store.snapshot().unwrap();
    assert_eq!(saved.scope().project_id(), "1600");
    assert!(saved.is_pass_complete());
}

#[tokio::test]
async fn test_expired_event_deadline_suspends_with_progress() {
    let source = Arc::new(ScriptedSource::new());
    let emitter = Arc::new(RecordingEmitter::new());
    let worker = Worker::new(
        source.clone(),
        Repositories::new().registry,
        emitter.clone(),
        Arc::new(MemoryCheckpointStore::new()),
    )
    .with_clock(ManualClock::new(T0).shared());
    let mut event = event("EXTRACTION_DATA_START", "1500");
    event.deadline_ms = Some(T0 - 1);

    let outcome = worker.handle(&event).await.unwrap();

    assert_eq!(outcome, PassOutcome::Suspended(SuspendReason::TimedOut));
    assert_eq!(source.call_count(), 0);
    assert_eq!(
        emitter.signals(),
        vec![Signal::Progress {
            percent_complete: 0
        }]
    );
}

#[tokio::test]
async fn test_event_deadline_tightens_worker_deadline() {
    let clock = ManualClock::new(T0);
    let source = Arc::new(
        ScriptedSource::new()
            .with_pages("users", vec![users_page(&["u1"])])
            .with_clock_step(clock.clone(), 1_000),
    );
    let emitter = Arc::new(RecordingEmitter::new());
    let worker = Worker::new(
        source.clone(),
        Repositories::new().registry,
        emitter.clone(),
        Arc::new(MemoryCheckpointStore::new()),
    )
    .with_clock(clock.shared())
    .with_deadline(InvocationDeadline::at(T0 + 60_000).into_shared());
    let mut event = event("EXTRACTION_DATA_START", "1500");
    event.deadline_ms = Some(T0 + 1_500);

    let outcome = worker.handle(&event).await.unwrap();

    assert_eq!(outcome, PassOutcome::Suspended(SuspendReason::TimedOut));
    assert_eq!(source.calls(), vec!["users#1", "tasks#1"]);
    assert!(matches!(emitter.last(), Some(Signal::Progress { .. })));
}
