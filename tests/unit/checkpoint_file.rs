//! Unit tests for the on-disk checkpoint layout

use chrono::{TimeZone, Utc};
use sync_extractor::record::RecordType;
use sync_extractor::scope::SyncScope;
use sync_extractor::state::{CheckpointStore, ExtractionState, FileCheckpointStore};
use tempfile::TempDir;

#[test]
fn test_checkpoint_file_layout() {
    let temp = TempDir::new().unwrap();
    let store = FileCheckpointStore::new(temp.path().join("checkpoint.json"));

    let mut state = ExtractionState::new(SyncScope::new("7001", "1500"));
    state.start_pass(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap());
    state.mark_complete(RecordType::Tasks);
    state.set_page(RecordType::Tasks, 3);
    state.enqueue_children(RecordType::TaskComments, vec!["A".to_string(), "B".to_string()]);
    store.save(&state).unwrap();

    let raw = std::fs::read_to_string(store.path()).unwrap();
    let json: serde_json::Value = serde_json::from_str(&raw).unwrap();

    assert_eq!(json["schema_version"], "1.0.0");
    assert_eq!(json["per_type"]["tasks"]["complete"], true);
    assert_eq!(json["per_type"]["tasks"]["page"], 3);
    assert_eq!(json["per_type"]["users"]["page"], 1);
    assert_eq!(json["pending_child_ids"]["task_comments"], serde_json::json!(["A", "B"]));
    assert!(json["last_successful_sync_started"].is_null());
    assert_eq!(json["scope"]["portal_id"], "7001");

    assert_eq!(store.load().unwrap(), Some(state));
}

#[test]
fn test_save_replaces_checkpoint_without_leftovers() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("checkpoint.json");
    let store = FileCheckpointStore::new(&path);

    let mut state = ExtractionState::new(SyncScope::new("7001", "1500"));
    store.save(&state).unwrap();
    state.mark_complete(RecordType::Users);
    store.save(&state).unwrap();

    // only the checkpoint itself remains in the directory
    let entries: Vec<_> = std::fs::read_dir(temp.path())
        .unwrap()
        .filter_map(Result::ok)
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| !name.ends_with(".lock"))
        .collect();
    assert_eq!(entries, vec!["checkpoint.json"]);
    assert!(store.load().unwrap().unwrap().is_complete(RecordType::Users));
}
