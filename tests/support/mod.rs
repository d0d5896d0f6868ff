//! Scripted source, repositories and fixtures shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use sync_extractor::extractor::ManualClock;
use sync_extractor::fetcher::{FetcherError, FetcherResult, PageRequest, SourceClient};
use sync_extractor::record::RecordType;
use sync_extractor::sink::{MemoryRepository, RepositoryRegistry};

/// Unix milliseconds every scripted test starts at (2023-11-14T22:13:20Z)
pub const T0: u64 = 1_700_000_000_000;

/// Source replaying scripted pages per collection label
///
/// Unscripted requests (and scripted collections that ran out of pages)
/// answer with an empty body.
#[derive(Default)]
pub struct ScriptedSource {
    pages: Mutex<HashMap<String, VecDeque<FetcherResult<Value>>>>,
    calls: Arc<Mutex<Vec<String>>>,
    modified_since: Mutex<Vec<(String, Option<String>)>>,
    clock_step: Option<(ManualClock, u64)>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the pages returned for `label` (e.g. "tasks" or "task_comments/A")
    pub fn with_pages(self, label: &str, pages: Vec<FetcherResult<Value>>) -> Self {
        self.pages
            .lock()
            .unwrap()
            .insert(label.to_string(), pages.into_iter().collect());
        self
    }

    /// Advance `clock` by `step_ms` on every request
    pub fn with_clock_step(mut self, clock: ManualClock, step_ms: u64) -> Self {
        self.clock_step = Some((clock, step_ms));
        self
    }

    /// Requests made, as "label#page"
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Modified-since filter sent with each request, by label
    pub fn modified_since_seen(&self) -> Vec<(String, Option<String>)> {
        self.modified_since.lock().unwrap().clone()
    }
}

#[async_trait]
impl SourceClient for ScriptedSource {
    async fn get_page(&self, request: &PageRequest) -> FetcherResult<Value> {
        let label = request.collection.label();
        self.calls
            .lock()
            .unwrap()
            .push(format!("{label}#{}", request.page));
        self.modified_since
            .lock()
            .unwrap()
            .push((label.clone(), request.modified_since.clone()));

        if let Some((clock, step)) = &self.clock_step {
            clock.advance(*step);
        }

        self.pages
            .lock()
            .unwrap()
            .get_mut(&label)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Ok(Value::Null))
    }
}

/// Memory repositories for every record type, keyed for assertions
pub struct Repositories {
    pub registry: Arc<RepositoryRegistry>,
    pub by_type: BTreeMap<RecordType, Arc<MemoryRepository>>,
}

impl Repositories {
    pub fn new() -> Self {
        let mut registry = RepositoryRegistry::new();
        let mut by_type = BTreeMap::new();
        for record_type in RecordType::ALL {
            let repo = Arc::new(MemoryRepository::new(record_type.sink_name()));
            registry.register(repo.clone());
            by_type.insert(record_type, repo);
        }
        Self {
            registry: Arc::new(registry),
            by_type,
        }
    }

    pub fn repo(&self, record_type: RecordType) -> &Arc<MemoryRepository> {
        &self.by_type[&record_type]
    }

    /// Ids of every item pushed for `record_type`, in push order
    pub fn ids(&self, record_type: RecordType) -> Vec<String> {
        self.repo(record_type)
            .items()
            .iter()
            .filter_map(|item| item["id"].as_str().map(str::to_string))
            .collect()
    }
}

pub fn users_page(ids: &[&str]) -> FetcherResult<Value> {
    Ok(json!({
        "users": ids.iter().map(|id| json!({ "id": id, "name": format!("user {id}") })).collect::<Vec<_>>()
    }))
}

pub fn tasks_page(ids: &[&str]) -> FetcherResult<Value> {
    Ok(json!({
        "tasks": ids.iter().map(|id| json!({ "id": id, "id_string": id, "name": format!("task {id}") })).collect::<Vec<_>>()
    }))
}

pub fn issues_page(ids: &[&str]) -> FetcherResult<Value> {
    Ok(json!({
        "bugs": ids.iter().map(|id| json!({ "id": id, "id_string": id, "title": format!("issue {id}") })).collect::<Vec<_>>()
    }))
}

pub fn comments_page(ids: &[&str]) -> FetcherResult<Value> {
    Ok(json!({
        "comments": ids.iter().map(|id| json!({ "id": id, "content": "<div>hi</div>" })).collect::<Vec<_>>()
    }))
}

pub fn server_rate_limited(retry_after_ms: u64) -> FetcherResult<Value> {
    Err(FetcherError::RateLimited { retry_after_ms })
}

pub fn api_error(message: &str) -> FetcherResult<Value> {
    Err(FetcherError::ApiError(message.to_string()))
}
