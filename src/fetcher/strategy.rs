//! Per-record-type fetch strategies
//!
//! Each [`RecordType`] has one strategy describing how to address its pages,
//! where the item array lives in a response body, which identifiers its
//! children are fetched by, and how dependent items are annotated with their
//! parent. Strategies are selected through [`strategy_for`].

use crate::fetcher::{Collection, FetcherError, FetcherResult, PageRequest};
use crate::record::RecordType;
use crate::scope::SyncScope;
use serde_json::Value;

/// Inputs shared by every page request of one pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchContext {
    /// Portal and project
    pub scope: SyncScope,
    /// Incremental lower bound, when the pass is incremental
    pub modified_since: Option<String>,
}

/// How one record type is fetched
pub trait RecordStrategy: Send + Sync {
    /// Record type this strategy serves
    fn record_type(&self) -> RecordType;

    /// Request for one page; `parent_id` is set for dependent types
    fn page_request(
        &self,
        ctx: &FetchContext,
        page: u32,
        page_size: usize,
        parent_id: Option<&str>,
    ) -> PageRequest;

    /// Item array of a page body
    fn extract_items(&self, body: Value) -> FetcherResult<Vec<Value>>;

    /// Identifiers children of these items are fetched by
    fn extract_child_ids(&self, _items: &[Value]) -> Vec<String> {
        Vec::new()
    }

    /// Stamp a dependent item with its parent identifier
    fn annotate_child(&self, _item: &mut Value, _parent_id: &str) {}

    /// Repository the items are pushed to
    fn sink_name(&self) -> &'static str {
        self.record_type().sink_name()
    }
}

/// Strategy for a primary, paged list
#[derive(Debug)]
pub struct ListStrategy {
    record_type: RecordType,
    items_keys: &'static [&'static str],
    child_id_keys: &'static [&'static str],
    supports_modified_since: bool,
}

impl RecordStrategy for ListStrategy {
    fn record_type(&self) -> RecordType {
        self.record_type
    }

    fn page_request(
        &self,
        ctx: &FetchContext,
        page: u32,
        page_size: usize,
        _parent_id: Option<&str>,
    ) -> PageRequest {
        PageRequest {
            collection: Collection::Records(self.record_type),
            scope: ctx.scope.clone(),
            page,
            page_size,
            modified_since: if self.supports_modified_since {
                ctx.modified_since.clone()
            } else {
                None
            },
        }
    }

    fn extract_items(&self, body: Value) -> FetcherResult<Vec<Value>> {
        extract_array(body, self.items_keys)
    }

    fn extract_child_ids(&self, items: &[Value]) -> Vec<String> {
        if self.child_id_keys.is_empty() {
            return Vec::new();
        }
        items
            .iter()
            .filter_map(|item| first_id(item, self.child_id_keys))
            .collect()
    }
}

/// Strategy for comments fetched per parent record
#[derive(Debug)]
pub struct CommentStrategy {
    record_type: RecordType,
    parent_type: &'static str,
}

impl RecordStrategy for CommentStrategy {
    fn record_type(&self) -> RecordType {
        self.record_type
    }

    fn page_request(
        &self,
        ctx: &FetchContext,
        page: u32,
        page_size: usize,
        parent_id: Option<&str>,
    ) -> PageRequest {
        PageRequest {
            collection: Collection::Children {
                record_type: self.record_type,
                parent_id: parent_id.unwrap_or_default().to_string(),
            },
            scope: ctx.scope.clone(),
            page,
            page_size,
            modified_since: None,
        }
    }

    fn extract_items(&self, body: Value) -> FetcherResult<Vec<Value>> {
        extract_array(body, &["comments"])
    }

    fn annotate_child(&self, item: &mut Value, parent_id: &str) {
        if let Value::Object(map) = item {
            map.insert("parent_id".to_string(), Value::String(parent_id.to_string()));
            map.insert(
                "parent_type".to_string(),
                Value::String(self.parent_type.to_string()),
            );
        }
    }
}

static USERS: ListStrategy = ListStrategy {
    record_type: RecordType::Users,
    items_keys: &["users"],
    child_id_keys: &[],
    supports_modified_since: false,
};

static TASKS: ListStrategy = ListStrategy {
    record_type: RecordType::Tasks,
    items_keys: &["tasks"],
    child_id_keys: &["id_string", "id"],
    supports_modified_since: true,
};

static ISSUES: ListStrategy = ListStrategy {
    record_type: RecordType::Issues,
    items_keys: &["bugs", "issues"],
    child_id_keys: &["id_string", "id"],
    supports_modified_since: true,
};

static TASK_COMMENTS: CommentStrategy = CommentStrategy {
    record_type: RecordType::TaskComments,
    parent_type: "task",
};

static ISSUE_COMMENTS: CommentStrategy = CommentStrategy {
    record_type: RecordType::IssueComments,
    parent_type: "issue",
};

/// Strategy lookup table
pub fn strategy_for(record_type: RecordType) -> &'static dyn RecordStrategy {
    match record_type {
        RecordType::Users => &USERS,
        RecordType::Tasks => &TASKS,
        RecordType::Issues => &ISSUES,
        RecordType::TaskComments => &TASK_COMMENTS,
        RecordType::IssueComments => &ISSUE_COMMENTS,
    }
}

/// Item array of a project listing
pub fn extract_projects(body: Value) -> FetcherResult<Vec<Value>> {
    extract_array(body, &["projects"])
}

/// Render an identifier field as a string; numbers are accepted
pub fn id_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn first_id(item: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| item.get(key).and_then(id_to_string))
}

/// The source answers an empty list with no body or without the key at all.
fn extract_array(body: Value, keys: &[&str]) -> FetcherResult<Vec<Value>> {
    match body {
        Value::Null => Ok(Vec::new()),
        Value::Object(mut map) => {
            for key in keys {
                match map.remove(*key) {
                    Some(Value::Array(items)) => return Ok(items),
                    Some(Value::Null) | None => continue,
                    Some(other) => {
                        return Err(FetcherError::ParseError(format!(
                            "expected array under '{key}', got {}",
                            type_name(&other)
                        )))
                    }
                }
            }
            Ok(Vec::new())
        }
        other => Err(FetcherError::ParseError(format!(
            "expected JSON object, got {}",
            type_name(&other)
        ))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
