//! Field mapping from source records to normalized items

use super::{NormalizeFn, NormalizedItem};
use crate::fetcher::strategy::id_to_string;
use crate::record::RecordType;
use serde_json::{json, Value};

/// Date used when the source omits one
pub const DEFAULT_DATE: &str = "1970-01-01T00:00:00Z";

/// Normalizer for a record type's repository
pub fn normalizer_for(record_type: RecordType) -> NormalizeFn {
    match record_type {
        RecordType::Users => normalize_user,
        RecordType::Tasks => normalize_task,
        RecordType::Issues => normalize_issue,
        RecordType::TaskComments | RecordType::IssueComments => normalize_comment,
    }
}

/// Flatten `<div>` wrappers into newlines
pub fn transform_html_content(content: Option<&str>) -> Option<String> {
    let content = content.filter(|c| !c.is_empty())?;
    Some(
        content
            .replace("<div>", "")
            .replace("</div>", "\n")
            .trim()
            .to_string(),
    )
}

fn required_id(item: &Value) -> Result<String, String> {
    ["id_string", "id"]
        .iter()
        .find_map(|key| item.get(key).and_then(id_to_string))
        .ok_or_else(|| "missing id".to_string())
}

fn date(item: &Value, keys: &[&str]) -> String {
    keys.iter()
        .find_map(|key| item.get(key).and_then(Value::as_str).filter(|s| !s.is_empty()))
        .unwrap_or(DEFAULT_DATE)
        .to_string()
}

fn field(item: &Value, key: &str) -> Value {
    item.get(key).cloned().unwrap_or(Value::Null)
}

fn nested(item: &Value, pointer: &str) -> Value {
    item.pointer(pointer).cloned().unwrap_or(Value::Null)
}

fn rich_text(item: &Value, key: &str) -> Value {
    json!([transform_html_content(item.get(key).and_then(Value::as_str))])
}

/// Users carry no timestamps
pub fn normalize_user(item: &Value) -> Result<NormalizedItem, String> {
    Ok(NormalizedItem {
        id: required_id(item)?,
        created_date: DEFAULT_DATE.to_string(),
        modified_date: DEFAULT_DATE.to_string(),
        data: json!({
            "name": field(item, "name"),
            "email": field(item, "email"),
            "profile_type": field(item, "profile_type"),
            "role": field(item, "role"),
            "active": field(item, "active"),
        }),
    })
}

/// Normalize a task; description HTML is flattened
pub fn normalize_task(item: &Value) -> Result<NormalizedItem, String> {
    Ok(NormalizedItem {
        id: required_id(item)?,
        created_date: date(item, &["created_time"]),
        modified_date: date(item, &["last_updated_time"]),
        data: json!({
            "name": field(item, "name"),
            "description": rich_text(item, "description"),
            "status": nested(item, "/status/type"),
            "status_id": nested(item, "/status/id"),
            "status_name": nested(item, "/status/name"),
            "priority": field(item, "priority"),
            "created_by": field(item, "created_by"),
            "percent_complete": field(item, "percent_complete"),
        }),
    })
}

/// Normalize an issue (bug)
pub fn normalize_issue(item: &Value) -> Result<NormalizedItem, String> {
    Ok(NormalizedItem {
        id: required_id(item)?,
        created_date: date(item, &["created_time"]),
        modified_date: date(item, &["updated_time"]),
        data: json!({
            "title": field(item, "title"),
            "description": rich_text(item, "description"),
            "bug_number": field(item, "bug_number"),
            "status": nested(item, "/status/type"),
            "status_id": nested(item, "/status/id"),
            "severity": nested(item, "/severity/type"),
            "severity_id": nested(item, "/severity/id"),
            "reporter_id": field(item, "reporter_id"),
            "assignee_id": field(item, "assignee_zpuid"),
        }),
    })
}

/// Comments keep the parent annotation added before sinking
pub fn normalize_comment(item: &Value) -> Result<NormalizedItem, String> {
    Ok(NormalizedItem {
        id: required_id(item)?,
        created_date: date(item, &["created_time"]),
        modified_date: date(item, &["last_modified_time", "created_time"]),
        data: json!({
            "content": rich_text(item, "content"),
            "added_by": field(item, "added_by"),
            "parent_id": field(item, "parent_id"),
            "parent_type": field(item, "parent_type"),
        }),
    })
}
