//! Record types synchronized from the project-management source
//!
//! The set of record types is closed. Declaration order is extraction order:
//! primary types first, then dependent types whose identifiers are collected
//! while their parent type is fetched.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of entity synchronized by an extraction pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    /// Portal users assigned to the project
    Users,
    /// Project tasks
    Tasks,
    /// Project issues (bugs)
    Issues,
    /// Comments attached to a task
    TaskComments,
    /// Comments attached to an issue
    IssueComments,
}

impl RecordType {
    /// Every record type in extraction order
    pub const ALL: [RecordType; 5] = [
        RecordType::Users,
        RecordType::Tasks,
        RecordType::Issues,
        RecordType::TaskComments,
        RecordType::IssueComments,
    ];

    /// Stable name used in checkpoints, logs and metrics
    pub fn name(&self) -> &'static str {
        match self {
            RecordType::Users => "users",
            RecordType::Tasks => "tasks",
            RecordType::Issues => "issues",
            RecordType::TaskComments => "task_comments",
            RecordType::IssueComments => "issue_comments",
        }
    }

    /// Parent type whose identifiers feed this type, if any
    pub fn parent(&self) -> Option<RecordType> {
        match self {
            RecordType::TaskComments => Some(RecordType::Tasks),
            RecordType::IssueComments => Some(RecordType::Issues),
            _ => None,
        }
    }

    /// Name of the repository items of this type are pushed to
    pub fn sink_name(&self) -> &'static str {
        self.name()
    }

    /// Whether this type is fetched per parent identifier
    pub fn is_dependent(&self) -> bool {
        self.parent().is_some()
    }

    /// Primary types in extraction order
    pub fn primaries() -> impl Iterator<Item = RecordType> {
        Self::ALL.into_iter().filter(|t| !t.is_dependent())
    }

    /// Dependent types in extraction order
    pub fn dependents() -> impl Iterator<Item = RecordType> {
        Self::ALL.into_iter().filter(|t| t.is_dependent())
    }

    /// Types that depend on this one
    pub fn children(&self) -> impl Iterator<Item = RecordType> {
        let parent = *self;
        Self::ALL
            .into_iter()
            .filter(move |t| t.parent() == Some(parent))
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RecordType {
    type Err = RecordTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.name() == s)
            .ok_or_else(|| RecordTypeError(s.to_string()))
    }
}

/// Unknown record type name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown record type: {0}")]
pub struct RecordTypeError(pub String);
