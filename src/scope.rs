//! Sync scope parsing and validation
//!
//! A scope narrows the external source to one logical unit: a project inside
//! a portal. Its textual form is `PORTAL/PROJECT`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifiers narrowing the source to one portal project
///
/// # Examples
///
/// ```
/// use sync_extractor::scope::SyncScope;
///
/// let scope = SyncScope::parse("7001/1500").unwrap();
/// assert_eq!(scope.portal_id(), "7001");
/// assert_eq!(scope.project_id(), "1500");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncScope {
    #[serde(default)]
    portal_id: String,
    #[serde(default)]
    project_id: String,
}

impl SyncScope {
    /// Build a scope from its two identifiers; surrounding whitespace is trimmed
    pub fn new(portal_id: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            portal_id: portal_id.into().trim().to_string(),
            project_id: project_id.into().trim().to_string(),
        }
    }

    /// Parse `PORTAL/PROJECT`
    ///
    /// # Errors
    ///
    /// Returns an error if the separator is missing or either part is empty.
    pub fn parse(s: &str) -> Result<Self, ScopeError> {
        let (portal, project) = s.split_once('/').ok_or_else(|| {
            ScopeError::InvalidFormat("expected PORTAL/PROJECT".to_string())
        })?;
        if project.contains('/') {
            return Err(ScopeError::InvalidFormat(
                "expected exactly one '/' separator".to_string(),
            ));
        }

        let scope = Self::new(portal, project);
        scope.validate()?;
        Ok(scope)
    }

    /// Portal (organization) identifier
    pub fn portal_id(&self) -> &str {
        &self.portal_id
    }

    /// Project identifier
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// True when neither identifier is set
    pub fn is_empty(&self) -> bool {
        self.portal_id.is_empty() && self.project_id.is_empty()
    }

    /// Check that both identifiers are present
    pub fn validate(&self) -> Result<(), ScopeError> {
        if self.portal_id.is_empty() {
            return Err(ScopeError::MissingPortal);
        }
        if self.project_id.is_empty() {
            return Err(ScopeError::MissingProject);
        }
        Ok(())
    }

    /// Filesystem-safe rendering, used for default output locations
    pub fn to_filesystem_safe(&self) -> String {
        let clean = |s: &str| {
            s.chars()
                .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
                .collect::<String>()
        };
        format!("{}_{}", clean(&self.portal_id), clean(&self.project_id))
    }
}

impl fmt::Display for SyncScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.portal_id, self.project_id)
    }
}

/// Errors raised while building or validating a scope
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScopeError {
    /// Malformed textual scope
    #[error("invalid scope: {0}")]
    InvalidFormat(String),

    /// Portal identifier missing
    #[error("missing portal id in sync scope")]
    MissingPortal,

    /// Project identifier missing
    #[error("missing project id in sync scope")]
    MissingProject,
}
