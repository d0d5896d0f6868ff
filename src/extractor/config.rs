//! Extraction configuration constants and settings

use std::time::Duration;

/// Items requested per page.
/// 100 is the largest `range` the project-management API accepts.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Requests allowed per rate window.
pub const DEFAULT_RATE_QUOTA: u32 = 100;

/// Rate window length in milliseconds (two minutes).
pub const DEFAULT_RATE_WINDOW_MS: u64 = 120_000;

/// Requests held back from each drain batch so a batch never ends on a rejection.
pub const DEFAULT_DRAIN_SAFETY_MARGIN: u32 = 5;

/// Maximum pages fetched for one collection before pagination is treated as runaway.
pub const MAX_PAGES_PER_FETCH: u32 = 10_000;

/// Delay reported when the server rate-limits without a retry-after hint.
pub const DEFAULT_RETRY_AFTER_MS: u64 = 60_000;

/// Tunables for one extraction pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractorConfig {
    /// Items per page request
    pub page_size: usize,
    /// Requests allowed per window
    pub rate_quota: u32,
    /// Window duration
    pub rate_window: Duration,
    /// Requests held back from each drain batch
    pub drain_safety_margin: u32,
    /// Runaway pagination guard
    pub max_pages: u32,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            rate_quota: DEFAULT_RATE_QUOTA,
            rate_window: Duration::from_millis(DEFAULT_RATE_WINDOW_MS),
            drain_safety_margin: DEFAULT_DRAIN_SAFETY_MARGIN,
            max_pages: MAX_PAGES_PER_FETCH,
        }
    }
}

impl ExtractorConfig {
    /// Set the page size
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Set the rate quota and window
    pub fn with_rate_limit(mut self, quota: u32, window: Duration) -> Self {
        self.rate_quota = quota;
        self.rate_window = window;
        self
    }

    /// Set the drain safety margin
    pub fn with_drain_safety_margin(mut self, margin: u32) -> Self {
        self.drain_safety_margin = margin;
        self
    }

    /// Set the runaway pagination guard
    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// Validate the settings
    pub fn validate(&self) -> Result<(), String> {
        if self.page_size == 0 {
            return Err("page size must be at least 1".to_string());
        }
        if self.rate_quota == 0 {
            return Err("rate quota must be at least 1".to_string());
        }
        if self.rate_window.is_zero() {
            return Err("rate window must be longer than 0 ms".to_string());
        }
        if self.drain_safety_margin >= self.rate_quota {
            return Err(format!(
                "drain safety margin ({}) must be below the rate quota ({})",
                self.drain_safety_margin, self.rate_quota
            ));
        }
        if self.max_pages == 0 {
            return Err("max pages must be at least 1".to_string());
        }
        Ok(())
    }
}
