//! Paginated fetcher
//!
//! Requests fixed-size pages starting at page 1 until a short or empty page,
//! consulting the rate window before every request. The accumulated set is
//! returned only on success; a rejection, a server rate limit or an error
//! discards everything fetched so far.
//!
//! Includes safety mechanisms:
//! - Maximum page limit to stop runaway pagination
//! - Deadline check before every request

use crate::extractor::deadline::InvocationDeadline;
use crate::extractor::rate_limit::{Admission, RateWindow};
use crate::fetcher::{FetcherError, FetcherResult};
use crate::metrics;
use futures_util::future::BoxFuture;
use serde_json::Value;
use tracing::debug;

/// Boxed future resolving to one raw page body
pub type PageFuture = BoxFuture<'static, FetcherResult<Value>>;

/// Outcome of fetching a whole collection
#[derive(Debug)]
pub enum FetchOutcome {
    /// Every page was fetched
    Items {
        /// Items across all pages, in page order
        items: Vec<Value>,
        /// Number of pages requested
        pages: u32,
    },
    /// The local window or the server refused a request
    RateLimited {
        /// Milliseconds to wait before retrying
        delay_ms: u64,
    },
    /// The invocation deadline was reached before the next request
    Interrupted,
    /// Any other failure
    Failed(FetcherError),
}

/// Per-fetch gate: rate window, deadline and paging limits
pub struct PageGate<'a> {
    rate_window: &'a mut RateWindow,
    deadline: &'a InvocationDeadline,
    page_size: usize,
    max_pages: u32,
}

impl<'a> PageGate<'a> {
    /// Create a gate
    ///
    /// # Arguments
    /// * `rate_window` - Window consulted before every request
    /// * `deadline` - Invocation deadline checked before every request
    /// * `page_size` - Requested items per page; a shorter page ends the fetch
    /// * `max_pages` - Runaway pagination guard
    pub fn new(
        rate_window: &'a mut RateWindow,
        deadline: &'a InvocationDeadline,
        page_size: usize,
        max_pages: u32,
    ) -> Self {
        Self {
            rate_window,
            deadline,
            page_size,
            max_pages,
        }
    }

    /// Items requested per page
    pub fn page_size(&self) -> usize {
        self.page_size
    }
}

/// Pagination helper
pub struct PaginationHelper;

impl PaginationHelper {
    /// Fetch every page of one collection
    ///
    /// # Arguments
    /// * `gate` - Rate window, deadline and limits
    /// * `page_fn` - Builds the request future for a 1-based page number
    /// * `extract_fn` - Pulls the item array out of a page body
    ///
    /// # Returns
    /// [`FetchOutcome::Items`] with the full accumulated set, or the reason
    /// the fetch stopped early.
    pub async fn fetch_all<P, E>(gate: &mut PageGate<'_>, mut page_fn: P, extract_fn: E) -> FetchOutcome
    where
        P: FnMut(u32) -> PageFuture,
        E: Fn(Value) -> FetcherResult<Vec<Value>>,
    {
        let mut accumulated = Vec::new();
        let mut page: u32 = 1;

        loop {
            if page > gate.max_pages {
                return FetchOutcome::Failed(FetcherError::MaxPagesExceeded(gate.max_pages));
            }

            if gate.deadline.is_reached(gate.rate_window.now_ms()) {
                debug!(page, discarded = accumulated.len(), "Deadline reached before page request");
                return FetchOutcome::Interrupted;
            }

            if let Admission::Rejected {
                remaining_cooldown_ms,
            } = gate.rate_window.attempt()
            {
                metrics::record_rate_rejection();
                debug!(
                    page,
                    delay_ms = remaining_cooldown_ms,
                    discarded = accumulated.len(),
                    "Page request rejected by rate window"
                );
                return FetchOutcome::RateLimited {
                    delay_ms: remaining_cooldown_ms,
                };
            }
            metrics::record_rate_remaining(gate.rate_window.remaining_quota());

            let body = match page_fn(page).await {
                Ok(body) => body,
                Err(FetcherError::RateLimited { retry_after_ms }) => {
                    debug!(page, retry_after_ms, "Server rate-limited page request");
                    return FetchOutcome::RateLimited {
                        delay_ms: retry_after_ms,
                    };
                }
                Err(e) => return FetchOutcome::Failed(e),
            };

            let items = match extract_fn(body) {
                Ok(items) => items,
                Err(e) => return FetchOutcome::Failed(e),
            };

            let received = items.len();
            accumulated.extend(items);
            debug!(page, received, total = accumulated.len(), "Received page");

            if received < gate.page_size {
                return FetchOutcome::Items {
                    items: accumulated,
                    pages: page,
                };
            }
            page += 1;
        }
    }
}
