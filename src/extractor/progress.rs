//! Progress accounting for extraction passes.
//!
//! [`percent_complete`] estimates pass completion from the checkpoint for
//! Progress signals. [`PassProgress`] counts what one invocation did and
//! formats the summary line logged when it ends.

use crate::record::RecordType;
use crate::state::ExtractionState;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Estimated completion of the pass recorded in `state`.
///
/// Each record type weighs the same. A suspended pass never reports 100.
pub fn percent_complete(state: &ExtractionState) -> u8 {
    let total = RecordType::ALL.len();
    let done = state.completed_type_count();
    let percent = (done * 100 / total) as u8;
    if state.is_pass_complete() {
        100
    } else {
        percent.min(99)
    }
}

/// Counters for one invocation.
#[derive(Debug, Clone)]
pub struct PassProgress {
    items_sunk: BTreeMap<RecordType, u64>,
    pages_fetched: u64,
    children_skipped: u64,
    start_time: Instant,
}

impl Default for PassProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl PassProgress {
    /// Start counting now.
    pub fn new() -> Self {
        Self {
            items_sunk: BTreeMap::new(),
            pages_fetched: 0,
            children_skipped: 0,
            start_time: Instant::now(),
        }
    }

    /// Record a sunk batch.
    pub fn record_sunk(&mut self, record_type: RecordType, count: usize) {
        *self.items_sunk.entry(record_type).or_default() += count as u64;
    }

    /// Record fetched pages.
    pub fn record_pages(&mut self, pages: u32) {
        self.pages_fetched += u64::from(pages);
    }

    /// Record a skipped parent identifier.
    pub fn record_skipped(&mut self) {
        self.children_skipped += 1;
    }

    /// Items sunk for one type.
    pub fn items_sunk(&self, record_type: RecordType) -> u64 {
        self.items_sunk.get(&record_type).copied().unwrap_or(0)
    }

    /// Items sunk across all types.
    pub fn total_items(&self) -> u64 {
        self.items_sunk.values().sum()
    }

    /// Pages fetched.
    pub fn pages_fetched(&self) -> u64 {
        self.pages_fetched
    }

    /// Parent identifiers skipped after a fetch error.
    pub fn children_skipped(&self) -> u64 {
        self.children_skipped
    }

    /// Time since the invocation started.
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// One-line summary, e.g. `42 items (tasks: 40, users: 2) from 3 pages in 1.2s`.
    pub fn format_summary(&self) -> String {
        let per_type = self
            .items_sunk
            .iter()
            .map(|(t, n)| format!("{t}: {n}"))
            .collect::<Vec<_>>()
            .join(", ");
        let mut summary = format!("{} items", self.total_items());
        if !per_type.is_empty() {
            summary.push_str(&format!(" ({per_type})"));
        }
        summary.push_str(&format!(
            " from {} pages in {:.1}s",
            self.pages_fetched,
            self.elapsed().as_secs_f64()
        ));
        if self.children_skipped > 0 {
            summary.push_str(&format!(", {} parents skipped", self.children_skipped));
        }
        summary
    }
}
