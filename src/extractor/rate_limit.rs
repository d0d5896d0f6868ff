//! Rolling request window with a latched cooldown
//!
//! Counts outbound requests against a fixed quota. Reaching the quota latches a
//! cooldown of one full window; attempts during the cooldown are rejected with
//! the exact remaining milliseconds and never reach the network.
//!
//! The tracker is process-local and deliberately not persisted: every
//! invocation starts cold.

use async_trait::async_trait;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Source of wall-clock milliseconds and cooperative sleeping
#[async_trait]
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current time in Unix milliseconds
    fn now_ms(&self) -> u64;

    /// Sleep for `ms` milliseconds
    async fn sleep_ms(&self, ms: u64);
}

/// Shared handle to a clock
pub type SharedClock = Arc<dyn Clock>;

/// Wall clock backed by chrono and tokio timers
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl SystemClock {
    /// Shared system clock
    pub fn shared() -> SharedClock {
        Arc::new(SystemClock)
    }
}

#[async_trait]
impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        chrono::Utc::now().timestamp_millis().max(0) as u64
    }

    async fn sleep_ms(&self, ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}

/// Manually driven clock; sleeping advances time instantly
#[derive(Debug, Default, Clone)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    /// Clock starting at `start_ms`
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start_ms)),
        }
    }

    /// Move time forward
    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }

    /// Jump to an absolute time
    pub fn set(&self, ms: u64) {
        self.now.store(ms, Ordering::SeqCst);
    }

    /// Shared handle over the same underlying time
    pub fn shared(&self) -> SharedClock {
        Arc::new(self.clone())
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }

    async fn sleep_ms(&self, ms: u64) {
        self.advance(ms);
        tokio::task::yield_now().await;
    }
}

/// Result of asking the window for permission to send one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The request may be sent
    Allowed,
    /// The quota is spent; retry after the cooldown
    Rejected {
        /// Milliseconds until the cooldown ends
        remaining_cooldown_ms: u64,
    },
}

impl Admission {
    /// Whether the attempt was allowed
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed)
    }
}

/// Request counter for one rolling window
pub struct RateWindow {
    quota: u32,
    window_ms: u64,
    request_count: u32,
    window_start_ms: u64,
    cooldown_until_ms: Option<u64>,
    clock: SharedClock,
}

impl RateWindow {
    /// Create a window allowing `quota` requests per `window`
    ///
    /// # Arguments
    /// * `quota` - Maximum requests per window (a zero quota is treated as one)
    /// * `window` - Window duration; also the cooldown length once the quota is hit
    /// * `clock` - Time source
    pub fn new(quota: u32, window: Duration, clock: SharedClock) -> Self {
        let window_start_ms = clock.now_ms();
        Self {
            quota: quota.max(1),
            window_ms: window.as_millis() as u64,
            request_count: 0,
            window_start_ms,
            cooldown_until_ms: None,
            clock,
        }
    }

    /// Create a window driven by the system clock
    pub fn with_system_clock(quota: u32, window: Duration) -> Self {
        Self::new(quota, window, SystemClock::shared())
    }

    /// Ask for permission to send one request
    pub fn attempt(&mut self) -> Admission {
        let now = self.clock.now_ms();

        if let Some(until) = self.cooldown_until_ms {
            if now < until {
                let remaining_cooldown_ms = until - now;
                debug!(remaining_cooldown_ms, "Rate window rejected request attempt");
                return Admission::Rejected {
                    remaining_cooldown_ms,
                };
            }
            debug!("Rate window cooldown elapsed, resetting counter");
            self.reset(now);
        } else if now.saturating_sub(self.window_start_ms) >= self.window_ms {
            self.reset(now);
        }

        self.request_count += 1;
        if self.request_count >= self.quota {
            let until = now + self.window_ms;
            self.cooldown_until_ms = Some(until);
            debug!(
                quota = self.quota,
                cooldown_until_ms = until,
                "Rate window quota reached, cooldown latched"
            );
        }

        Admission::Allowed
    }

    fn reset(&mut self, now: u64) {
        self.request_count = 0;
        self.window_start_ms = now;
        self.cooldown_until_ms = None;
    }

    /// Requests admitted since the window opened
    pub fn request_count(&self) -> u32 {
        self.request_count
    }

    /// Requests that can still be admitted right now
    pub fn remaining_quota(&self) -> u32 {
        let now = self.clock.now_ms();
        match self.cooldown_until_ms {
            Some(until) if now < until => 0,
            Some(_) => self.quota,
            None if now.saturating_sub(self.window_start_ms) >= self.window_ms => self.quota,
            None => self.quota.saturating_sub(self.request_count),
        }
    }

    /// Milliseconds until the quota is fully restored
    pub fn ms_until_reset(&self) -> u64 {
        let now = self.clock.now_ms();
        match self.cooldown_until_ms {
            Some(until) => until.saturating_sub(now),
            None => (self.window_start_ms + self.window_ms).saturating_sub(now),
        }
    }

    /// Configured quota
    pub fn quota(&self) -> u32 {
        self.quota
    }

    /// Configured window duration
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    /// Current time on the window's clock
    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }
}

impl fmt::Debug for RateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateWindow")
            .field("quota", &self.quota)
            .field("window_ms", &self.window_ms)
            .field("request_count", &self.request_count)
            .field("window_start_ms", &self.window_start_ms)
            .field("cooldown_until_ms", &self.cooldown_until_ms)
            .finish()
    }
}
