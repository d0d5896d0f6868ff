//! Invocation deadline and suspend requests
//!
//! The host gives each invocation an approximate wall-clock deadline. The
//! orchestrator checks it between discrete steps. A suspend can also be
//! requested out of band (Ctrl+C in the CLI); it behaves like a reached deadline.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::info;

/// Shared handle to an invocation deadline
pub type SharedDeadline = Arc<InvocationDeadline>;

#[derive(Debug, Default)]
struct SuspendSignal {
    requested: AtomicBool,
    notify: Notify,
}

/// Deadline for one worker invocation
#[derive(Debug, Default)]
pub struct InvocationDeadline {
    expires_at_ms: Option<u64>,
    suspend: Arc<SuspendSignal>,
}

impl InvocationDeadline {
    /// Deadline that only ends on an explicit suspend request
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Deadline at an absolute Unix millisecond timestamp
    pub fn at(expires_at_ms: u64) -> Self {
        Self {
            expires_at_ms: Some(expires_at_ms),
            ..Self::default()
        }
    }

    /// Deadline from an optional timestamp
    pub fn from_option(expires_at_ms: Option<u64>) -> Self {
        Self {
            expires_at_ms,
            ..Self::default()
        }
    }

    /// Wrap in [`Arc`]
    pub fn into_shared(self) -> SharedDeadline {
        Arc::new(self)
    }

    /// Absolute expiry, if bounded
    pub fn expires_at_ms(&self) -> Option<u64> {
        self.expires_at_ms
    }

    /// Deadline expiring at the earlier of this one and `expires_at_ms`
    ///
    /// The result shares this deadline's suspend request: a suspend requested
    /// on either handle stops both.
    pub fn bounded_by(&self, expires_at_ms: Option<u64>) -> SharedDeadline {
        let earliest = match (self.expires_at_ms, expires_at_ms) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        Arc::new(Self {
            expires_at_ms: earliest,
            suspend: Arc::clone(&self.suspend),
        })
    }

    /// Ask the running pass to suspend at its next step boundary
    pub fn request_suspend(&self) {
        if !self.suspend.requested.swap(true, Ordering::SeqCst) {
            info!("Suspend requested for running invocation");
            self.suspend.notify.notify_waiters();
        }
    }

    /// Whether a suspend was requested
    pub fn is_suspend_requested(&self) -> bool {
        self.suspend.requested.load(Ordering::SeqCst)
    }

    /// Whether the pass must stop at `now_ms`
    pub fn is_reached(&self, now_ms: u64) -> bool {
        self.is_suspend_requested() || self.expires_at_ms.is_some_and(|at| now_ms >= at)
    }

    /// Milliseconds left at `now_ms`; `None` when unbounded
    pub fn remaining_ms(&self, now_ms: u64) -> Option<u64> {
        if self.is_suspend_requested() {
            return Some(0);
        }
        self.expires_at_ms.map(|at| at.saturating_sub(now_ms))
    }

    /// Wait until a suspend is requested. Returns immediately if already set.
    pub async fn wait_for_suspend(&self) {
        let notified = self.suspend.notify.notified();
        if self.is_suspend_requested() {
            return;
        }
        notified.await;
    }
}
