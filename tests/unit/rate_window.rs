//! Unit tests for the rate window tracker

use std::time::Duration;
use sync_extractor::extractor::{Admission, ManualClock, RateWindow};

const T0: u64 = 1_700_000_000_000;

fn window(clock: &ManualClock) -> RateWindow {
    RateWindow::new(100, Duration::from_millis(120_000), clock.shared())
}

#[test]
fn test_hundred_and_first_attempt_is_rejected() {
    let clock = ManualClock::new(T0);
    let mut rate_window = window(&clock);

    for _ in 0..100 {
        clock.advance(10);
        assert!(rate_window.attempt().is_allowed());
    }

    clock.advance(10);
    match rate_window.attempt() {
        Admission::Rejected {
            remaining_cooldown_ms,
        } => assert!(remaining_cooldown_ms <= 120_000 && remaining_cooldown_ms > 0),
        Admission::Allowed => panic!("101st attempt inside the window must be rejected"),
    }
}

#[test]
fn test_counter_restarts_after_cooldown() {
    let clock = ManualClock::new(T0);
    let mut rate_window = window(&clock);

    for _ in 0..100 {
        rate_window.attempt();
    }
    let Admission::Rejected {
        remaining_cooldown_ms,
    } = rate_window.attempt()
    else {
        panic!("expected rejection");
    };

    clock.advance(remaining_cooldown_ms);
    assert_eq!(rate_window.attempt(), Admission::Allowed);
    assert_eq!(rate_window.request_count(), 1);
    assert_eq!(rate_window.remaining_quota(), 99);
}

#[test]
fn test_rejections_do_not_extend_cooldown() {
    let clock = ManualClock::new(T0);
    let mut rate_window = window(&clock);
    for _ in 0..100 {
        rate_window.attempt();
    }

    clock.advance(60_000);
    assert_eq!(
        rate_window.attempt(),
        Admission::Rejected {
            remaining_cooldown_ms: 60_000
        }
    );
    clock.advance(30_000);
    assert_eq!(
        rate_window.attempt(),
        Admission::Rejected {
            remaining_cooldown_ms: 30_000
        }
    );
}
