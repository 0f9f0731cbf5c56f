//! Admission limiter window behavior on the process-local backend.

#![allow(clippy::unwrap_used)]

use eventhub::limiter::{AdmissionLimiter, LimiterSettings};
use std::time::Duration;

#[tokio::test]
async fn five_per_window_then_denied_then_fresh_window() {
    tokio::time::pause();
    let limiter = AdmissionLimiter::new(
        LimiterSettings {
            max: 5,
            window: Duration::from_secs(60),
        },
        None,
    );

    for attempt in 1..=5 {
        assert!(limiter.allow("203.0.113.9").await, "attempt {attempt}");
    }
    assert!(!limiter.allow("203.0.113.9").await);

    tokio::time::advance(Duration::from_secs(61)).await;
    assert!(limiter.allow("203.0.113.9").await);
}

#[tokio::test]
async fn keys_are_isolated_from_each_other() {
    let limiter = AdmissionLimiter::new(
        LimiterSettings {
            max: 1,
            window: Duration::from_secs(60),
        },
        None,
    );

    assert!(limiter.allow("a").await);
    assert!(!limiter.allow("a").await);
    assert!(limiter.allow("b").await);
}

#[tokio::test]
async fn window_slides_rather_than_resetting() {
    tokio::time::pause();
    let limiter = AdmissionLimiter::new(
        LimiterSettings {
            max: 2,
            window: Duration::from_secs(10),
        },
        None,
    );

    assert!(limiter.allow("k").await);
    tokio::time::advance(Duration::from_secs(6)).await;
    assert!(limiter.allow("k").await);
    assert!(!limiter.allow("k").await);

    // The first timestamp ages out; the second is still inside the window.
    tokio::time::advance(Duration::from_secs(5)).await;
    assert!(limiter.allow("k").await);
    assert!(!limiter.allow("k").await);
}
