//! Dual-window request rate limiting.
//!
//! The upstream API enforces both a short and a long ceiling. The gate is an
//! explicit, injectable object (not process globals) so tests can construct
//! their own windows.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Request ceilings for both windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatePolicy {
    pub short_window: Duration,
    pub short_limit: u32,
    pub long_window: Duration,
    pub long_limit: u32,
}

impl RatePolicy {
    /// The upstream API's published ceilings: 180 requests per minute and
    /// 300 per five minutes.
    pub const fn upstream_default() -> Self {
        Self {
            short_window: Duration::from_secs(60),
            short_limit: 180,
            long_window: Duration::from_secs(300),
            long_limit: 300,
        }
    }
}

impl Default for RatePolicy {
    fn default() -> Self {
        Self::upstream_default()
    }
}

/// Gate that admits a request only when both windows have budget.
///
/// Exceeding a ceiling is never surfaced to callers; [`RateGate::acquire`]
/// suspends until capacity frees.
#[derive(Clone)]
pub struct RateGate {
    short: Arc<DirectRateLimiter>,
    long: Arc<DirectRateLimiter>,
    poll_interval: Duration,
}

impl RateGate {
    pub fn new(policy: &RatePolicy) -> Self {
        Self {
            short: Arc::new(RateLimiter::direct(quota_from_window(
                policy.short_window,
                policy.short_limit,
            ))),
            long: Arc::new(RateLimiter::direct(quota_from_window(
                policy.long_window,
                policy.long_limit,
            ))),
            poll_interval: Duration::from_millis(250),
        }
    }

    /// Try to take one request's budget from both windows.
    ///
    /// When either window rejects, the recommended wait before retrying is
    /// returned. A cell consumed from one window on a rejected composite
    /// acquire only tightens the budget, never loosens it, so the ceilings
    /// still hold.
    pub fn try_acquire(&self) -> Result<(), Duration> {
        if self.long.check().is_err() {
            return Err(self.poll_interval);
        }
        if self.short.check().is_err() {
            return Err(self.poll_interval);
        }
        Ok(())
    }

    /// Suspend until both windows admit one request.
    pub async fn acquire(&self) {
        loop {
            match self.try_acquire() {
                Ok(()) => return,
                Err(wait) => tokio::time::sleep(wait).await,
            }
        }
    }
}

fn quota_from_window(window: Duration, limit: u32) -> Quota {
    let safe_limit = limit.max(1);
    let burst = NonZeroU32::new(safe_limit).expect("safe limit must be non-zero");

    let seconds_per_cell = (window.as_secs_f64() / f64::from(safe_limit)).max(0.001);
    let period = Duration::from_secs_f64(seconds_per_cell);

    Quota::with_period(period)
        .expect("period is always greater than zero")
        .allow_burst(burst)
}
