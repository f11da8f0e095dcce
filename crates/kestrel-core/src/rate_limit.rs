//! Fixed-window rate limiting with an optional cooldown.
//!
//! A [`RateLimiter`] admits at most `max_requests` calls per window. The
//! cooldown variant additionally locks callers out for a fixed period after
//! the first rejection in a window.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use kestrel_core::RateLimiter;
//!
//! let limiter = RateLimiter::fixed_window(10, Duration::from_secs(60));
//! if !limiter.try_acquire() {
//!     // tell the caller to slow down
//! }
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::clock::{Clock, SystemClock};

/// Snapshot of a limiter's window state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateWindow {
    /// Requests admitted in the current window.
    pub count: u32,
    /// When the current window started.
    pub window_start: Instant,
    /// Requests are rejected until this instant, when set.
    pub cooldown_until: Option<Instant>,
}

/// A shared fixed-window request counter.
pub struct RateLimiter {
    clock: Arc<dyn Clock>,
    window: Duration,
    max_requests: u32,
    cooldown: Option<Duration>,
    state: Mutex<RateWindow>,
}

impl RateLimiter {
    /// Admits `max_requests` calls per `window`.
    pub fn fixed_window(max_requests: u32, window: Duration) -> Self {
        Self::build(max_requests, window, None)
    }

    /// Like [`fixed_window`](Self::fixed_window), but a rejection also blocks
    /// every call for `cooldown`.
    pub fn with_cooldown(max_requests: u32, window: Duration, cooldown: Duration) -> Self {
        Self::build(max_requests, window, Some(cooldown))
    }

    fn build(max_requests: u32, window: Duration, cooldown: Option<Duration>) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let now = clock.now();
        Self {
            clock,
            window,
            max_requests,
            cooldown,
            state: Mutex::new(RateWindow {
                count: 0,
                window_start: now,
                cooldown_until: None,
            }),
        }
    }

    /// Replaces the time source and restarts the window at its current time.
    pub fn clock(mut self, clock: impl Clock) -> Self {
        let now = clock.now();
        self.clock = Arc::new(clock);
        *self.state.get_mut() = RateWindow {
            count: 0,
            window_start: now,
            cooldown_until: None,
        };
        self
    }

    /// Attempts to admit one request.
    pub fn try_acquire(&self) -> bool {
        let now = self.clock.now();
        let mut state = self.state.lock();

        if let Some(until) = state.cooldown_until {
            if now < until {
                return false;
            }
            state.cooldown_until = None;
        }

        if now.saturating_duration_since(state.window_start) >= self.window {
            state.count = 0;
            state.window_start = now;
        }

        if state.count >= self.max_requests {
            if let Some(cooldown) = self.cooldown {
                state.cooldown_until = Some(now + cooldown);
            }
            return false;
        }

        state.count += 1;
        true
    }

    /// Returns the current window state.
    pub fn snapshot(&self) -> RateWindow {
        *self.state.lock()
    }

    /// The window length.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Requests admitted per window.
    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("window", &self.window)
            .field("max_requests", &self.max_requests)
            .field("cooldown", &self.cooldown)
            .field("state", &*self.state.lock())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    const WINDOW: Duration = Duration::from_secs(60);

    #[test]
    fn test_eleventh_call_rejected() {
        let limiter = RateLimiter::fixed_window(10, WINDOW).clock(ManualClock::new());
        for i in 0..10 {
            assert!(limiter.try_acquire(), "call {i} rejected");
        }
        assert!(!limiter.try_acquire());
        assert_eq!(limiter.snapshot().count, 10);
    }

    #[test]
    fn test_window_resets_after_duration() {
        let clock = ManualClock::new();
        let limiter = RateLimiter::fixed_window(10, WINDOW).clock(clock.clone());
        for _ in 0..10 {
            assert!(limiter.try_acquire());
        }

        clock.advance(Duration::from_secs(59));
        assert!(!limiter.try_acquire());

        clock.advance(Duration::from_secs(1));
        assert!(limiter.try_acquire());
        assert_eq!(limiter.snapshot().count, 1);
    }

    #[test]
    fn test_cooldown_extends_past_window() {
        let clock = ManualClock::new();
        let limiter = RateLimiter::with_cooldown(2, Duration::from_secs(10), Duration::from_secs(30))
            .clock(clock.clone());

        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
        let until = limiter.snapshot().cooldown_until.unwrap();

        // Rejections during the cooldown do not push it further out.
        clock.advance(Duration::from_secs(5));
        assert!(!limiter.try_acquire());
        assert_eq!(limiter.snapshot().cooldown_until, Some(until));

        // The window has rolled over, but the cooldown still applies.
        clock.advance(Duration::from_secs(10));
        assert!(!limiter.try_acquire());

        clock.advance(Duration::from_secs(15));
        assert!(limiter.try_acquire());
        assert_eq!(limiter.snapshot().cooldown_until, None);
    }

    #[test]
    fn test_zero_limit_rejects_everything() {
        let limiter = RateLimiter::fixed_window(0, WINDOW).clock(ManualClock::new());
        assert!(!limiter.try_acquire());
        assert_eq!(limiter.snapshot().count, 0);
    }
}
