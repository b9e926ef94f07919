//! Sliding-window rate limiter for outbound actions (mails per day, posts per
//! day, requests per minute).
//!
//! Admission is exact: a call is allowed only while fewer than `max_requests`
//! admissions happened in the trailing window. Nothing is smoothed and a
//! denied call is not recorded.
//!
//! The timestamp deque sits behind a mutex so one limiter can be shared
//! through an `Arc` by the work loop and any concurrent command handler.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::clock::SharedClock;

pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    /// Admission times, oldest first.
    timestamps: Mutex<VecDeque<DateTime<Utc>>>,
    clock: SharedClock,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration, clock: SharedClock) -> Self {
        Self {
            max_requests,
            window,
            timestamps: Mutex::new(VecDeque::new()),
            clock,
        }
    }

    /// `max_requests` admissions per calendar-free 24h window.
    pub fn per_day(max_requests: u32, clock: SharedClock) -> Self {
        Self::new(max_requests, Duration::from_secs(86_400), clock)
    }

    pub fn per_minute(max_requests: u32, clock: SharedClock) -> Self {
        Self::new(max_requests, Duration::from_secs(60), clock)
    }

    /// Admit one request if the window has room, recording it.
    pub fn allow(&self) -> bool {
        if self.max_requests == 0 {
            return false;
        }
        let now = self.clock.utc();
        let mut timestamps = self.lock();
        self.prune(&mut timestamps, now);

        if timestamps.len() >= self.max_requests as usize {
            tracing::debug!(
                "🚦 Rate limit reached ({}/{} per {}s)",
                timestamps.len(),
                self.max_requests,
                self.window.as_secs()
            );
            return false;
        }
        timestamps.push_back(now);
        true
    }

    /// How long until the next `allow()` could succeed. Zero while the window
    /// has room. Diagnostics only.
    pub fn time_until_next_slot(&self) -> Duration {
        let now = self.clock.utc();
        let mut timestamps = self.lock();
        self.prune(&mut timestamps, now);

        if timestamps.len() < self.max_requests as usize {
            return Duration::ZERO;
        }
        match timestamps.front() {
            Some(oldest) => {
                // A clock that stepped backwards yields a negative age; treat it as zero.
                let age = (now - *oldest).to_std().unwrap_or(Duration::ZERO);
                self.window.saturating_sub(age)
            }
            // max_requests == 0: there will never be a slot.
            None => self.window,
        }
    }

    /// Unused capacity in the current window.
    pub fn remaining(&self) -> u32 {
        let now = self.clock.utc();
        let mut timestamps = self.lock();
        self.prune(&mut timestamps, now);
        self.max_requests
            .saturating_sub(timestamps.len() as u32)
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Drop admissions at or before `now - window`.
    fn prune(&self, timestamps: &mut VecDeque<DateTime<Utc>>, now: DateTime<Utc>) {
        let window = chrono::Duration::from_std(self.window).unwrap_or(chrono::Duration::MAX);
        let Some(cutoff) = now.checked_sub_signed(window) else {
            return;
        };
        while let Some(&first) = timestamps.front() {
            if first <= cutoff {
                timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<DateTime<Utc>>> {
        self.timestamps.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("max_requests", &self.max_requests)
            .field("window", &self.window)
            .field("recorded", &self.lock().len())
            .finish()
    }
}
