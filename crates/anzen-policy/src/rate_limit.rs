// rate_limit.rs — In-memory sliding-window rate limiting.
//
// Each (user, bucket) pair owns a deque of recent request instants. A check
// first drops instants older than the window, then refuses if the deque is
// already at capacity. A refused check records nothing, so hammering a
// limited bucket does not extend the lockout.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::error::RateLimitExceeded;

/// Which family of request is being counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateBucket {
    /// Status, logs, listings, chat answers.
    Command,
    /// Plan creation (each one costs an LLM call).
    Plan,
    /// Approval attempts (bounds token guessing).
    Approve,
}

impl fmt::Display for RateBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateBucket::Command => write!(f, "command"),
            RateBucket::Plan => write!(f, "plan"),
            RateBucket::Approve => write!(f, "approve"),
        }
    }
}

/// At most `max_events` within any `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitPolicy {
    pub max_events: u32,
    pub window: Duration,
}

impl LimitPolicy {
    pub fn per_minute(max_events: u32) -> Self {
        Self {
            max_events,
            window: Duration::from_secs(60),
        }
    }
}

/// Thread-safe limiter shared by every request path of one runtime.
#[derive(Debug, Default)]
pub struct RateLimiter {
    events: Mutex<HashMap<(i64, RateBucket), VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one request for `(user_id, bucket)` or refuse it.
    pub fn check(
        &self,
        user_id: i64,
        bucket: RateBucket,
        policy: LimitPolicy,
    ) -> Result<(), RateLimitExceeded> {
        self.check_at(user_id, bucket, policy, Instant::now())
    }

    /// Same as `check`, with an explicit clock for deterministic tests.
    pub fn check_at(
        &self,
        user_id: i64,
        bucket: RateBucket,
        policy: LimitPolicy,
        now: Instant,
    ) -> Result<(), RateLimitExceeded> {
        // A poisoned lock only means another thread panicked mid-check;
        // the deque itself is still coherent.
        let mut events = self.events.lock().unwrap_or_else(|e| e.into_inner());
        let queue = events.entry((user_id, bucket)).or_default();

        while let Some(oldest) = queue.front() {
            if now.saturating_duration_since(*oldest) > policy.window {
                queue.pop_front();
            } else {
                break;
            }
        }

        if queue.len() >= policy.max_events as usize {
            tracing::warn!(user_id, bucket = %bucket, "rate limit exceeded");
            return Err(RateLimitExceeded {
                user_id,
                bucket: bucket.to_string(),
            });
        }

        queue.push_back(now);
        Ok(())
    }
}
