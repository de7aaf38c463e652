use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Duration, Utc};

use crate::errors::{PointClawError, PointClawResult};

/// Per-source sliding-window counter. Every command a source issues counts,
/// whether or not it ends up valid, and the history survives merge cycles.
#[derive(Debug)]
pub struct RateLimiter {
    limit: u32,
    window: Duration,
    issued: HashMap<String, VecDeque<DateTime<Utc>>>,
}

impl RateLimiter {
    pub fn new(limit: u32, window_secs: u64) -> Self {
        Self {
            limit,
            window: Duration::seconds(window_secs.min(i64::MAX as u64) as i64),
            issued: HashMap::new(),
        }
    }

    /// Record a command from `source` at `at` and check it against the limit.
    pub fn record(&mut self, source: &str, at: DateTime<Utc>) -> PointClawResult<()> {
        let history = self.issued.entry(source.to_string()).or_default();
        history.push_back(at);
        let cutoff = at - self.window;
        let in_window = history.iter().filter(|t| **t > cutoff && **t <= at).count();
        // Nothing older than the window can matter again once times move forward.
        while history.front().is_some_and(|t| *t <= cutoff) {
            history.pop_front();
        }
        if in_window as u64 > self.limit as u64 {
            return Err(PointClawError::RateLimitExceeded {
                user: source.to_string(),
                limit: self.limit,
                window_secs: self.window.num_seconds().max(0) as u64,
            });
        }
        Ok(())
    }

    /// Forget history that can no longer affect a command sent at or after
    /// `oldest`, and sources left with none.
    pub fn prune(&mut self, oldest: DateTime<Utc>) {
        let cutoff = oldest - self.window;
        self.issued.retain(|_, history| {
            while history.front().is_some_and(|t| *t <= cutoff) {
                history.pop_front();
            }
            !history.is_empty()
        });
    }
}
