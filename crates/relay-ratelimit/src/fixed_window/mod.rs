//! # Fixed Window
//!
//! Time is cut into aligned windows of `window` seconds. Each identifier
//! gets a counter per window; a request of cost `c` adds `c` and is admitted
//! iff the resulting count is at most `limit`. Denied requests still count.
//!
//! Windows are aligned to the epoch, so a client may spend `limit` at the end
//! of one window and `limit` again at the start of the next.

mod distributed;
mod local;

pub use distributed::RedisFixedWindow;
pub use local::LocalFixedWindow;

use crate::decision::{Decision, Remaining};
use crate::error::{LimiterError, LimiterResult};

/// Limit and window length of a fixed-window limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowParams {
    pub limit: u64,
    /// Window length in seconds.
    pub window: u64,
}

impl WindowParams {
    pub fn new(limit: u64, window: u64) -> LimiterResult<Self> {
        let params = Self { limit, window };
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> LimiterResult<()> {
        if self.limit == 0 {
            return Err(LimiterError::InvalidConfig(
                "window limit must be positive".into(),
            ));
        }
        if self.window == 0 {
            return Err(LimiterError::InvalidConfig(
                "window length must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Start of the window containing `now` (epoch seconds).
    #[must_use]
    pub fn window_start(&self, now: u64) -> u64 {
        now - now % self.window
    }

    /// Seconds from `now` until the current window ends. Always in `1..=window`.
    #[must_use]
    pub fn reset_in(&self, now: u64) -> u64 {
        self.window_start(now) + self.window - now
    }

    /// Decision for a window whose counter reads `count` after the check.
    #[must_use]
    pub fn decide(&self, count: u64, now: u64) -> Decision {
        Decision {
            allowed: count <= self.limit,
            limit: self.limit,
            remaining: Remaining::Finite(self.limit.saturating_sub(count)),
            reset_in: self.reset_in(now),
        }
    }
}
