//! In-process fixed-window limiter.

use super::WindowParams;
use crate::decision::{Algorithm, Decision};
use crate::limiter::RateLimiter;
use crate::ports::{SystemTimeSource, TimeSource};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
struct WindowCounter {
    start: u64,
    count: u64,
}

/// Fixed-window limiter keeping counters in a concurrent map.
///
/// The counter for an identifier is updated under that map entry's lock,
/// so concurrent checks on the same identifier are serialized.
pub struct LocalFixedWindow {
    name: String,
    params: WindowParams,
    counters: DashMap<String, WindowCounter>,
    clock: Arc<dyn TimeSource>,
}

impl LocalFixedWindow {
    #[must_use]
    pub fn new(name: impl Into<String>, params: WindowParams) -> Self {
        Self::with_clock(name, params, Arc::new(SystemTimeSource))
    }

    #[must_use]
    pub fn with_clock(
        name: impl Into<String>,
        params: WindowParams,
        clock: Arc<dyn TimeSource>,
    ) -> Self {
        Self {
            name: name.into(),
            params,
            counters: DashMap::new(),
            clock,
        }
    }

    #[must_use]
    pub fn params(&self) -> WindowParams {
        self.params
    }

    /// Identifiers currently tracked.
    #[must_use]
    pub fn tracked(&self) -> usize {
        self.counters.len()
    }

    fn now(&self) -> u64 {
        self.clock.now().as_secs()
    }
}

#[async_trait]
impl RateLimiter for LocalFixedWindow {
    fn name(&self) -> &str {
        &self.name
    }

    fn algorithm(&self) -> Algorithm {
        Algorithm::FixedWindow
    }

    fn limit(&self) -> u64 {
        self.params.limit
    }

    async fn check(&self, identifier: &str, cost: u32) -> Decision {
        let now = self.now();
        let start = self.params.window_start(now);

        let mut counter = self
            .counters
            .entry(identifier.to_string())
            .or_insert(WindowCounter { start, count: 0 });
        if counter.start != start {
            *counter = WindowCounter { start, count: 0 };
        }
        counter.count = counter.count.saturating_add(u64::from(cost));

        self.params.decide(counter.count, now)
    }

    async fn peek(&self, identifier: &str) -> Decision {
        let now = self.now();
        let start = self.params.window_start(now);
        let count = self
            .counters
            .get(identifier)
            .filter(|c| c.start == start)
            .map_or(0, |c| c.count);
        self.params.decide(count, now)
    }

    fn sweep(&self) -> usize {
        let current = self.params.window_start(self.now());
        let before = self.counters.len();
        self.counters.retain(|_, c| c.start == current);
        before.saturating_sub(self.counters.len())
    }
}
