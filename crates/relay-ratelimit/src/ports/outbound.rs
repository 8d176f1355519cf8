//! Outbound ports for the rate limiters.

use crate::channel::ChannelLimits;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Time source trait for testability
pub trait TimeSource: Send + Sync {
    /// Time elapsed since the Unix epoch.
    fn now(&self) -> Duration;
}

/// System time implementation
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Duration {
        // Clock before Unix epoch - return 0 rather than panic
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
    }
}

/// Hand-driven clock for tests and simulations.
#[derive(Debug, Default)]
pub struct ManualTimeSource {
    micros: AtomicU64,
}

impl ManualTimeSource {
    /// Clock frozen at `start` after the epoch.
    pub fn starting_at(start: Duration) -> Self {
        Self {
            micros: AtomicU64::new(start.as_micros() as u64),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        self.micros
            .fetch_add(by.as_micros() as u64, Ordering::SeqCst);
    }

    /// Jump to an absolute time.
    pub fn set(&self, to: Duration) {
        self.micros.store(to.as_micros() as u64, Ordering::SeqCst);
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> Duration {
        Duration::from_micros(self.micros.load(Ordering::SeqCst))
    }
}

/// Told when a channel's limits are created for the first time.
///
/// Implemented by whoever can announce the new channel (the gateway
/// publishes a `system` event on the bus).
#[async_trait]
pub trait ChannelOpenedNotifier: Send + Sync {
    async fn channel_opened(&self, channel: &str, limits: &ChannelLimits);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_time_is_after_epoch() {
        assert!(SystemTimeSource.now() > Duration::from_secs(1_600_000_000));
    }

    #[test]
    fn test_manual_time_advances() {
        let clock = ManualTimeSource::starting_at(Duration::from_secs(100));
        clock.advance(Duration::from_millis(1500));
        assert_eq!(clock.now(), Duration::from_millis(101_500));

        clock.set(Duration::from_secs(5));
        assert_eq!(clock.now().as_secs(), 5);
    }
}
