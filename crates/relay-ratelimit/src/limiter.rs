//! The rate limiter abstraction shared by every algorithm and backend.

use crate::decision::{Algorithm, Decision, Remaining};
use crate::token_bucket::BucketParams;
use async_trait::async_trait;

/// A quota on actions per identifier (client address, API key, channel).
///
/// `check` consumes and decides atomically per identifier: concurrent
/// callers on the same identifier observe a single serialized outcome.
/// `peek` reports the same figures without consuming.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Namespace the limiter's keys live under.
    fn name(&self) -> &str;

    fn algorithm(&self) -> Algorithm;

    /// Window limit or bucket capacity.
    fn limit(&self) -> u64;

    /// Consume `cost` units for `identifier` and decide.
    async fn check(&self, identifier: &str, cost: u32) -> Decision;

    /// Current figures for `identifier` without consuming.
    async fn peek(&self, identifier: &str) -> Decision;

    /// Whether a request of `cost` is admitted (consuming on success).
    async fn allow(&self, identifier: &str, cost: u32) -> bool {
        self.check(identifier, cost).await.allowed
    }

    /// Requests still admissible for `identifier`.
    async fn remaining(&self, identifier: &str) -> Remaining {
        self.peek(identifier).await.remaining
    }

    /// Whole seconds until `identifier` regains capacity.
    async fn reset_in(&self, identifier: &str) -> u64 {
        self.peek(identifier).await.reset_in
    }

    /// Drop idle state. Returns how many entries were removed.
    fn sweep(&self) -> usize {
        0
    }

    /// False while decisions are permissive instead of enforced.
    fn is_enforcing(&self) -> bool {
        true
    }

    /// Decisions served by the failure policy instead of the store.
    fn fallbacks(&self) -> u64 {
        0
    }
}

/// Token-bucket limiter that also accepts per-call bucket parameters.
///
/// Used for per-channel buckets whose capacity and refill rate are
/// configured at runtime.
#[async_trait]
pub trait BucketLimiter: RateLimiter {
    /// Like [`RateLimiter::check`] but with explicit bucket parameters.
    async fn check_with(&self, identifier: &str, cost: u32, params: BucketParams) -> Decision;

    /// Like [`RateLimiter::peek`] but with explicit bucket parameters.
    async fn peek_with(&self, identifier: &str, params: BucketParams) -> Decision;
}
