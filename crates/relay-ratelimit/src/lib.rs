//! # Relay Rate Limit
//!
//! Quotas on actions per identifier, in two algorithms and two backends:
//!
//! | | in-process | Redis |
//! |---|---|---|
//! | fixed window | [`LocalFixedWindow`] | [`RedisFixedWindow`] |
//! | token bucket | [`LocalTokenBucket`] | [`RedisTokenBucket`] |
//!
//! Every limiter implements [`RateLimiter`]; token buckets also implement
//! [`BucketLimiter`] for per-call parameters. Redis-backed limiters never
//! surface backend errors to callers: an unreachable store yields a
//! permissive decision (or a refusal under [`FailurePolicy::FailClosed`]).
//!
//! [`LimiterFactory`] picks the implementation from [`StoreMode`].

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::float_cmp))]

pub mod channel;
pub mod decision;
pub mod degrade;
pub mod error;
pub mod factory;
pub mod fixed_window;
pub mod limiter;
pub mod ports;
mod scripts;
pub mod store;
pub mod token_bucket;

// Re-export main types
pub use channel::{ChannelLimits, ChannelRegistry};
pub use decision::{Algorithm, Decision, Remaining};
pub use degrade::{Degradation, FailurePolicy, PermissiveLimiter};
pub use error::{LimiterError, LimiterResult};
pub use factory::{LimiterFactory, StoreMode};
pub use fixed_window::{LocalFixedWindow, RedisFixedWindow, WindowParams};
pub use limiter::{BucketLimiter, RateLimiter};
pub use ports::{ChannelOpenedNotifier, ManualTimeSource, SystemTimeSource, TimeSource};
pub use store::{RedisStore, DEFAULT_BACKEND_TIMEOUT};
pub use token_bucket::{BucketParams, LocalTokenBucket, RedisTokenBucket};
