//! Middleware stack for the relay.
//!
//! Layer order: Request → Tracing → CORS → Auth → RateLimit → Handler
//!
//! Auth wraps the rate-limit layer so an unauthorized privileged request is
//! rejected before it consumes quota.

pub mod auth;
pub mod cors;
pub mod rate_limit;
pub mod tracing;

pub use auth::{constant_time_compare, path_in_scope, AuthConfig, AuthLayer, ProtectedRoute};
pub use cors::create_cors_layer;
pub use rate_limit::{
    apply_rate_limit_headers, client_address, client_identifier, rate_limited_response,
    RateLimitLayer, RateLimitPolicy,
};
pub use tracing::TracingLayer;
