//! Relay Gateway - HTTP front of the event relay.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                      RELAY GATEWAY                         │
//! │                                                            │
//! │  Tracing → CORS → Auth → RateLimit(/ops fixed window)      │
//! │                            │                               │
//! │  ┌──────────┬──────────────┼──────────────┬────────────┐   │
//! │  │ /publish │ /channels    │ /ops         │ /stream    │   │
//! │  │ (bucket) │ (limits)     │ (broadcast)  │ (SSE)      │   │
//! │  └────┬─────┴──────┬───────┴──────┬───────┴─────┬──────┘   │
//! │       │      ChannelRegistry      │             │          │
//! │       └───────────────┬───────────┘             │          │
//! └───────────────────────┼─────────────────────────┼──────────┘
//!                         ▼                         │
//!                     EventBus ─────────────────────┘
//!                (local or Redis pub/sub)
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use relay_gateway::{RelayConfig, RelayService};
//!
//! let mut service = RelayService::new(RelayConfig::from_env()?)?;
//! service.start().await?;
//! // ...
//! service.shutdown().await;
//! ```

#![allow(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod adapters;
pub mod api;
pub mod domain;
pub mod middleware;
pub mod service;
pub mod stream;
pub mod telemetry;

pub use adapters::BusChannelNotifier;
pub use api::{router, AppState};
pub use domain::config::RelayConfig;
pub use domain::error::{ApiError, ApiResult, GatewayError};
pub use service::RelayService;
pub use stream::StreamAdapter;
pub use telemetry::{init_logging, LoggingConfig};
