//! # Relay Test Suite
//!
//! ## Structure
//!
//! ```text
//! tests/
//! ├── src/integration/   # Full router flows over the in-memory stack
//! │   ├── channels.rs
//! │   ├── fan_out.rs
//! │   └── rate_limit_http.rs
//! └── benches/           # Limiter and bus throughput
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p relay-tests
//! cargo test -p relay-tests integration::fan_out
//!
//! # Benchmarks
//! cargo bench -p relay-tests
//! ```

#![allow(dead_code)]

pub mod integration;
