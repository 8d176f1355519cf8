//! Ports (hexagonal architecture).

pub mod outbound;

pub use outbound::{ChannelOpenedNotifier, ManualTimeSource, SystemTimeSource, TimeSource};
