//! Adapters connecting the rate-limit ports to the event bus.

pub mod notifier;

pub use notifier::BusChannelNotifier;
