//! # Configuration Modules
//!
//! Static line configuration: which ports exist, what they are called and
//! whether they relay or poll. Loaded once at process start.

/// The channel table and its lookups.
pub mod channels;

pub use channels::{Channel, ChannelKind, ChannelRegistry, ConfigError};
