//! # Channels Module
//!
//! The socket-agnostic side of every channel: message parsing, the relay and
//! polling behaviours, and the per-channel event loop that serializes them.
//! Transports (the axum WebSocket endpoints) only ever see [`ChannelHandle`].

pub mod hub;
pub mod message;
pub mod polling;
pub mod relay;

pub use hub::{ChannelDeps, ChannelEvent, ChannelHandle, ChannelServer};
pub use message::{ControlMessage, InboundMessage, MessageError};
pub use polling::PollingChannel;
pub use relay::RelayChannel;
