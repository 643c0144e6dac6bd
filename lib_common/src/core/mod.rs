//! # Core Module
//!
//! The per-channel moving parts that do not know about the store:
//!
//! - **`dispatcher`**: fan-out of outbound frames to the members of one
//!   channel, or to a single member.
//! - **`interval_timer`**: a cancellable recurring tick loop.
//! - **`polling_session`**: the shared, serialized on/off state of a polling
//!   channel, built on the interval timer.

/// Fan-out of frames to the connections of one channel.
pub mod dispatcher;
/// A recurring tick loop with idempotent arm/disarm.
pub mod interval_timer;
/// The shared polling state of one channel.
pub mod polling_session;

pub use dispatcher::{ConnectionId, DEFAULT_QUEUE_DEPTH, Dispatcher, Outbound};
pub use interval_timer::{IntervalTimer, TickFn, TickFuture};
pub use polling_session::PollingSession;
