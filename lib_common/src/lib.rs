//! Shared building blocks of the egg grading line monitor.
//!
//! Each folder is behind its own cargo feature; `full` (the default) enables
//! them all.

#[cfg(feature = "aggregation")]
pub mod aggregation;
#[cfg(feature = "channels")]
pub mod channels;
#[cfg(feature = "configs")]
pub mod configs;
#[cfg(feature = "connections")]
pub mod connections;
#[cfg(feature = "core")]
pub mod core;
#[cfg(feature = "loggers")]
pub mod loggers;
