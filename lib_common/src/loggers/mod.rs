//! # Loggers
//!
//! Process logging (`tracing`) and the operational error trail: the durable
//! `error` table with a local append-only file behind it.

/// Severity classes and the error record format.
pub mod logrecord;
/// The local append-only error log.
pub mod loggerlocal;
/// The durable-first error sink.
pub mod error_sink;
/// Subscriber setup for stdout and rolling files.
pub mod tracing_setup;

pub use error_sink::{ErrorSink, StoreErrorSink};
pub use loggerlocal::LocalErrorLog;
pub use logrecord::{ErrorRecord, Severity};
pub use tracing_setup::init_tracing;
