//! # Aggregation Module
//!
//! Today's per-lane OK/NG rollup, computed by the store on every request.

/// How lane outcomes are stored, and the SQL derived from it.
pub mod encoding;
/// The rollup service and its row types.
pub mod rollup;

pub use encoding::{ResultEncoding, LANE_COUNT};
pub use rollup::{AggregationError, AggregationQueryService, AggregationRow, LaneKey, TodayRollup};
