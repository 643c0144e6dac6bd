//! # Today's Rollup
//!
//! OK/NG counts for the current store day, as one grand-total row followed by
//! one row per lane. Nothing is cached between calls; every fetch recomputes
//! from the `history` table.

use serde::{Serialize, Serializer};
use std::sync::Arc;
use thiserror::Error;

use super::encoding::{ResultEncoding, LANE_COUNT};
use crate::connections::{column_i64, QueryExecutor, Row, StoreError};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum AggregationError {
    #[error("{0}")]
    QueryFailed(#[from] StoreError),
}

impl AggregationError {
    /// The store could not hand out a connection at all.
    pub fn is_connection_unavailable(&self) -> bool {
        matches!(self, AggregationError::QueryFailed(StoreError::ConnectionUnavailable(_)))
    }
}

/// The `lane_no` of a rollup row: the grand total or a physical lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaneKey {
    Total,
    Lane(u8),
}

impl Serialize for LaneKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            LaneKey::Total => serializer.serialize_str("all_total"),
            LaneKey::Lane(n) => serializer.serialize_u8(*n),
        }
    }
}

/// One row of the rollup, in the shape dashboards receive it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregationRow {
    pub lane_no: LaneKey,
    pub ng_count_today: i64,
    pub ok_count_today: i64,
    pub total: i64,
}

impl AggregationRow {
    pub fn empty(lane_no: LaneKey) -> Self {
        Self {
            lane_no,
            ng_count_today: 0,
            ok_count_today: 0,
            total: 0,
        }
    }

    fn from_counts(lane_no: LaneKey, row: &Row) -> Result<Self, StoreError> {
        Ok(Self {
            lane_no,
            ng_count_today: column_i64(row, "ng_count_today")?,
            ok_count_today: column_i64(row, "ok_count_today")?,
            total: column_i64(row, "total")?,
        })
    }
}

/// The grand total plus lanes 1..6 in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TodayRollup {
    pub total: AggregationRow,
    pub per_lane: Vec<AggregationRow>,
}

impl TodayRollup {
    /// Wire order: the total row first, then lanes 1..6.
    pub fn rows(&self) -> Vec<AggregationRow> {
        let mut rows = Vec::with_capacity(self.per_lane.len() + 1);
        rows.push(self.total.clone());
        rows.extend(self.per_lane.iter().cloned());
        rows
    }
}

/// # Aggregation Query Service
///
/// Runs the total and per-lane queries for the configured [`ResultEncoding`]
/// on a single pooled connection.
#[derive(Clone)]
pub struct AggregationQueryService {
    executor: Arc<dyn QueryExecutor>,
    encoding: ResultEncoding,
}

impl AggregationQueryService {
    pub fn new(executor: Arc<dyn QueryExecutor>, encoding: ResultEncoding) -> Self {
        Self { executor, encoding }
    }

    pub fn encoding(&self) -> ResultEncoding {
        self.encoding
    }

    /// Today's rollup. Fails as a whole if either query fails.
    pub async fn fetch_today_rollup(&self) -> Result<TodayRollup, AggregationError> {
        let (total_rows, lane_rows) = {
            let conn = self.executor.acquire().await?;
            let total_rows = conn.query(&self.encoding.total_sql(), &[]).await?;
            let lane_rows = conn.query(&self.encoding.per_lane_sql(), &[]).await?;
            (total_rows, lane_rows)
        };

        let total = match total_rows.first() {
            Some(row) => AggregationRow::from_counts(LaneKey::Total, row)?,
            None => AggregationRow::empty(LaneKey::Total),
        };

        let mut per_lane: Vec<AggregationRow> = (1..=LANE_COUNT as u8)
            .map(|n| AggregationRow::empty(LaneKey::Lane(n)))
            .collect();
        for row in &lane_rows {
            let lane = column_i64(row, "lane_no")?;
            if !(1..=LANE_COUNT).contains(&lane) {
                tracing::warn!(lane, "ignoring rollup row for a lane outside 1..{}", LANE_COUNT);
                continue;
            }
            per_lane[(lane - 1) as usize] = AggregationRow::from_counts(LaneKey::Lane(lane as u8), row)?;
        }

        Ok(TodayRollup { total, per_lane })
    }
}
