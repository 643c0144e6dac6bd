use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of physical lanes on the grader.
pub const LANE_COUNT: i64 = 6;

/// # Result Encoding
///
/// How the `history` table records per-lane outcomes. Each variant supplies a
/// `lane_events(lane_no, is_ok)` relation holding one row per lane event
/// recorded today on lanes 1..6; the rollup queries are built on top of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResultEncoding {
    /// `lane1..lane6` SMALLINT columns; a non-null code is an event, `0` is OK
    /// and any other value is NG.
    #[default]
    LaneCode,
    /// One row per event with `lane_no` and a `result` of `'OK'` or `'NG'`.
    ResultLabel,
}

impl ResultEncoding {
    pub fn as_str(self) -> &'static str {
        match self {
            ResultEncoding::LaneCode => "lane-code",
            ResultEncoding::ResultLabel => "result-label",
        }
    }

    fn lane_events_cte(self) -> &'static str {
        match self {
            ResultEncoding::LaneCode => {
                "WITH lane_events AS (
                    SELECT v.lane_no, (v.code = 0) AS is_ok
                    FROM history h
                    CROSS JOIN LATERAL (VALUES
                        (1, h.lane1), (2, h.lane2), (3, h.lane3),
                        (4, h.lane4), (5, h.lane5), (6, h.lane6)
                    ) AS v(lane_no, code)
                    WHERE v.code IS NOT NULL
                      AND DATE(h.created_t) = CURRENT_DATE
                )"
            }
            ResultEncoding::ResultLabel => {
                "WITH lane_events AS (
                    SELECT h.lane_no::int4 AS lane_no, (h.result = 'OK') AS is_ok
                    FROM history h
                    WHERE h.result IN ('OK', 'NG')
                      AND h.lane_no BETWEEN 1 AND 6
                      AND DATE(h.created_t) = CURRENT_DATE
                )"
            }
        }
    }

    /// One row: `lane_no = 'all_total'` with today's counts over every lane.
    pub fn total_sql(self) -> String {
        format!(
            "{}
            SELECT 'all_total' AS lane_no,
                COALESCE(SUM(CASE WHEN e.is_ok = false THEN 1 ELSE 0 END), 0)::int8 AS ng_count_today,
                COALESCE(SUM(CASE WHEN e.is_ok = true THEN 1 ELSE 0 END), 0)::int8 AS ok_count_today,
                COUNT(e.lane_no)::int8 AS total
            FROM lane_events e",
            self.lane_events_cte()
        )
    }

    /// One row per lane 1..6, including lanes with no events today.
    pub fn per_lane_sql(self) -> String {
        format!(
            "{}
            SELECT l.lane_no,
                COALESCE(SUM(CASE WHEN e.is_ok = false THEN 1 ELSE 0 END), 0)::int8 AS ng_count_today,
                COALESCE(SUM(CASE WHEN e.is_ok = true THEN 1 ELSE 0 END), 0)::int8 AS ok_count_today,
                COUNT(e.lane_no)::int8 AS total
            FROM generate_series(1, {}) AS l(lane_no)
            LEFT JOIN lane_events e ON e.lane_no = l.lane_no
            GROUP BY l.lane_no
            ORDER BY l.lane_no",
            self.lane_events_cte(),
            LANE_COUNT
        )
    }
}

impl fmt::Display for ResultEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResultEncoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lane-code" | "lane_code" => Ok(ResultEncoding::LaneCode),
            "result-label" | "result_label" => Ok(ResultEncoding::ResultLabel),
            other => Err(format!(
                "unknown result encoding '{}', expected 'lane-code' or 'result-label'",
                other
            )),
        }
    }
}
