use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};
use std::path::PathBuf;

use super::csv_export::{rows_to_csv, save_csv};
use super::{ApiError, ApiState, first_row, json_body};
use lib_common::connections::SqlValue;

/// NG lanes of one history row. Any non-zero code counts, the `-1`
/// "no reading" default included.
const NG_SUM: &str = "CASE WHEN lane1 != 0 THEN 1 ELSE 0 END + \
                      CASE WHEN lane2 != 0 THEN 1 ELSE 0 END + \
                      CASE WHEN lane3 != 0 THEN 1 ELSE 0 END + \
                      CASE WHEN lane4 != 0 THEN 1 ELSE 0 END + \
                      CASE WHEN lane5 != 0 THEN 1 ELSE 0 END + \
                      CASE WHEN lane6 != 0 THEN 1 ELSE 0 END";

const CSV_COLUMNS: [&str; 3] = ["recipe_no", "date", "ng_count"];

pub fn routes() -> Router<ApiState> {
    Router::new()
        .route("/", post(create_history))
        .route("/{id}", delete(delete_history))
        .route("/summary", get(summary))
        .route("/summary/{id}", post(daily_summary))
        .route("/last", get(last_day_hourly))
        .route("/total", get(total))
        .route("/csv/{id}", post(export_csv))
}

/// Optional day range of the per-recipe reports.
#[derive(Debug, Default, Deserialize)]
struct DateRange {
    start_date: Option<String>,
    end_date: Option<String>,
    /// Export root of the CSV endpoint.
    path: Option<String>,
}

impl DateRange {
    /// Both bounds, or none when either is missing or empty.
    fn bounds(&self) -> Option<(&str, &str)> {
        match (self.start_date.as_deref(), self.end_date.as_deref()) {
            (Some(start), Some(end)) if !start.is_empty() && !end.is_empty() => Some((start, end)),
            _ => None,
        }
    }
}

/// NG count per day for one recipe, optionally restricted to a day range.
///
/// The range is shifted by one day on both ends; clients send local dates
/// that were serialized through UTC and rely on the shift.
fn daily_ng_query(recipe: i64, range: &DateRange) -> (String, Vec<SqlValue>) {
    let (filter, values) = match range.bounds() {
        Some((start, end)) => (
            "created_t::date BETWEEN $2::date + INTERVAL '1 day' AND $3::date + INTERVAL '1 day'",
            vec![SqlValue::Int(recipe), SqlValue::from(start), SqlValue::from(end)],
        ),
        None => ("true", vec![SqlValue::Int(recipe)]),
    };
    let sql = format!(
        "SELECT recipe_no, created_t::date AS date, COALESCE(SUM({ng}), 0)::int8 AS ng_count \
         FROM history \
         WHERE recipe_no = $1 AND ({filter}) \
         GROUP BY recipe_no, created_t::date \
         ORDER BY date",
        ng = NG_SUM,
        filter = filter
    );
    (sql, values)
}

/// Latest-day NG percentage of every recipe.
async fn summary(State(state): State<ApiState>) -> Result<Json<Value>, ApiError> {
    let sql = format!(
        "WITH latest_dates AS ( \
             SELECT recipe_no, MAX(created_t::date) AS latest_date FROM history GROUP BY recipe_no \
         ), latest_data AS ( \
             SELECT h.* FROM history h \
             INNER JOIN latest_dates ld ON h.recipe_no = ld.recipe_no AND h.created_t::date = ld.latest_date \
         ), result_stats AS ( \
             SELECT recipe_no, \
                    ROUND((SUM({ng})::decimal / NULLIF(COUNT(*), 0)) / 6 * 100, 2) AS ng_percentage \
             FROM latest_data GROUP BY recipe_no \
         ) \
         SELECT r.idx AS recipe_no, r.nickname, r.type, r.weight, \
                COALESCE(rs.ng_percentage, 0)::float8 AS ng_percentage \
         FROM recipe r LEFT JOIN result_stats rs ON r.idx = rs.recipe_no \
         ORDER BY recipe_no",
        ng = NG_SUM
    );
    let conn = state.connection().await?;
    let rows = conn.query(&sql, &[]).await.map_err(ApiError::Query)?;
    Ok(Json(json!(rows)))
}

async fn daily_summary(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let range: DateRange = json_body(&body)?;
    let (sql, values) = daily_ng_query(id, &range);

    let conn = state.connection().await?;
    let rows = conn.query(&sql, &values).await.map_err(ApiError::InvalidRequest)?;
    Ok(Json(json!(rows)))
}

/// Hourly NG counts (24 buckets) of each recipe's most recent day.
async fn last_day_hourly(State(state): State<ApiState>) -> Result<Json<Value>, ApiError> {
    let sql = format!(
        "WITH latest_dates AS ( \
             SELECT recipe_no, MAX(created_t::date) AS last_date FROM history GROUP BY recipe_no \
         ), hourly_series AS ( \
             SELECT ld.recipe_no, ld.last_date, \
                    generate_series(ld.last_date, ld.last_date + INTERVAL '1 day' - INTERVAL '1 hour', '1 hour') AS hour_bucket \
             FROM latest_dates ld \
         ), filtered_data AS ( \
             SELECT h.recipe_no, DATE_TRUNC('hour', h.created_t) AS hour_bucket, \
                    COALESCE(SUM({ng}), 0) AS ng_count \
             FROM history h \
             INNER JOIN latest_dates ld ON h.recipe_no = ld.recipe_no AND h.created_t::date = ld.last_date \
             GROUP BY h.recipe_no, DATE_TRUNC('hour', h.created_t) \
         ), final_data AS ( \
             SELECT hs.recipe_no, hs.last_date::date AS last_date, hs.hour_bucket, \
                    COALESCE(fd.ng_count, 0) AS ng_count \
             FROM hourly_series hs \
             LEFT JOIN filtered_data fd ON hs.recipe_no = fd.recipe_no AND hs.hour_bucket = fd.hour_bucket \
         ) \
         SELECT recipe_no, last_date, JSON_AGG(ng_count ORDER BY hour_bucket) AS ng_count \
         FROM final_data GROUP BY recipe_no, last_date ORDER BY recipe_no",
        ng = NG_SUM
    );
    let conn = state.connection().await?;
    let rows = conn.query(&sql, &[]).await.map_err(ApiError::Query)?;
    Ok(Json(json!(rows)))
}

/// All-time NG count of every recipe.
async fn total(State(state): State<ApiState>) -> Result<Json<Value>, ApiError> {
    let sql = format!(
        "SELECT r.idx AS recipe_no, COALESCE(SUM({ng}), 0)::int8 AS ng_total_count \
         FROM (SELECT DISTINCT idx FROM recipe) r \
         LEFT JOIN history h ON r.idx = h.recipe_no \
         GROUP BY r.idx ORDER BY r.idx",
        ng = NG_SUM
    );
    let conn = state.connection().await?;
    let rows = conn.query(&sql, &[]).await.map_err(ApiError::Query)?;
    Ok(Json(json!(rows)))
}

/// File name of an export: `YYYYMMDD_recipe<id>` for the whole history,
/// `<start>_<end>_recipe<id>` (dashes dropped) for a range.
fn export_name(recipe: i64, range: &DateRange, today: chrono::NaiveDate) -> String {
    match range.bounds() {
        Some((start, end)) => format!("{}_{}_recipe{}", start.replace('-', ""), end.replace('-', ""), recipe),
        None => format!("{}_recipe{}", today.format("%Y%m%d"), recipe),
    }
}

async fn export_csv(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let range: DateRange = json_body(&body)?;
    let (sql, values) = daily_ng_query(id, &range);
    let rows = {
        let conn = state.connection().await?;
        conn.query(&sql, &values).await.map_err(ApiError::InvalidRequest)?
    };
    if rows.is_empty() {
        return Err(ApiError::EmptyResult);
    }

    let base = PathBuf::from(format!("{}csv", range.path.as_deref().unwrap_or_default()));
    let name = export_name(id, &range, chrono::Local::now().date_naive());
    let csv = rows_to_csv(&rows, &CSV_COLUMNS).map_err(|e| ApiError::CsvSave(e.to_string()))?;
    let file = save_csv(&base, &name, &csv).map_err(|e| ApiError::CsvSave(e.to_string()))?;
    tracing::info!("History of recipe {} exported to {}", id, file.display());
    Ok(Json(json!({"message": file.display().to_string()})))
}

#[derive(Debug, Deserialize)]
struct NewHistory {
    recipe_no: Option<i64>,
    item_no: Option<i64>,
    lane1: Option<i64>,
    lane2: Option<i64>,
    lane3: Option<i64>,
    lane4: Option<i64>,
    lane5: Option<i64>,
    lane6: Option<i64>,
    created_t: Option<String>,
}

/// Lanes left out of the body read as `-1`, the time as `now()`.
const INSERT_HISTORY_SQL: &str = "INSERT INTO history(recipe_no, item_no, lane1, lane2, lane3, lane4, lane5, lane6, created_t) \
     VALUES ($1, $2, COALESCE($3::int2, -1), COALESCE($4::int2, -1), COALESCE($5::int2, -1), \
             COALESCE($6::int2, -1), COALESCE($7::int2, -1), COALESCE($8::int2, -1), \
             COALESCE($9::timestamp, now())) \
     RETURNING *";

async fn create_history(State(state): State<ApiState>, body: Bytes) -> Result<(StatusCode, Json<Value>), ApiError> {
    let h: NewHistory = json_body(&body)?;
    let values = [
        SqlValue::from(h.recipe_no),
        SqlValue::from(h.item_no),
        SqlValue::from(h.lane1),
        SqlValue::from(h.lane2),
        SqlValue::from(h.lane3),
        SqlValue::from(h.lane4),
        SqlValue::from(h.lane5),
        SqlValue::from(h.lane6),
        SqlValue::from(h.created_t),
    ];

    let conn = state.connection().await?;
    let rows = conn
        .query(INSERT_HISTORY_SQL, &values)
        .await
        .map_err(ApiError::InvalidRequest)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({"message": "History created", "history": first_row(rows)})),
    ))
}

async fn delete_history(State(state): State<ApiState>, Path(id): Path<i64>) -> Result<Json<Value>, ApiError> {
    let conn = state.connection().await?;
    let rows = conn
        .query("DELETE FROM history WHERE idx = $1 RETURNING *", &[SqlValue::Int(id)])
        .await
        .map_err(ApiError::InvalidRequest)?;
    let row = first_row(rows).ok_or(ApiError::NotFound("history"))?;
    Ok(Json(json!({"message": "History deleted", "deletedHistory": row})))
}
