use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde_json::{Map, Value, json};

use super::{ApiError, ApiState, field, first_row, json_body, update_clause};
use lib_common::connections::SqlValue;

/// Columns a PATCH may write.
const SETTING_COLUMNS: [&str; 8] = ["output_cnt", "title", "exp_white", "exp_brown", "y1", "y2", "y3", "y4"];

/// The line keeps a single settings row.
const SETTING_IDX: i64 = 1;

pub fn routes() -> Router<ApiState> {
    Router::new()
        .route("/", get(get_setting).patch(patch_setting))
        .route("/initialize", get(initialize))
}

/// The settings row, or `200` with an empty body while the table is empty.
async fn get_setting(State(state): State<ApiState>) -> Result<Response, ApiError> {
    let conn = state.connection().await?;
    let rows = conn
        .query("SELECT * FROM setting ORDER BY idx LIMIT 1", &[])
        .await
        .map_err(ApiError::Query)?;
    Ok(match first_row(rows) {
        Some(row) => Json(Value::Object(row)).into_response(),
        None => StatusCode::OK.into_response(),
    })
}

/// Exposure column for a recipe type.
fn exposure_column(recipe_type: &str) -> Option<&'static str> {
    match recipe_type.to_ascii_lowercase().as_str() {
        "white" => Some("exp_white"),
        "brown" => Some("exp_brown"),
        _ => None,
    }
}

/// Everything the vision side needs to start grading: the selected recipe
/// and the camera/exposure settings for its egg type.
async fn initialize(State(state): State<ApiState>) -> Result<Json<Value>, ApiError> {
    let conn = state.connection().await?;
    let selected = conn
        .query(r#"SELECT idx, type, weight FROM recipe WHERE "selected" = true"#, &[])
        .await
        .map_err(ApiError::Query)?;
    let [recipe] = selected.as_slice() else {
        return Err(ApiError::NothingSelected);
    };

    let recipe_type = field(recipe, "type");
    let column = recipe_type
        .as_str()
        .and_then(exposure_column)
        .ok_or_else(|| ApiError::InvalidValue(format!("unknown recipe type {}", recipe_type)))?;

    let sql = format!(
        "SELECT output_cnt, {} AS exposure, y1, y2, y3, y4 FROM setting ORDER BY idx LIMIT 1",
        column
    );
    let rows = conn.query(&sql, &[]).await.map_err(ApiError::Query)?;
    let setting = first_row(rows).ok_or(ApiError::NotFound("setting"))?;

    Ok(Json(json!({
        "RECIPE_IDX": field(recipe, "idx"),
        "RECIPE_NET": field(recipe, "weight"),
        "CAM1": [field(&setting, "y1"), field(&setting, "y2")],
        "CAM2": [field(&setting, "y3"), field(&setting, "y4")],
        "EXPOSURE": field(&setting, "exposure"),
        "COUNTER": field(&setting, "output_cnt"),
    })))
}

async fn patch_setting(State(state): State<ApiState>, body: Bytes) -> Result<Json<Value>, ApiError> {
    let updates: Map<String, Value> = json_body(&body)?;
    let (set, mut values) = update_clause(&updates, &SETTING_COLUMNS)?;
    values.push(SqlValue::Int(SETTING_IDX));
    let sql = format!("UPDATE setting SET {} WHERE idx = ${} RETURNING *", set, values.len());

    let conn = state.connection().await?;
    let rows = conn.query(&sql, &values).await.map_err(ApiError::InvalidRequest)?;
    let row = first_row(rows).ok_or(ApiError::NotFound("setting"))?;
    Ok(Json(Value::Object(row)))
}
