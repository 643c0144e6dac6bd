use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    routing::get,
};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::path::Path as FsPath;

use super::{ApiError, ApiState, first_row, json_body, update_clause};
use lib_common::connections::SqlValue;

/// Columns a PATCH may write.
const RECIPE_COLUMNS: [&str; 4] = ["nickname", "type", "weight", "selected"];

pub fn routes() -> Router<ApiState> {
    Router::new()
        .route("/", get(list_recipes).post(create_recipe))
        .route("/model", get(list_models))
        .route("/{id}", get(get_recipe).patch(patch_recipe).delete(delete_recipe))
}

#[derive(Debug, Deserialize)]
struct NewRecipe {
    idx: Option<i64>,
    nickname: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    weight: Option<String>,
}

/// The file name part of a model path, whichever separator the client used.
fn weight_file_name(weight: &str) -> &str {
    weight.rsplit(['/', '\\', ':']).next().unwrap_or(weight)
}

/// Names in `dir` containing `.net`, sorted. Backups such as `white.net.bak`
/// are listed too; the vision host picks the file.
pub(crate) fn list_net_files(dir: &FsPath) -> Result<Vec<String>, ApiError> {
    if !dir.is_dir() {
        return Err(ApiError::Fs(format!("no such directory '{}'", dir.display())));
    }
    let pattern = format!("{}/*", glob::Pattern::escape(&dir.to_string_lossy()));
    let entries = glob::glob(&pattern).map_err(|e| ApiError::Fs(e.to_string()))?;

    let mut names = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| ApiError::Fs(e.to_string()))?;
        if let Some(name) = path.file_name().map(|n| n.to_string_lossy()) {
            if name.contains(".net") {
                names.push(name.into_owned());
            }
        }
    }
    names.sort();
    Ok(names)
}

async fn list_recipes(State(state): State<ApiState>) -> Result<Json<Value>, ApiError> {
    let conn = state.connection().await?;
    let rows = conn
        .query("SELECT * FROM recipe ORDER BY idx", &[])
        .await
        .map_err(ApiError::Query)?;
    Ok(Json(json!(rows)))
}

async fn list_models(State(state): State<ApiState>) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(list_net_files(&state.net_dir)?))
}

async fn get_recipe(State(state): State<ApiState>, Path(id): Path<i64>) -> Result<Json<Value>, ApiError> {
    let conn = state.connection().await?;
    let rows = conn
        .query("SELECT * FROM recipe WHERE idx = $1", &[SqlValue::Int(id)])
        .await
        .map_err(ApiError::InvalidRequest)?;
    let row = first_row(rows).ok_or(ApiError::NotFound("recipe"))?;
    Ok(Json(Value::Object(row)))
}

async fn create_recipe(State(state): State<ApiState>, body: Bytes) -> Result<(StatusCode, Json<Value>), ApiError> {
    let recipe: NewRecipe = json_body(&body)?;
    let weight = recipe
        .weight
        .as_deref()
        .map(weight_file_name)
        .ok_or_else(|| ApiError::InvalidValue("weight is required".into()))?;
    let values = [
        SqlValue::from(recipe.idx),
        SqlValue::from(recipe.nickname),
        SqlValue::from(recipe.kind),
        SqlValue::from(weight),
    ];

    let conn = state.connection().await?;
    let rows = conn
        .query(
            "INSERT INTO recipe (idx, nickname, type, weight) VALUES ($1, $2, $3, $4) RETURNING *",
            &values,
        )
        .await
        .map_err(ApiError::InvalidRequest)?;
    tracing::info!("Recipe {:?} created", recipe.idx);
    Ok((
        StatusCode::CREATED,
        Json(json!({"message": "Recipe created", "recipe": first_row(rows)})),
    ))
}

async fn patch_recipe(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let updates: Map<String, Value> = json_body(&body)?;
    let (set, mut values) = update_clause(&updates, &RECIPE_COLUMNS)?;
    values.push(SqlValue::Int(id));
    let sql = format!("UPDATE recipe SET {} WHERE idx = ${} RETURNING *", set, values.len());

    let conn = state.connection().await?;
    let rows = conn.query(&sql, &values).await.map_err(ApiError::InvalidRequest)?;
    let row = first_row(rows).ok_or(ApiError::NotFound("recipe"))?;
    Ok(Json(Value::Object(row)))
}

async fn delete_recipe(State(state): State<ApiState>, Path(id): Path<i64>) -> Result<Json<Value>, ApiError> {
    let conn = state.connection().await?;
    let rows = conn
        .query("DELETE FROM recipe WHERE idx = $1 RETURNING *", &[SqlValue::Int(id)])
        .await
        .map_err(ApiError::InvalidRequest)?;
    let row = first_row(rows).ok_or(ApiError::NotFound("recipe"))?;
    Ok(Json(json!({"message": "Recipe deleted", "deletedRecipe": row})))
}
