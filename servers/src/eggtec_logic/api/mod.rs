//! # REST API
//!
//! The configuration and history endpoints used by the line's front end:
//! `/apis/setting`, `/apis/recipe` and `/apis/history`. Every handler works
//! on one pooled connection for the whole request. Failures are turned into
//! JSON bodies by [`ApiError`] and forwarded to the error sink by the
//! [`report_failures`] middleware.

pub mod csv_export;
pub mod error;
pub mod history;
pub mod recipe;
pub mod setting;

use axum::{
    Router,
    body::Bytes,
    extract::{Request, State},
    http::Method,
    middleware::{self, Next},
    response::Response,
    routing::get,
};
use lib_common::connections::{QueryExecutor, Row, RowSet, SqlValue, StoreConnection};
use lib_common::loggers::ErrorSink;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};

pub use error::{ApiError, FailureReport};

/// Shared by every REST handler.
#[derive(Clone)]
pub struct ApiState {
    pub executor: Arc<dyn QueryExecutor>,
    pub sink: Arc<dyn ErrorSink>,
    /// Where the `*.net` model files live.
    pub net_dir: PathBuf,
}

impl ApiState {
    pub fn new(executor: Arc<dyn QueryExecutor>, sink: Arc<dyn ErrorSink>, net_dir: impl Into<PathBuf>) -> Self {
        Self {
            executor,
            sink,
            net_dir: net_dir.into(),
        }
    }

    /// One connection for the duration of a request.
    pub async fn connection(&self) -> Result<Box<dyn StoreConnection>, ApiError> {
        self.executor.acquire().await.map_err(ApiError::Pool)
    }
}

pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers(Any);

    Router::new()
        .route("/", get(root_handler))
        .nest("/apis/setting", setting::routes())
        .nest("/apis/recipe", recipe::routes())
        .nest("/apis/history", history::routes())
        .layer(middleware::from_fn_with_state(state.clone(), report_failures))
        .layer(cors)
        .with_state(state)
}

/// Serves the REST API until the shutdown broadcast fires.
pub async fn serve(
    listener: TcpListener,
    state: ApiState,
    mut shutdown: broadcast::Receiver<()>,
) -> std::io::Result<()> {
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            shutdown.recv().await.ok();
            tracing::info!("REST API shutting down.");
        })
        .await
}

async fn root_handler() -> &'static str {
    "Egg monitor API is running"
}

/// Forwards the [`FailureReport`] of a failed response to the error sink,
/// with `"<METHOD> <uri>"` as origin.
async fn report_failures(State(state): State<ApiState>, request: Request, next: Next) -> Response {
    let origin = format!("{} {}", request.method(), request.uri());
    tracing::debug!("Received request: {}", origin);

    let response = next.run(request).await;
    if let Some(report) = response.extensions().get::<FailureReport>() {
        tracing::warn!(origin = %origin, status = %response.status(), "{}", report.detail);
        if report.durable {
            state.sink.report(&origin, report.severity, &report.detail).await;
        } else {
            state.sink.report_local(&origin, report.severity, &report.detail);
        }
    }
    response
}

/// Decodes a JSON request body. An empty body reads as `{}`.
pub(crate) fn json_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    let raw: &[u8] = if body.iter().all(u8::is_ascii_whitespace) {
        b"{}"
    } else {
        body
    };
    serde_json::from_slice(raw).map_err(|e| ApiError::InvalidValue(format!("invalid json body: {}", e)))
}

/// Builds the `SET` list of an UPDATE from a PATCH body.
///
/// Only columns in `allowed` may appear; placeholders start at `$1` and the
/// caller appends the key parameter after the returned values.
pub(crate) fn update_clause(
    updates: &Map<String, Value>,
    allowed: &[&str],
) -> Result<(String, Vec<SqlValue>), ApiError> {
    if updates.is_empty() {
        return Err(ApiError::NoUpdates);
    }
    let mut sets = Vec::with_capacity(updates.len());
    let mut values = Vec::with_capacity(updates.len() + 1);
    for (key, value) in updates {
        if !allowed.contains(&key.as_str()) {
            return Err(ApiError::UnknownColumn(key.clone()));
        }
        values.push(SqlValue::from(value.clone()));
        sets.push(format!("\"{}\" = ${}", key, values.len()));
    }
    Ok((sets.join(", "), values))
}

pub(crate) fn first_row(rows: RowSet) -> Option<Row> {
    rows.into_iter().next()
}

/// A column of `row`, or null when absent.
pub(crate) fn field(row: &Row, key: &str) -> Value {
    row.get(key).cloned().unwrap_or(Value::Null)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::StatusCode;
    use lib_common::connections::StoreError;
    use lib_common::loggers::Severity;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tower::ServiceExt;

    pub type Calls = Arc<Mutex<Vec<(String, Vec<SqlValue>)>>>;

    /// Answers statements from a queue of canned replies; an empty queue
    /// answers with no rows.
    #[derive(Default)]
    pub struct ScriptedStore {
        pub down: bool,
        pub replies: Arc<Mutex<VecDeque<Result<RowSet, StoreError>>>>,
        pub calls: Calls,
    }

    impl ScriptedStore {
        pub fn with_replies(replies: Vec<Result<RowSet, StoreError>>) -> Self {
            Self {
                replies: Arc::new(Mutex::new(replies.into())),
                ..Default::default()
            }
        }
    }

    struct ScriptedConnection {
        replies: Arc<Mutex<VecDeque<Result<RowSet, StoreError>>>>,
        calls: Calls,
    }

    #[async_trait]
    impl QueryExecutor for ScriptedStore {
        async fn acquire(&self) -> Result<Box<dyn StoreConnection>, StoreError> {
            if self.down {
                return Err(StoreError::ConnectionUnavailable("connection refused".into()));
            }
            Ok(Box::new(ScriptedConnection {
                replies: self.replies.clone(),
                calls: self.calls.clone(),
            }))
        }
    }

    #[async_trait]
    impl StoreConnection for ScriptedConnection {
        async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<RowSet, StoreError> {
            self.calls.lock().unwrap().push((sql.to_string(), params.to_vec()));
            self.replies.lock().unwrap().pop_front().unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    #[derive(Default)]
    pub struct MemorySink {
        pub reports: Mutex<Vec<(String, Severity, bool)>>,
    }

    #[async_trait]
    impl ErrorSink for MemorySink {
        async fn report(&self, origin: &str, severity: Severity, _detail: &str) {
            self.reports.lock().unwrap().push((origin.into(), severity, true));
        }

        fn report_local(&self, origin: &str, severity: Severity, _detail: &str) {
            self.reports.lock().unwrap().push((origin.into(), severity, false));
        }
    }

    pub fn rows(value: Value) -> RowSet {
        value
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r.as_object().cloned().unwrap())
            .collect()
    }

    pub fn app(store: ScriptedStore, net_dir: impl Into<PathBuf>) -> (Router, Calls, Arc<MemorySink>) {
        let calls = store.calls.clone();
        let sink = Arc::new(MemorySink::default());
        let state = ApiState::new(Arc::new(store), sink.clone(), net_dir);
        (router(state), calls, sink)
    }

    /// Sends one request through the router; non-JSON bodies come back as a
    /// JSON string.
    pub async fn send(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = axum::http::Request::builder().method(method).uri(uri);
        let body = match body {
            Some(v) => {
                builder = builder.header("content-type", "application/json");
                Body::from(v.to_string())
            }
            None => Body::empty(),
        };
        let response = app.oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
        (status, value)
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use axum::http::StatusCode;
    use lib_common::loggers::Severity;
    use serde_json::json;

    #[test]
    fn test_update_clause_numbers_placeholders_and_rejects_unknown_columns() {
        let body = json!({"title": "line A", "y1": 2}).as_object().cloned().unwrap();
        let (set, values) = update_clause(&body, &["title", "y1"]).unwrap();
        assert_eq!(set, r#""title" = $1, "y1" = $2"#);
        assert_eq!(values, vec![SqlValue::Text("line A".into()), SqlValue::Int(2)]);

        let body = json!({"idx": 9}).as_object().cloned().unwrap();
        assert!(matches!(update_clause(&body, &["title"]), Err(ApiError::UnknownColumn(c)) if c == "idx"));
        assert!(matches!(update_clause(&Map::new(), &["title"]), Err(ApiError::NoUpdates)));
    }

    #[test]
    fn test_empty_body_reads_as_empty_object() {
        let map: Map<String, Value> = json_body(&Bytes::from_static(b"  ")).unwrap();
        assert!(map.is_empty());
        assert!(json_body::<Map<String, Value>>(&Bytes::from_static(b"{oops")).is_err());
    }

    #[tokio::test]
    async fn test_root_answers_without_the_store() {
        let store = ScriptedStore {
            down: true,
            ..Default::default()
        };
        let (app, _, _) = app(store, "/nonexistent");
        let (status, body) = send(app, "GET", "/", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!("Egg monitor API is running"));
    }

    #[tokio::test]
    async fn test_pool_outage_is_reported_locally_with_request_origin() {
        let store = ScriptedStore {
            down: true,
            ..Default::default()
        };
        let (app, _, sink) = app(store, "/nonexistent");
        let (status, body) = send(app, "GET", "/apis/recipe", None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "Database Connection Error");

        let reports = sink.reports.lock().unwrap();
        assert_eq!(
            reports.as_slice(),
            &[("GET /apis/recipe".to_string(), Severity::PoolConnectFailed, false)]
        );
    }
}
