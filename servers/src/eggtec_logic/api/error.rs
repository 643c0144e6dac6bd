use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use lib_common::connections::StoreError;
use lib_common::loggers::Severity;
use serde_json::json;

/// # API Error
///
/// Every way a REST handler can fail. The response carries a
/// [`FailureReport`] extension which the reporting middleware forwards to
/// the error sink with the request's method and path as origin.
#[derive(Debug)]
pub enum ApiError {
    /// The pool handed out no connection.
    Pool(StoreError),
    /// A read failed on the store side.
    Query(StoreError),
    /// A write or a parameterized read was rejected by the store.
    InvalidRequest(StoreError),
    /// The body named a column that may not be written.
    UnknownColumn(String),
    /// The body was valid JSON but not usable.
    InvalidValue(String),
    /// A PATCH body with nothing to update.
    NoUpdates,
    NotFound(&'static str),
    /// Zero or several recipes are marked as selected.
    NothingSelected,
    Fs(String),
    CsvSave(String),
    EmptyResult,
}

/// What the reporting middleware needs to know about a failed request.
#[derive(Debug, Clone)]
pub struct FailureReport {
    pub severity: Severity,
    pub detail: String,
    /// `false` for failures that must not touch the store again.
    pub durable: bool,
}

impl ApiError {
    fn report(&self) -> Option<FailureReport> {
        let (severity, durable) = match self {
            ApiError::Pool(_) => (Severity::PoolConnectFailed, false),
            ApiError::Query(_) | ApiError::InvalidRequest(_) => (Severity::QueryFailed, true),
            ApiError::NothingSelected => (Severity::NothingSelected, true),
            ApiError::Fs(_) => (Severity::FsError, true),
            ApiError::CsvSave(_) | ApiError::EmptyResult => (Severity::CsvSaveFailed, true),
            ApiError::UnknownColumn(_) | ApiError::InvalidValue(_) => (Severity::InvalidValue, true),
            ApiError::NoUpdates | ApiError::NotFound(_) => return None,
        };
        Some(FailureReport {
            severity,
            detail: self.to_string(),
            durable,
        })
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::Pool(e) | ApiError::Query(e) | ApiError::InvalidRequest(e) => write!(f, "{}", e),
            ApiError::UnknownColumn(c) => write!(f, "unknown column '{}'", c),
            ApiError::InvalidValue(s) => write!(f, "{}", s),
            ApiError::NoUpdates => write!(f, "no fields to update"),
            ApiError::NotFound(what) => write!(f, "{} not found", what),
            ApiError::NothingSelected => write!(f, "expected exactly one selected recipe"),
            ApiError::Fs(s) | ApiError::CsvSave(s) => write!(f, "{}", s),
            ApiError::EmptyResult => write!(f, "Empty query result"),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ApiError::Pool(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({"message": "Database Connection Error"}),
            ),
            ApiError::Query(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({"message": "Query Failed", "error": e.to_string()}),
            ),
            ApiError::InvalidRequest(e) => (
                StatusCode::BAD_REQUEST,
                json!({"message": "Invalid Request", "error": e.to_string()}),
            ),
            ApiError::UnknownColumn(_) | ApiError::InvalidValue(_) => (
                StatusCode::BAD_REQUEST,
                json!({"message": "Invalid Request", "error": self.to_string()}),
            ),
            ApiError::NoUpdates => (StatusCode::BAD_REQUEST, json!({"message": self.to_string()})),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, json!({"message": self.to_string()})),
            ApiError::NothingSelected => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({"message": "nothing selected"}),
            ),
            ApiError::Fs(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({"message": "fs error", "error": e}),
            ),
            ApiError::CsvSave(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({"message": "File Save Error", "error": e}),
            ),
            ApiError::EmptyResult => (
                StatusCode::NOT_FOUND,
                json!({"message": "Invalid Request", "error": "Empty query result"}),
            ),
        };
        let report = self.report();
        let mut response = (status, Json(body)).into_response();
        if let Some(report) = report {
            response.extensions_mut().insert(report);
        }
        response
    }
}
