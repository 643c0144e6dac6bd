//! # Error Sink
//!
//! Operational errors go to the store's `error` table first and fall back to
//! the [`LocalErrorLog`] when the store cannot take them. Reporting never
//! fails from the caller's point of view.

use async_trait::async_trait;
use std::sync::Arc;

use super::loggerlocal::LocalErrorLog;
use super::logrecord::{ErrorRecord, Severity};
use crate::connections::{QueryExecutor, SqlValue};

const INSERT_ERROR_SQL: &str = "INSERT INTO error(type, message) VALUES($1, $2)";

/// Origin used when the sink has to record its own failures.
const SINK_ORIGIN: &str = "errorLog";

/// Destination for operational errors.
#[async_trait]
pub trait ErrorSink: Send + Sync {
    /// Records an error durably, falling back to the local log.
    async fn report(&self, origin: &str, severity: Severity, detail: &str);

    /// Records an error in the local log only.
    fn report_local(&self, origin: &str, severity: Severity, detail: &str);
}

/// The production sink: the `error` table, then `log.txt`.
pub struct StoreErrorSink {
    executor: Arc<dyn QueryExecutor>,
    local: LocalErrorLog,
}

impl StoreErrorSink {
    pub fn new(executor: Arc<dyn QueryExecutor>, local: LocalErrorLog) -> Self {
        Self { executor, local }
    }

    /// The fallback log this sink writes to.
    pub fn local(&self) -> &LocalErrorLog {
        &self.local
    }
}

#[async_trait]
impl ErrorSink for StoreErrorSink {
    async fn report(&self, origin: &str, severity: Severity, detail: &str) {
        let record = ErrorRecord::now(origin, severity, detail);
        tracing::error!(origin = %origin, code = severity.code(), "{}: {}", severity, detail);

        let conn = match self.executor.acquire().await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!("Error sink could not reach the store, writing locally: {}", e);
                self.local.append(&record);
                self.local.append(&ErrorRecord::now(SINK_ORIGIN, Severity::PoolConnectFailed, &e.to_string()));
                return;
            }
        };
        let params = [SqlValue::from(origin), SqlValue::from(record.durable_message())];
        if let Err(e) = conn.query(INSERT_ERROR_SQL, &params).await {
            tracing::warn!("Error sink insert failed, writing locally: {}", e);
            self.local.append(&record);
            self.local.append(&ErrorRecord::now(SINK_ORIGIN, Severity::QueryFailed, &e.to_string()));
        }
    }

    fn report_local(&self, origin: &str, severity: Severity, detail: &str) {
        tracing::warn!(origin = %origin, code = severity.code(), "{}: {}", severity, detail);
        self.local.append(&ErrorRecord::now(origin, severity, detail));
    }
}
