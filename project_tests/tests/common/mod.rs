//! In-memory stand-ins for the results store and the error sink.
#![allow(dead_code)]

use async_trait::async_trait;
use lib_common::aggregation::{AggregationQueryService, ResultEncoding};
use lib_common::channels::ChannelDeps;
use lib_common::connections::{QueryExecutor, Row, RowSet, SqlValue, StoreConnection, StoreError};
use lib_common::core::Outbound;
use lib_common::loggers::{ErrorSink, Severity};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Semaphore, mpsc};

pub const PERIOD: Duration = Duration::from_millis(3000);

/// Today's lane events `(lane, code)` plus the error table, behind the
/// statements the channels issue. Lane code `0` is OK, anything else NG.
#[derive(Default)]
pub struct LineStore {
    pub events: Mutex<Vec<(i64, i64)>>,
    pub errors: Mutex<Vec<Vec<SqlValue>>>,
    /// Every statement, in order: `"insert"` or `"rollup"`.
    pub log: Mutex<Vec<String>>,
    pub down: AtomicBool,
    pub fail_insert: AtomicBool,
    pub fail_rollup: AtomicBool,
    pub held: AtomicUsize,
    /// When set, every rollup statement waits for a permit first.
    pub gate: Mutex<Option<Arc<Semaphore>>>,
}

impl LineStore {
    pub fn with_events(events: Vec<(i64, i64)>) -> Arc<Self> {
        let store = Self::default();
        *store.events.lock().unwrap() = events;
        Arc::new(store)
    }

    /// Holds rollup statements until permits are added to the returned gate.
    pub fn hold_rollups(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    fn rollup_row(lane_no: Value, events: &[i64]) -> Row {
        let ok = events.iter().filter(|code| **code == 0).count() as i64;
        let ng = events.len() as i64 - ok;
        json!({"lane_no": lane_no, "ng_count_today": ng, "ok_count_today": ok, "total": ng + ok})
            .as_object()
            .cloned()
            .unwrap()
    }

    fn answer(&self, sql: &str, params: &[SqlValue]) -> Result<RowSet, StoreError> {
        if sql.starts_with("INSERT INTO error") {
            self.log.lock().unwrap().push("insert".into());
            if self.fail_insert.load(Ordering::SeqCst) {
                return Err(StoreError::QueryFailed("value too long for type character varying".into()));
            }
            self.errors.lock().unwrap().push(params.to_vec());
            return Ok(vec![json!({"idx": 1}).as_object().cloned().unwrap()]);
        }

        self.log.lock().unwrap().push("rollup".into());
        if self.fail_rollup.load(Ordering::SeqCst) {
            return Err(StoreError::QueryFailed("relation \"history\" does not exist".into()));
        }
        let events = self.events.lock().unwrap().clone();
        if sql.contains("'all_total'") {
            let codes: Vec<i64> = events.iter().map(|(_, code)| *code).collect();
            return Ok(vec![Self::rollup_row(json!("all_total"), &codes)]);
        }
        Ok((1..=6)
            .map(|lane| {
                let codes: Vec<i64> = events.iter().filter(|(l, _)| *l == lane).map(|(_, c)| *c).collect();
                Self::rollup_row(json!(lane), &codes)
            })
            .collect())
    }
}

struct LineConnection {
    store: Arc<LineStore>,
}

impl Drop for LineConnection {
    fn drop(&mut self) {
        self.store.held.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Executor over a shared [`LineStore`].
#[derive(Clone)]
pub struct LineExecutor(pub Arc<LineStore>);

#[async_trait]
impl QueryExecutor for LineExecutor {
    async fn acquire(&self) -> Result<Box<dyn StoreConnection>, StoreError> {
        if self.0.down.load(Ordering::SeqCst) {
            return Err(StoreError::ConnectionUnavailable("timeout exceeded when trying to connect".into()));
        }
        self.0.held.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(LineConnection { store: self.0.clone() }))
    }
}

#[async_trait]
impl StoreConnection for LineConnection {
    async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<RowSet, StoreError> {
        let gate = self.store.gate.lock().unwrap().clone();
        if let Some(gate) = gate.filter(|_| !sql.starts_with("INSERT INTO error")) {
            gate.acquire().await.unwrap().forget();
        }
        self.store.answer(sql, params)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub origin: String,
    pub severity: Severity,
    pub durable: bool,
}

#[derive(Default)]
pub struct MemorySink {
    pub reports: Mutex<Vec<Report>>,
}

impl MemorySink {
    pub fn take(&self) -> Vec<Report> {
        std::mem::take(&mut *self.reports.lock().unwrap())
    }
}

#[async_trait]
impl ErrorSink for MemorySink {
    async fn report(&self, origin: &str, severity: Severity, _detail: &str) {
        self.reports.lock().unwrap().push(Report {
            origin: origin.into(),
            severity,
            durable: true,
        });
    }

    fn report_local(&self, origin: &str, severity: Severity, _detail: &str) {
        self.reports.lock().unwrap().push(Report {
            origin: origin.into(),
            severity,
            durable: false,
        });
    }
}

pub fn deps(store: &Arc<LineStore>) -> (ChannelDeps, Arc<MemorySink>) {
    let executor: Arc<dyn QueryExecutor> = Arc::new(LineExecutor(store.clone()));
    let sink = Arc::new(MemorySink::default());
    let deps = ChannelDeps {
        executor: executor.clone(),
        sink: sink.clone(),
        rollups: AggregationQueryService::new(executor, ResultEncoding::LaneCode),
        interval: PERIOD,
    };
    (deps, sink)
}

/// Everything currently queued for one connection.
pub fn drain(rx: &mut mpsc::Receiver<Outbound>) -> Vec<String> {
    let mut out = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        out.push(frame.text().to_string());
    }
    out
}

/// Lets the timer task run: advances paused time by `d` and yields.
pub async fn advance(d: Duration) {
    tokio::time::sleep(d).await;
    tokio::task::yield_now().await;
}
