use chrono::{DateTime, Utc};
use std::fmt;

/// # Severity
///
/// The operational error classes recorded by the line. The numeric codes are
/// the ones operators already know from the error table and the local log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    /// The pool could not hand out a connection.
    PoolConnectFailed = 0,
    /// A statement reached the store and failed there.
    QueryFailed = 1,
    /// Anything the server itself got wrong.
    ServerError = 2,
    /// A client sent something unusable (malformed socket frames included).
    InvalidValue = 3,
    /// Reading or writing the local filesystem failed.
    FsError = 4,
    /// No (or more than one) recipe is marked as selected.
    NothingSelected = 5,
    /// A CSV export could not be written.
    CsvSaveFailed = 6,
}

impl Severity {
    /// The numeric code stored alongside the text.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// The fixed human-readable text for this class.
    pub fn text(self) -> &'static str {
        match self {
            Severity::PoolConnectFailed => "pool-connect failed",
            Severity::QueryFailed => "query failed",
            Severity::ServerError => "server error",
            Severity::InvalidValue => "invalid value",
            Severity::FsError => "fs error",
            Severity::NothingSelected => "nothing selected",
            Severity::CsvSaveFailed => "csv-save failed",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text())
    }
}

/// # Error Record
///
/// One reported operational error, as written to the error table or the
/// local fallback log.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorRecord {
    /// When the report was made (UTC).
    pub ts: DateTime<Utc>,
    /// Where it came from, e.g. `"CAM1 socket"` or `"GET /apis/setting"`.
    pub origin: String,
    /// The error class.
    pub severity: Severity,
    /// The underlying cause, usually the driver's message.
    pub detail: String,
}

impl ErrorRecord {
    /// Creates a record stamped with the current time.
    pub fn now(origin: &str, severity: Severity, detail: &str) -> Self {
        Self {
            ts: Utc::now(),
            origin: origin.to_string(),
            severity,
            detail: detail.to_string(),
        }
    }

    /// The `message` column value for the error table.
    pub fn durable_message(&self) -> String {
        format!("{}: {}", self.severity.text(), self.detail)
    }

    /// One line of the local log, newline included.
    pub fn local_line(&self) -> String {
        format!(
            "[{}] {} - {}: {}\n",
            self.ts.format("%Y-%m-%d %H:%M:%S"),
            self.origin,
            self.severity.text(),
            self.detail
        )
    }
}
