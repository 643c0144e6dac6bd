use super::logrecord::ErrorRecord;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// File name of the append-only log inside the error directory.
pub const LOCAL_LOG_FILE: &str = "log.txt";

/// # Local Error Log
///
/// The last-resort error destination: an append-only text file that is used
/// when the store itself is unreachable, and for reports that are never meant
/// to be durable (malformed client frames).
///
/// Writes are synchronous and best-effort. A failure to write is printed to
/// stderr and otherwise ignored; this type never returns an error.
#[derive(Debug, Clone)]
pub struct LocalErrorLog {
    /// Directory holding the log file. Created on first write.
    dir: PathBuf,
}

impl LocalErrorLog {
    /// Creates a log rooted at `dir`. Nothing is touched on disk yet.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Full path of the log file.
    pub fn path(&self) -> PathBuf {
        self.dir.join(LOCAL_LOG_FILE)
    }

    /// Directory holding the log file.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Appends one record, creating the directory if needed.
    pub fn append(&self, record: &ErrorRecord) {
        if let Err(e) = std::fs::create_dir_all(&self.dir) {
            eprintln!("Error creating error log directory {}: {}", self.dir.display(), e);
            return;
        }
        let path = self.path();
        let written = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .and_then(|mut file| file.write_all(record.local_line().as_bytes()));
        if let Err(e) = written {
            eprintln!("Failed to write to log file {}: {}", path.display(), e);
        }
    }
}
