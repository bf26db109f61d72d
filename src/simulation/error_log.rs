use crate::core::{ErrorRecord, Result};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Files written by [`ErrorLog::persist`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorLogPaths {
    pub summary: PathBuf,
    pub detail: PathBuf,
}

/// Append-only sink for failures raised by concurrent workers
#[derive(Debug, Default)]
pub struct ErrorLog {
    records: Mutex<Vec<ErrorRecord>>,
}

impl ErrorLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, record: ErrorRecord) {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(record);
    }

    pub fn count(&self) -> usize {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn snapshot(&self) -> Vec<ErrorRecord> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Failure counts grouped by action and error class
    ///
    /// The class is the message up to its first `:`, so "Rate limited: user#3
    /// ..." and "Rate limited: user#9 ..." land in one bucket.
    pub fn summary(&self) -> BTreeMap<(String, String), usize> {
        let mut groups = BTreeMap::new();
        for record in self.snapshot() {
            let class = record
                .message
                .split_once(':')
                .map(|(head, _)| head)
                .unwrap_or(&record.message)
                .to_string();
            *groups.entry((record.action, class)).or_insert(0) += 1;
        }
        groups
    }

    /// Append both views to `<dir>/<profile>_<timestamp>_errors_{summary,detail}.log`
    pub fn persist(&self, dir: &Path, profile: &str, started_at: DateTime<Utc>) -> Result<ErrorLogPaths> {
        std::fs::create_dir_all(dir)?;
        let stem = format!("{}_{}", profile, started_at.format("%Y%m%d_%H%M%S"));
        let paths = ErrorLogPaths {
            summary: dir.join(format!("{}_errors_summary.log", stem)),
            detail: dir.join(format!("{}_errors_detail.log", stem)),
        };

        let records = self.snapshot();

        let mut summary = BufWriter::new(OpenOptions::new().create(true).append(true).open(&paths.summary)?);
        writeln!(summary, "profile: {}", profile)?;
        writeln!(summary, "started_at: {}", started_at.to_rfc3339())?;
        writeln!(summary, "total_errors: {}", records.len())?;
        for ((action, class), count) in self.summary() {
            writeln!(summary, "{:>8}  {:<18} {}", count, action, class)?;
        }
        summary.flush()?;

        let mut detail = BufWriter::new(OpenOptions::new().create(true).append(true).open(&paths.detail)?);
        for record in &records {
            let line = serde_json::to_string(record).map_err(std::io::Error::other)?;
            writeln!(detail, "{}", line)?;
        }
        detail.flush()?;

        Ok(paths)
    }
}
