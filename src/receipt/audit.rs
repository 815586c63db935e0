//! Append-only, per-day audit log of receipt decisions.
//!
//! One plain-text file per local calendar day (`logs/YYYY-MM-DD.txt`). Each
//! call appends one fixed-format block; nothing is ever rewritten.

use std::path::PathBuf;

use chrono::{DateTime, Local};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::error;

use crate::error::AuditError;
use crate::receipt::types::ValidationResult;

const SEPARATOR: &str = "-------------------------------";

/// Writes receipt decisions to the daily audit file.
pub struct AuditLogger {
    logs_dir: PathBuf,
    /// Serializes appends so blocks from concurrent reviews never interleave.
    write_lock: Mutex<()>,
}

impl AuditLogger {
    pub fn new(logs_dir: impl Into<PathBuf>) -> Self {
        Self {
            logs_dir: logs_dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Path of the log file for the day containing `at`.
    pub fn file_for(&self, at: DateTime<Local>) -> PathBuf {
        self.logs_dir.join(format!("{}.txt", at.format("%Y-%m-%d")))
    }

    /// Record a decision. Failures are reported through tracing only.
    pub async fn record(&self, subject: &str, result: &ValidationResult) {
        if let Err(e) = self.try_record(subject, result).await {
            error!(subject = %subject, error = %e, "Failed to write audit entry");
        }
    }

    /// Record a decision stamped with the current local time.
    pub async fn try_record(
        &self,
        subject: &str,
        result: &ValidationResult,
    ) -> Result<PathBuf, AuditError> {
        self.try_record_at(subject, result, Local::now()).await
    }

    /// Record a decision stamped with `at`, returning the file written.
    pub async fn try_record_at(
        &self,
        subject: &str,
        result: &ValidationResult,
        at: DateTime<Local>,
    ) -> Result<PathBuf, AuditError> {
        let path = self.file_for(at);
        let entry = format_entry(subject, result, at);

        let _guard = self.write_lock.lock().await;

        fs::create_dir_all(&self.logs_dir)
            .await
            .map_err(|source| AuditError::CreateDir {
                path: self.logs_dir.clone(),
                source,
            })?;

        let append_err = |source| AuditError::Append {
            path: path.clone(),
            source,
        };
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(append_err)?;
        file.write_all(entry.as_bytes()).await.map_err(append_err)?;
        file.flush().await.map_err(append_err)?;

        Ok(path)
    }
}

/// Render one audit block.
pub fn format_entry(subject: &str, result: &ValidationResult, at: DateTime<Local>) -> String {
    format!(
        "\nDate: {}\nContact: {}\nResult: {}\nReason: {}\n{}\n",
        at.format("%Y-%m-%d %H:%M:%S"),
        subject,
        result.label(),
        result.reason,
        SEPARATOR,
    )
}
