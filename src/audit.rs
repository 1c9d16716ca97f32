//! Audit logging for submissions
//!
//! The filtered change log of every reconciled submission is appended to a
//! JSON-lines file, one event per line, with size-based rotation
//! (max 5MB per file, keep 5 files). The log never blocks a submission:
//! callers use best-effort appends and failures go to tracing.

use crate::ledger::ChangeEntry;
use crate::submit::{SubmissionOutcome, SubmissionReport};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Maximum size for a single log file (5MB)
const MAX_LOG_SIZE: u64 = 5 * 1024 * 1024;

/// Number of rotated log files to keep
const MAX_LOG_FILES: usize = 5;

/// Audit log file name
const AUDIT_LOG_NAME: &str = "change_audit.log";

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Log directory not found")]
    LogDirNotFound,
    #[error("IO error: {0}")]
    Io(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Audit event severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditSeverity {
    Info,
    Warning,
    Error,
}

impl std::fmt::Display for AuditSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Audit event types
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    FieldChanged,
    RecordDeleted,
    SubmissionReconciled,
    ReportEmailed,
    Custom(String),
}

impl std::fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FieldChanged => write!(f, "field_changed"),
            Self::RecordDeleted => write!(f, "record_deleted"),
            Self::SubmissionReconciled => write!(f, "submission_reconciled"),
            Self::ReportEmailed => write!(f, "report_emailed"),
            Self::Custom(s) => write!(f, "custom:{}", s),
        }
    }
}

/// One audit log line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub event: AuditEventType,
    pub severity: AuditSeverity,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
}

impl AuditEvent {
    pub fn new(event: AuditEventType, severity: AuditSeverity, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            event,
            severity,
            message: message.into(),
            context: None,
        }
    }

    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = Some(context);
        self
    }
}

/// Append-only JSON-lines audit log owned by the session
#[derive(Debug)]
pub struct AuditLog {
    log_dir: PathBuf,
}

impl AuditLog {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
        }
    }

    /// Open the default per-user log location, creating it if needed
    pub fn open_default() -> Result<Self, AuditError> {
        let log_dir = dirs::data_dir()
            .map(|d| d.join("CallAudit"))
            .ok_or(AuditError::LogDirNotFound)?;
        fs::create_dir_all(&log_dir).map_err(|e| AuditError::Io(e.to_string()))?;
        Ok(Self { log_dir })
    }

    pub fn log_path(&self) -> PathBuf {
        self.log_dir.join(AUDIT_LOG_NAME)
    }

    fn rotated_path(&self, index: usize) -> PathBuf {
        self.log_dir.join(format!("{}.{}", AUDIT_LOG_NAME, index))
    }

    fn rotate_if_needed(&self) -> Result<(), AuditError> {
        let log_path = self.log_path();
        if !log_path.exists() {
            return Ok(());
        }

        let metadata = fs::metadata(&log_path).map_err(|e| AuditError::Io(e.to_string()))?;
        if metadata.len() < MAX_LOG_SIZE {
            return Ok(());
        }

        for i in (0..MAX_LOG_FILES - 1).rev() {
            let from = if i == 0 {
                self.log_path()
            } else {
                self.rotated_path(i)
            };
            let to = self.rotated_path(i + 1);
            if from.exists() {
                let _ = fs::rename(&from, &to);
            }
        }

        let oldest = self.rotated_path(MAX_LOG_FILES);
        if oldest.exists() {
            let _ = fs::remove_file(&oldest);
        }

        Ok(())
    }

    /// Append a single event
    pub fn append(&self, event: &AuditEvent) -> Result<(), AuditError> {
        self.rotate_if_needed()?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path())
            .map_err(|e| AuditError::Io(e.to_string()))?;

        let mut writer = BufWriter::new(file);
        let line = serde_json::to_string(event)
            .map_err(|e| AuditError::Serialization(e.to_string()))?;
        writeln!(writer, "{}", line).map_err(|e| AuditError::Io(e.to_string()))?;
        writer.flush().map_err(|e| AuditError::Io(e.to_string()))?;
        Ok(())
    }

    /// Append, logging failures instead of returning them
    pub fn append_best_effort(&self, event: AuditEvent) {
        if let Err(e) = self.append(&event) {
            tracing::warn!("audit write failed: {} ({})", e, event.event);
        }
    }

    /// Persist the reconciled submission: one line per surviving change
    /// entry, then a summary line.
    pub fn record_submission(&self, report: &SubmissionReport) {
        for entry in &report.change_log {
            self.append_best_effort(change_event(report, entry));
        }

        let severity = match report.outcome {
            SubmissionOutcome::Success => AuditSeverity::Info,
            SubmissionOutcome::Partial => AuditSeverity::Warning,
            SubmissionOutcome::Failure => AuditSeverity::Error,
        };
        self.append_best_effort(
            AuditEvent::new(
                AuditEventType::SubmissionReconciled,
                severity,
                format!("Submission {} {}", report.run_id, report.outcome),
            )
            .with_context(serde_json::json!({
                "run_id": report.run_id,
                "mode": report.mode,
                "saved": report.saved_ids,
                "deleted": report.deleted_ids,
                "failed_saved": report.failed_saved,
                "failed_deleted": report.failed_deleted,
                "total_submission_count": report.total_submission_count,
            })),
        );
    }

    /// Read every event currently in the active log file (rotated files
    /// excluded); lines that fail to parse are skipped.
    pub fn read_events(&self) -> Result<Vec<AuditEvent>, AuditError> {
        let path = self.log_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&path).map_err(|e| AuditError::Io(e.to_string()))?;
        Ok(content
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect())
    }
}

fn change_event(report: &SubmissionReport, entry: &ChangeEntry) -> AuditEvent {
    let (event, message) = if entry.is_deletion() {
        (
            AuditEventType::RecordDeleted,
            format!("Record {} deleted", entry.record_number),
        )
    } else {
        (
            AuditEventType::FieldChanged,
            format!(
                "Record {} field {} changed",
                entry.record_number,
                entry.field.as_deref().unwrap_or("?")
            ),
        )
    };
    AuditEvent::new(event, AuditSeverity::Info, message).with_context(serde_json::json!({
        "run_id": report.run_id,
        "record_number": entry.record_number,
        "field": entry.field,
        "old_value": entry.old_value,
        "new_value": entry.new_value,
    }))
}

/// Check whether the default audit location is usable (startup diagnostic)
pub fn audit_dir_writable(dir: &Path) -> bool {
    let probe = dir.join(".audit_probe");
    match fs::write(&probe, b"ok") {
        Ok(()) => {
            let _ = fs::remove_file(&probe);
            true
        }
        Err(_) => false,
    }
}
