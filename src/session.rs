//! Session-scoped state container
//!
//! The editor session owns its mutable state explicitly: the change ledger,
//! the active-record pointer, the reviewer cache, and the report cache.
//! Nothing lives in ambient globals, and persistence is an explicit
//! save/load snapshot rather than a side effect of mutation.

use crate::audit::AuditLog;
use crate::error::AppError;
use crate::ledger::{ChangeLedger, EditMode};
use crate::notify::NotificationSink;
use crate::record::{FieldValue, Record, RecordType};
use crate::store::{RecordQuery, RecordStore, StoreError};
use crate::submit::{SubmissionReconciler, SubmissionReport};
use crate::users::{is_admin, resolve_reviewer, Reviewer};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Default staleness window for cached report queries
const DEFAULT_STALENESS: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

#[derive(Debug)]
struct CachedQuery {
    fetched_at: Instant,
    records: Vec<Record>,
}

/// Serialized form of a session, written by `save` and read by `load`
#[derive(Debug, Serialize, Deserialize)]
struct SessionSnapshot {
    email: String,
    ledger: Option<ChangeLedger>,
    active_record: Option<i64>,
    reviewer: Option<Reviewer>,
}

/// Explicit owner of all session-scoped mutable state
#[derive(Debug)]
pub struct SessionState {
    email: String,
    ledger: Mutex<Option<ChangeLedger>>,
    active_record: Mutex<Option<i64>>,
    reviewer: RwLock<Option<Reviewer>>,
    report_cache: Mutex<HashMap<(RecordType, RecordQuery), CachedQuery>>,
    staleness: Duration,
    audit: Option<AuditLog>,
}

impl SessionState {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            ledger: Mutex::new(None),
            active_record: Mutex::new(None),
            reviewer: RwLock::new(None),
            report_cache: Mutex::new(HashMap::new()),
            staleness: DEFAULT_STALENESS,
            audit: None,
        }
    }

    /// Attach an audit log; reconciled submissions are persisted to it
    pub fn with_audit(mut self, audit: AuditLog) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn with_staleness(mut self, staleness: Duration) -> Self {
        self.staleness = staleness;
        self
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    // =========================================================================
    // Editing
    // =========================================================================

    /// Enter edit mode, replacing any previous ledger
    pub fn begin_edit(&self, record_type: RecordType, mode: EditMode) {
        *self.ledger.lock() = Some(ChangeLedger::new(record_type, mode));
    }

    pub fn has_open_edit(&self) -> bool {
        self.ledger.lock().is_some()
    }

    pub fn record_field_change(
        &self,
        record_number: i64,
        field: &str,
        old_value: FieldValue,
        new_value: FieldValue,
    ) -> Result<(), AppError> {
        let mut guard = self.ledger.lock();
        let ledger = guard
            .as_mut()
            .ok_or_else(|| AppError::internal("no edit session open"))?;
        ledger
            .record_field_change(record_number, field, old_value, new_value)
            .map_err(AppError::from)
    }

    pub fn record_deletion(&self, record_number: i64) -> Result<(), AppError> {
        let mut guard = self.ledger.lock();
        let ledger = guard
            .as_mut()
            .ok_or_else(|| AppError::internal("no edit session open"))?;
        ledger.record_deletion(record_number);
        Ok(())
    }

    pub fn add_reason(&self, reason: &str) {
        if let Some(ledger) = self.ledger.lock().as_mut() {
            ledger.add_reason(reason);
        }
    }

    /// "Reset all changes": empty the ledger but stay in edit mode
    pub fn reset_changes(&self) {
        if let Some(ledger) = self.ledger.lock().as_mut() {
            ledger.clear();
        }
    }

    pub fn set_active_record(&self, record_number: Option<i64>) {
        *self.active_record.lock() = record_number;
    }

    pub fn active_record(&self) -> Option<i64> {
        *self.active_record.lock()
    }

    // =========================================================================
    // Submission
    // =========================================================================

    /// Reconcile and persist the pending changes.
    ///
    /// Takes a frozen snapshot of the ledger, resolves the acting reviewer,
    /// runs the reconciler, records the filtered change log to the audit
    /// trail, and destroys the ledger on completion regardless of outcome.
    pub async fn submit_changes<S, N>(
        &self,
        store: &S,
        notifier: &N,
    ) -> Result<SubmissionReport, AppError>
    where
        S: RecordStore,
        N: NotificationSink,
    {
        // snapshot: the reconciler never observes later edits
        let snapshot = self
            .ledger
            .lock()
            .clone()
            .ok_or_else(|| AppError::internal("no edit session open"))?;

        let reviewer = self.current_reviewer(store).await?;

        let mut reconciler = SubmissionReconciler::new();
        let plan = reconciler.build_plan(&snapshot, &reviewer)?;
        let report = reconciler.submit(plan, store, notifier).await;

        if let Some(audit) = &self.audit {
            audit.record_submission(&report);
        }

        // submission completion destroys the change set
        *self.ledger.lock() = None;
        self.invalidate_reports();

        Ok(report)
    }

    // =========================================================================
    // Reviewer cache
    // =========================================================================

    /// Resolve the session's reviewer, fetching at most once per session.
    /// The admin account never hits the store.
    pub async fn current_reviewer<S: RecordStore>(
        &self,
        store: &S,
    ) -> Result<Reviewer, StoreError> {
        if let Some(reviewer) = self.reviewer.read().clone() {
            return Ok(reviewer);
        }
        let reviewer = if is_admin(&self.email) {
            Reviewer::admin()
        } else {
            let user = store.fetch_user(&self.email).await?;
            resolve_reviewer(&self.email, &user)
        };
        *self.reviewer.write() = Some(reviewer.clone());
        Ok(reviewer)
    }

    /// Drop the cached reviewer; the next lookup refetches
    pub fn invalidate_reviewer(&self) {
        *self.reviewer.write() = None;
    }

    // =========================================================================
    // Report query cache
    // =========================================================================

    /// Fetch records through the staleness-window cache. A hit younger than
    /// the window is served as-is; anything older is refetched.
    pub async fn fetch_cached<S: RecordStore>(
        &self,
        store: &S,
        record_type: RecordType,
        query: &RecordQuery,
    ) -> Result<Vec<Record>, StoreError> {
        let key = (record_type, query.clone());
        {
            let cache = self.report_cache.lock();
            if let Some(cached) = cache.get(&key) {
                if cached.fetched_at.elapsed() < self.staleness {
                    return Ok(cached.records.clone());
                }
            }
        }

        let records = store.fetch_records(record_type, query).await?;
        self.report_cache.lock().insert(
            key,
            CachedQuery {
                fetched_at: Instant::now(),
                records: records.clone(),
            },
        );
        Ok(records)
    }

    pub fn invalidate_reports(&self) {
        self.report_cache.lock().clear();
    }

    // =========================================================================
    // Snapshots
    // =========================================================================

    /// Write the session to disk as a JSON snapshot. Caches are not
    /// persisted; they rebuild on demand.
    pub fn save(&self, path: &Path) -> Result<(), SessionError> {
        let snapshot = SessionSnapshot {
            email: self.email.clone(),
            ledger: self.ledger.lock().clone(),
            active_record: *self.active_record.lock(),
            reviewer: self.reviewer.read().clone(),
        };
        let json = serde_json::to_string_pretty(&snapshot)
            .map_err(|e| SessionError::Serialization(e.to_string()))?;
        std::fs::write(path, json).map_err(|e| SessionError::Io(e.to_string()))
    }

    /// Restore a session from a snapshot written by `save`
    pub fn load(path: &Path) -> Result<Self, SessionError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| SessionError::Io(e.to_string()))?;
        let snapshot: SessionSnapshot = serde_json::from_str(&content)
            .map_err(|e| SessionError::Serialization(e.to_string()))?;

        let state = Self::new(snapshot.email);
        *state.ledger.lock() = snapshot.ledger;
        *state.active_record.lock() = snapshot.active_record;
        *state.reviewer.write() = snapshot.reviewer;
        Ok(state)
    }
}
