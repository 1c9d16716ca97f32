//! Submission reconciliation
//!
//! Turns a change ledger into concrete save/delete batches, issues both
//! concurrently, and reconciles the accepted-ID sets against the request
//! set. The machine moves `Idle -> Building -> Submitting -> Reconciled`;
//! once Building starts the ledger is treated as a frozen snapshot.

use crate::ledger::{ChangeEntry, ChangeLedger, EditMode};
use crate::notify::NotificationSink;
use crate::record::{FieldValue, RecordType};
use crate::store::RecordStore;
use crate::users::Reviewer;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, PartialEq)]
pub enum SubmitError {
    #[error("No audit reason provided")]
    EmptyReasons,
    #[error("Nothing to submit")]
    EmptyLedger,
    #[error("A submission is already in flight")]
    InFlight,
}

/// Reconciler phases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionPhase {
    Idle,
    Building,
    Submitting,
    Reconciled,
}

impl SubmissionPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Reconciled)
    }
}

impl std::fmt::Display for SubmissionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Building => write!(f, "building"),
            Self::Submitting => write!(f, "submitting"),
            Self::Reconciled => write!(f, "reconciled"),
        }
    }
}

/// Overall result classification. `Partial` and `Failure` both read as
/// `succeeded == false` through the compatibility flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionOutcome {
    Success,
    Partial,
    Failure,
}

impl std::fmt::Display for SubmissionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Partial => write!(f, "partial"),
            Self::Failure => write!(f, "failure"),
        }
    }
}

/// One record prepared for the update batch: only the merged current value
/// per edited field, plus the acting reviewer and the audit reasons.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalForm {
    pub record_number: i64,
    pub qr_id: String,
    pub fields: BTreeMap<String, FieldValue>,
    pub reasons: Vec<String>,
}

/// The frozen partition of a ledger snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionPlan {
    pub record_type: RecordType,
    pub mode: EditMode,
    pub qr_id: String,
    pub final_forms: Vec<FinalForm>,
    pub final_deletions: Vec<i64>,
    /// Ledger snapshot, used to derive the filtered change log
    pub entries: Vec<ChangeEntry>,
    /// Distinct field changes on records not superseded by deletion
    pub change_count: usize,
}

/// Reconciled result of one submission run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionReport {
    pub run_id: Uuid,
    pub mode: EditMode,
    pub saved_ids: Vec<i64>,
    pub deleted_ids: Vec<i64>,
    pub failed_saved: Vec<i64>,
    pub failed_deleted: Vec<i64>,
    /// Compatibility flag: true iff both failure sets are empty. Partial
    /// and total failure are indistinguishable here; use `outcome` for the
    /// richer classification.
    pub succeeded: bool,
    pub outcome: SubmissionOutcome,
    pub total_submission_count: usize,
    pub units_completed: usize,
    /// Only entries whose record landed in the matching accepted-ID set;
    /// this is the audit trail persisted downstream, not the raw ledger.
    pub change_log: Vec<ChangeEntry>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

/// Submission state machine. One reconciler handles one ledger snapshot;
/// a second submission over the same snapshot is rejected while in flight.
#[derive(Debug)]
pub struct SubmissionReconciler {
    phase: SubmissionPhase,
}

impl SubmissionReconciler {
    pub fn new() -> Self {
        Self {
            phase: SubmissionPhase::Idle,
        }
    }

    pub fn phase(&self) -> SubmissionPhase {
        self.phase
    }

    /// Partition the ledger into the update batch and the deletion batch.
    ///
    /// A record number carrying the deletion sentinel never appears in
    /// `final_forms`: deletion wins. An empty audit-reason set blocks the
    /// submission locally.
    pub fn build_plan(
        &mut self,
        ledger: &ChangeLedger,
        reviewer: &Reviewer,
    ) -> Result<SubmissionPlan, SubmitError> {
        if self.phase == SubmissionPhase::Submitting {
            return Err(SubmitError::InFlight);
        }
        if ledger.is_empty() {
            return Err(SubmitError::EmptyLedger);
        }
        if ledger.reasons().is_empty() {
            return Err(SubmitError::EmptyReasons);
        }
        self.phase = SubmissionPhase::Building;

        let mut final_deletions: Vec<i64> = Vec::new();
        for entry in ledger.entries() {
            if entry.is_deletion() && !final_deletions.contains(&entry.record_number) {
                final_deletions.push(entry.record_number);
            }
        }

        let mut final_forms: Vec<FinalForm> = Vec::new();
        let mut change_count = 0usize;
        for record_number in ledger.dirty_records() {
            if final_deletions.contains(&record_number) {
                continue;
            }
            let mut fields = BTreeMap::new();
            for entry in ledger.entries_for(record_number) {
                if let Some(field) = &entry.field {
                    fields.insert(field.clone(), entry.new_value.clone());
                    change_count += 1;
                }
            }
            if fields.is_empty() {
                continue;
            }
            final_forms.push(FinalForm {
                record_number,
                qr_id: reviewer.qr_id.clone(),
                fields,
                reasons: ledger.reasons().to_vec(),
            });
        }

        Ok(SubmissionPlan {
            record_type: ledger.record_type(),
            mode: ledger.mode(),
            qr_id: reviewer.qr_id.clone(),
            final_forms,
            final_deletions,
            entries: ledger.entries().to_vec(),
            change_count,
        })
    }

    /// Issue both batches and reconcile the accepted-ID sets.
    ///
    /// The update and deletion batches run as two independently failing
    /// async operations, jointly awaited; a succeeded batch is never rolled
    /// back because the other failed. A failed batch contributes an empty
    /// accepted set and triggers an error-report side effect.
    pub async fn submit<S, N>(
        &mut self,
        plan: SubmissionPlan,
        store: &S,
        notifier: &N,
    ) -> SubmissionReport
    where
        S: RecordStore,
        N: NotificationSink,
    {
        self.phase = SubmissionPhase::Submitting;
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();

        tracing::info!(
            %run_id,
            mode = %plan.mode,
            forms = plan.final_forms.len(),
            deletions = plan.final_deletions.len(),
            "submission started"
        );

        let save_batch = async {
            if plan.final_forms.is_empty() {
                return Ok(Vec::new());
            }
            store.save_records(plan.record_type, &plan.final_forms).await
        };
        let delete_batch = async {
            if plan.final_deletions.is_empty() {
                return Ok(Vec::new());
            }
            store
                .delete_records(plan.record_type, &plan.final_deletions)
                .await
        };

        let (save_result, delete_result) = tokio::join!(save_batch, delete_batch);

        let saved_ids = match save_result {
            Ok(ids) => ids,
            Err(e) => {
                tracing::error!(%run_id, "update batch failed: {}", e);
                notifier
                    .email_error_report(&plan.qr_id, "QA record save failed", &e.to_string())
                    .await;
                Vec::new()
            }
        };
        let deleted_ids = match delete_result {
            Ok(ids) => ids,
            Err(e) => {
                tracing::error!(%run_id, "deletion batch failed: {}", e);
                notifier
                    .email_error_report(&plan.qr_id, "QA record deletion failed", &e.to_string())
                    .await;
                Vec::new()
            }
        };

        let failed_saved: Vec<i64> = plan
            .final_forms
            .iter()
            .map(|f| f.record_number)
            .filter(|n| !saved_ids.contains(n))
            .collect();
        let failed_deleted: Vec<i64> = plan
            .final_deletions
            .iter()
            .copied()
            .filter(|n| !deleted_ids.contains(n))
            .collect();

        let succeeded = failed_saved.is_empty() && failed_deleted.is_empty();

        // Single mode counts the base record plus each distinct field
        // change as a unit of work; those units complete together with the
        // one record save. Bulk mode counts records.
        let (total_submission_count, units_completed) = match plan.mode {
            EditMode::Bulk => (
                plan.final_forms.len() + plan.final_deletions.len(),
                saved_ids.len() + deleted_ids.len(),
            ),
            EditMode::Single => {
                let total = 1 + plan.change_count;
                let base_landed = plan
                    .final_forms
                    .first()
                    .map(|f| saved_ids.contains(&f.record_number))
                    .or_else(|| {
                        plan.final_deletions
                            .first()
                            .map(|n| deleted_ids.contains(n))
                    })
                    .unwrap_or(false);
                (total, if base_landed { total } else { 0 })
            }
        };

        let change_log: Vec<ChangeEntry> = plan
            .entries
            .iter()
            .filter(|entry| {
                if entry.is_deletion() {
                    deleted_ids.contains(&entry.record_number)
                } else {
                    saved_ids.contains(&entry.record_number)
                }
            })
            .cloned()
            .collect();

        let outcome = if succeeded {
            SubmissionOutcome::Success
        } else if units_completed > 0 {
            SubmissionOutcome::Partial
        } else {
            SubmissionOutcome::Failure
        };

        self.phase = SubmissionPhase::Reconciled;
        let completed_at = Utc::now();

        tracing::info!(
            %run_id,
            %outcome,
            saved = saved_ids.len(),
            deleted = deleted_ids.len(),
            failed_saved = failed_saved.len(),
            failed_deleted = failed_deleted.len(),
            "submission reconciled"
        );

        SubmissionReport {
            run_id,
            mode: plan.mode,
            saved_ids,
            deleted_ids,
            failed_saved,
            failed_deleted,
            succeeded,
            outcome,
            total_submission_count,
            units_completed,
            change_log,
            started_at,
            completed_at,
        }
    }
}

impl Default for SubmissionReconciler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NullNotifier;
    use crate::record::Record;
    use crate::store::{MemoryStore, RecordQuery};
    use chrono::NaiveDate;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn reviewer() -> Reviewer {
        Reviewer {
            qr_id: "QR-0440".to_string(),
            site_name: "West".to_string(),
            email: "sam@example.com".to_string(),
        }
    }

    fn seeded_store(numbers: &[i64]) -> MemoryStore {
        let store = MemoryStore::new();
        store.seed_records(
            RecordType::Monitoring,
            numbers
                .iter()
                .map(|n| Record::new(*n, date("2026-02-01"), "RI-1"))
                .collect(),
        );
        store
    }

    fn bulk_ledger() -> ChangeLedger {
        let mut ledger = ChangeLedger::new(RecordType::Monitoring, EditMode::Bulk);
        ledger.add_reason("supervisor correction");
        ledger
    }

    #[test]
    fn test_plan_requires_reasons() {
        let mut ledger = ChangeLedger::new(RecordType::Monitoring, EditMode::Bulk);
        ledger
            .record_field_change(101, "call_notes", FieldValue::Null, "x".into())
            .unwrap();

        let mut reconciler = SubmissionReconciler::new();
        assert_eq!(
            reconciler.build_plan(&ledger, &reviewer()).unwrap_err(),
            SubmitError::EmptyReasons
        );
    }

    #[test]
    fn test_plan_requires_changes() {
        let ledger = bulk_ledger();
        let mut reconciler = SubmissionReconciler::new();
        assert_eq!(
            reconciler.build_plan(&ledger, &reviewer()).unwrap_err(),
            SubmitError::EmptyLedger
        );
    }

    #[test]
    fn test_deletion_wins_over_edits() {
        let mut ledger = bulk_ledger();
        ledger
            .record_field_change(101, "call_notes", FieldValue::Null, "edited".into())
            .unwrap();
        ledger.record_deletion(101);
        ledger
            .record_field_change(102, "call_notes", FieldValue::Null, "kept".into())
            .unwrap();

        let mut reconciler = SubmissionReconciler::new();
        let plan = reconciler.build_plan(&ledger, &reviewer()).unwrap();

        assert_eq!(plan.final_deletions, vec![101]);
        let form_numbers: Vec<i64> = plan.final_forms.iter().map(|f| f.record_number).collect();
        assert_eq!(form_numbers, vec![102]);
        // the deleted record's field edit does not count as a change unit
        assert_eq!(plan.change_count, 1);
    }

    #[test]
    fn test_merged_values_are_latest() {
        let mut ledger = bulk_ledger();
        ledger
            .record_field_change(101, "call_notes", "orig".into(), "first".into())
            .unwrap();
        ledger
            .record_field_change(101, "call_notes", "first".into(), "final".into())
            .unwrap();

        let mut reconciler = SubmissionReconciler::new();
        let plan = reconciler.build_plan(&ledger, &reviewer()).unwrap();
        assert_eq!(
            plan.final_forms[0].fields.get("call_notes"),
            Some(&FieldValue::Text("final".into()))
        );
        assert_eq!(plan.final_forms[0].qr_id, "QR-0440");
        assert_eq!(plan.final_forms[0].reasons, vec!["supervisor correction"]);
    }

    #[tokio::test]
    async fn test_full_success_bulk() {
        let mut ledger = bulk_ledger();
        ledger
            .record_field_change(101, "call_notes", FieldValue::Null, "ok".into())
            .unwrap();
        ledger.record_deletion(102);

        let store = seeded_store(&[101, 102]);
        let mut reconciler = SubmissionReconciler::new();
        let plan = reconciler.build_plan(&ledger, &reviewer()).unwrap();
        let report = reconciler.submit(plan, &store, &NullNotifier).await;

        assert!(report.succeeded);
        assert_eq!(report.outcome, SubmissionOutcome::Success);
        assert_eq!(report.saved_ids, vec![101]);
        assert_eq!(report.deleted_ids, vec![102]);
        assert!(report.failed_saved.is_empty());
        assert!(report.failed_deleted.is_empty());
        assert_eq!(report.total_submission_count, 2);
        assert_eq!(report.units_completed, 2);
        assert_eq!(reconciler.phase(), SubmissionPhase::Reconciled);

        // filtered change log keeps both the edit and the sentinel
        assert_eq!(report.change_log.len(), 2);
        let deleted = store
            .fetch_records(RecordType::Monitoring, &RecordQuery::by_number(102))
            .await
            .unwrap();
        assert!(deleted.is_empty());
    }

    #[tokio::test]
    async fn test_partial_failure_filters_change_log() {
        let mut ledger = bulk_ledger();
        ledger
            .record_field_change(101, "call_notes", FieldValue::Null, "kept".into())
            .unwrap();
        ledger
            .record_field_change(103, "call_notes", FieldValue::Null, "dropped".into())
            .unwrap();

        let store = seeded_store(&[101, 103]);
        store.accept_only_saves(&[101]);

        let mut reconciler = SubmissionReconciler::new();
        let plan = reconciler.build_plan(&ledger, &reviewer()).unwrap();
        let report = reconciler.submit(plan, &store, &NullNotifier).await;

        assert!(!report.succeeded);
        assert_eq!(report.outcome, SubmissionOutcome::Partial);
        assert_eq!(report.failed_saved, vec![103]);
        assert_eq!(report.change_log.len(), 1);
        assert_eq!(report.change_log[0].record_number, 101);
    }

    #[tokio::test]
    async fn test_total_failure() {
        let mut ledger = bulk_ledger();
        ledger
            .record_field_change(101, "call_notes", FieldValue::Null, "x".into())
            .unwrap();

        let store = seeded_store(&[101]);
        store.accept_only_saves(&[]);

        let mut reconciler = SubmissionReconciler::new();
        let plan = reconciler.build_plan(&ledger, &reviewer()).unwrap();
        let report = reconciler.submit(plan, &store, &NullNotifier).await;

        assert!(!report.succeeded);
        assert_eq!(report.outcome, SubmissionOutcome::Failure);
        assert_eq!(report.units_completed, 0);
        assert!(report.change_log.is_empty());
    }

    /// Store whose update batch always times out; deletions succeed
    struct SaveTimeoutStore {
        inner: MemoryStore,
    }

    impl crate::store::RecordStore for SaveTimeoutStore {
        async fn fetch_records(
            &self,
            record_type: RecordType,
            query: &RecordQuery,
        ) -> Result<Vec<Record>, crate::store::StoreError> {
            self.inner.fetch_records(record_type, query).await
        }

        async fn save_records(
            &self,
            _record_type: RecordType,
            _forms: &[FinalForm],
        ) -> Result<Vec<i64>, crate::store::StoreError> {
            Err(crate::store::StoreError::Timeout)
        }

        async fn delete_records(
            &self,
            record_type: RecordType,
            record_numbers: &[i64],
        ) -> Result<Vec<i64>, crate::store::StoreError> {
            self.inner.delete_records(record_type, record_numbers).await
        }

        async fn fetch_user(
            &self,
            email: &str,
        ) -> Result<crate::store::StoreUser, crate::store::StoreError> {
            self.inner.fetch_user(email).await
        }
    }

    #[tokio::test]
    async fn test_failed_batch_does_not_roll_back_the_other() {
        let mut ledger = bulk_ledger();
        ledger
            .record_field_change(101, "call_notes", FieldValue::Null, "x".into())
            .unwrap();
        ledger.record_deletion(102);

        let store = SaveTimeoutStore {
            inner: seeded_store(&[101, 102]),
        };

        let mut reconciler = SubmissionReconciler::new();
        let plan = reconciler.build_plan(&ledger, &reviewer()).unwrap();
        let report = reconciler.submit(plan, &store, &NullNotifier).await;

        // the update batch timed out; the deletion batch still landed
        assert!(!report.succeeded);
        assert_eq!(report.outcome, SubmissionOutcome::Partial);
        assert!(report.saved_ids.is_empty());
        assert_eq!(report.deleted_ids, vec![102]);
        assert_eq!(report.failed_saved, vec![101]);
        assert_eq!(report.change_log.len(), 1);
        assert!(report.change_log[0].is_deletion());
        assert_eq!(reconciler.phase(), SubmissionPhase::Reconciled);
    }

    #[tokio::test]
    async fn test_single_mode_accounting() {
        let mut ledger = ChangeLedger::new(RecordType::Monitoring, EditMode::Single);
        ledger.add_reason("typo fix");
        ledger
            .record_field_change(101, "call_notes", FieldValue::Null, "a".into())
            .unwrap();
        ledger
            .record_field_change(101, "audio_smp", FieldValue::Null, "123".into())
            .unwrap();
        ledger
            .record_field_change(101, "mailing_address", FieldValue::Null, (-1i64).into())
            .unwrap();

        let store = seeded_store(&[101]);
        let mut reconciler = SubmissionReconciler::new();
        let plan = reconciler.build_plan(&ledger, &reviewer()).unwrap();
        let report = reconciler.submit(plan, &store, &NullNotifier).await;

        // base record plus three field changes, conflated units of work
        assert_eq!(report.total_submission_count, 4);
        assert_eq!(report.units_completed, 4);
        assert!(report.succeeded);
        assert_eq!(report.saved_ids, vec![101]);
    }

    #[tokio::test]
    async fn test_single_mode_deletion_accounting() {
        let mut ledger = ChangeLedger::new(RecordType::Monitoring, EditMode::Single);
        ledger.add_reason("duplicate form");
        ledger
            .record_field_change(101, "call_notes", FieldValue::Null, "pre".into())
            .unwrap();
        ledger.record_deletion(101);

        let store = seeded_store(&[101]);
        let mut reconciler = SubmissionReconciler::new();
        let plan = reconciler.build_plan(&ledger, &reviewer()).unwrap();
        let report = reconciler.submit(plan, &store, &NullNotifier).await;

        assert!(report.succeeded);
        assert_eq!(report.deleted_ids, vec![101]);
        // only the sentinel survives into the audit trail
        assert_eq!(report.change_log.len(), 1);
        assert!(report.change_log[0].is_deletion());
    }
}
