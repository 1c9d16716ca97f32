//! Change-tracking ledger
//!
//! Accumulates field-level edits across one or many records before a
//! submission. The ledger is the single source of truth for "what changed":
//! entry order is edit order, re-editing a field replaces its entry in
//! place, and a deletion sentinel supersedes every other edit for that
//! record at submission time.

use crate::record::{FieldValue, RecordType};
use crate::validation::{validate_field_value, ValidationError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Sentinel `new_value` marking a whole-record deletion
pub const DELETION_SENTINEL: &str = "FORM DELETED";

#[derive(Debug, Error, PartialEq)]
pub enum LedgerError {
    #[error("Unknown field: {0}")]
    UnknownField(String),
    #[error("Field is not editable: {0}")]
    NotEditable(String),
    #[error(transparent)]
    Value(#[from] ValidationError),
}

/// One tracked edit, or the deletion sentinel when `field` is `None`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEntry {
    pub record_number: i64,
    pub field: Option<String>,
    pub old_value: FieldValue,
    pub new_value: FieldValue,
}

impl ChangeEntry {
    pub fn is_deletion(&self) -> bool {
        self.field.is_none()
    }
}

/// Whether the editor holds one record or a bulk set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditMode {
    Single,
    Bulk,
}

impl std::fmt::Display for EditMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Single => write!(f, "single"),
            Self::Bulk => write!(f, "bulk"),
        }
    }
}

/// In-memory accumulation of pending edits prior to submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeLedger {
    record_type: RecordType,
    mode: EditMode,
    entries: Vec<ChangeEntry>,
    reasons: Vec<String>,
}

impl ChangeLedger {
    pub fn new(record_type: RecordType, mode: EditMode) -> Self {
        Self {
            record_type,
            mode,
            entries: Vec::new(),
            reasons: Vec::new(),
        }
    }

    pub fn record_type(&self) -> RecordType {
        self.record_type
    }

    pub fn mode(&self) -> EditMode {
        self.mode
    }

    pub fn entries(&self) -> &[ChangeEntry] {
        &self.entries
    }

    pub fn entries_for(&self, record_number: i64) -> impl Iterator<Item = &ChangeEntry> {
        self.entries
            .iter()
            .filter(move |e| e.record_number == record_number)
    }

    /// Track a field edit. A repeated edit of the same `(record, field)`
    /// pair replaces the entry in place: the latest value wins, the entry
    /// keeps its position in the edit order, and `old_value` stays at the
    /// snapshot value from the first edit so the audit trail reads
    /// snapshot -> final.
    ///
    /// Editing a field the record type does not declare, or one that is not
    /// editable, is a caller error and fails fast.
    pub fn record_field_change(
        &mut self,
        record_number: i64,
        field: &str,
        old_value: FieldValue,
        new_value: FieldValue,
    ) -> Result<(), LedgerError> {
        let spec = self
            .record_type
            .lookup(field)
            .ok_or_else(|| LedgerError::UnknownField(field.to_string()))?;
        if !spec.editable {
            return Err(LedgerError::NotEditable(field.to_string()));
        }
        validate_field_value(spec, &new_value)?;

        let existing = self
            .entries
            .iter_mut()
            .find(|e| e.record_number == record_number && e.field.as_deref() == Some(field));

        match existing {
            Some(entry) => {
                entry.new_value = new_value;
            }
            None => {
                self.entries.push(ChangeEntry {
                    record_number,
                    field: Some(field.to_string()),
                    old_value,
                    new_value,
                });
            }
        }
        Ok(())
    }

    /// Insert the deletion sentinel for a record. Idempotent; at most one
    /// sentinel per record number ever exists.
    pub fn record_deletion(&mut self, record_number: i64) {
        if self.has_deletion(record_number) {
            return;
        }
        self.entries.push(ChangeEntry {
            record_number,
            field: None,
            old_value: FieldValue::Null,
            new_value: FieldValue::Text(DELETION_SENTINEL.to_string()),
        });
    }

    pub fn has_deletion(&self, record_number: i64) -> bool {
        self.entries_for(record_number).any(ChangeEntry::is_deletion)
    }

    /// Reset all tracked changes and reasons
    pub fn clear(&mut self) {
        self.entries.clear();
        self.reasons.clear();
    }

    /// Add an audit reason (deduplicated, blanks ignored)
    pub fn add_reason(&mut self, reason: &str) {
        let reason = reason.trim();
        if reason.is_empty() {
            return;
        }
        if !self.reasons.iter().any(|r| r == reason) {
            self.reasons.push(reason.to_string());
        }
    }

    pub fn reasons(&self) -> &[String] {
        &self.reasons
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_dirty(&self, record_number: i64) -> bool {
        self.entries_for(record_number).next().is_some()
    }

    /// Record numbers with at least one tracked change, first-edit order
    pub fn dirty_records(&self) -> Vec<i64> {
        let mut out = Vec::new();
        for e in &self.entries {
            if !out.contains(&e.record_number) {
                out.push(e.record_number);
            }
        }
        out
    }

    /// Count of distinct field changes (deletion sentinels excluded)
    pub fn change_count(&self) -> usize {
        self.entries.iter().filter(|e| !e.is_deletion()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> ChangeLedger {
        ChangeLedger::new(RecordType::Monitoring, EditMode::Bulk)
    }

    #[test]
    fn test_field_change_tracked() {
        let mut l = ledger();
        l.record_field_change(101, "call_notes", FieldValue::Null, "ok".into())
            .unwrap();

        assert!(l.is_dirty(101));
        assert_eq!(l.change_count(), 1);
        assert_eq!(l.entries()[0].field.as_deref(), Some("call_notes"));
    }

    #[test]
    fn test_repeat_edit_replaces_in_place() {
        let mut l = ledger();
        l.record_field_change(101, "call_notes", "orig".into(), "first".into())
            .unwrap();
        l.record_field_change(101, "mailing_address", FieldValue::Null, (-1i64).into())
            .unwrap();
        l.record_field_change(101, "call_notes", "first".into(), "second".into())
            .unwrap();

        // still two entries, call_notes kept its position and first old_value
        assert_eq!(l.change_count(), 2);
        let first = &l.entries()[0];
        assert_eq!(first.field.as_deref(), Some("call_notes"));
        assert_eq!(first.old_value, FieldValue::Text("orig".into()));
        assert_eq!(first.new_value, FieldValue::Text("second".into()));
        assert!(l.is_dirty(101));
    }

    #[test]
    fn test_unknown_field_fails_fast() {
        let mut l = ledger();
        let err = l
            .record_field_change(101, "bogus_field", FieldValue::Null, "x".into())
            .unwrap_err();
        assert_eq!(err, LedgerError::UnknownField("bogus_field".into()));
        assert!(!l.is_dirty(101));
    }

    #[test]
    fn test_autopopulated_field_rejected() {
        let mut l = ledger();
        let err = l
            .record_field_change(101, "record_number", FieldValue::Null, 102i64.into())
            .unwrap_err();
        assert_eq!(err, LedgerError::NotEditable("record_number".into()));
    }

    #[test]
    fn test_invalid_scoring_value_rejected() {
        let mut l = ledger();
        let err = l
            .record_field_change(101, "mailing_address", FieldValue::Null, 7i64.into())
            .unwrap_err();
        assert!(matches!(err, LedgerError::Value(_)));
    }

    #[test]
    fn test_deletion_sentinel_once() {
        let mut l = ledger();
        l.record_deletion(101);
        l.record_deletion(101);

        let sentinels: Vec<_> = l.entries_for(101).filter(|e| e.is_deletion()).collect();
        assert_eq!(sentinels.len(), 1);
        assert_eq!(
            sentinels[0].new_value,
            FieldValue::Text(DELETION_SENTINEL.into())
        );
        assert!(l.has_deletion(101));
    }

    #[test]
    fn test_clear_resets_everything() {
        let mut l = ledger();
        l.record_field_change(101, "call_notes", FieldValue::Null, "x".into())
            .unwrap();
        l.add_reason("typo fix");
        l.clear();

        assert!(l.is_empty());
        assert!(l.reasons().is_empty());
    }

    #[test]
    fn test_reasons_deduplicated() {
        let mut l = ledger();
        l.add_reason("supervisor request");
        l.add_reason("  supervisor request  ");
        l.add_reason("");
        l.add_reason("score correction");

        assert_eq!(l.reasons(), &["supervisor request", "score correction"]);
    }

    #[test]
    fn test_dirty_records_in_first_edit_order() {
        let mut l = ledger();
        l.record_field_change(202, "call_notes", FieldValue::Null, "b".into())
            .unwrap();
        l.record_field_change(101, "call_notes", FieldValue::Null, "a".into())
            .unwrap();
        l.record_field_change(202, "audio_smp", FieldValue::Null, "123".into())
            .unwrap();

        assert_eq!(l.dirty_records(), vec![202, 101]);
    }
}
