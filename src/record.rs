//! Record and field model for the QA core
//!
//! A `Record` is a transient read snapshot of a backend row: an immutable
//! `record_number`, descriptive attributes, and a map of scalar field values.
//! Field metadata lives in static `FieldSpec` tables keyed by `RecordType`,
//! so a lookup against an unknown record type cannot fail at runtime.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Scalar value carried by a record field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// A scored question answered as a compliance failure
    pub fn is_failing_score(&self) -> bool {
        matches!(self, Self::Number(n) if *n == -1.0)
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        Self::Number(n as f64)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => write!(f, ""),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Number(n) => write!(f, "{}", n),
            Self::Text(s) => write!(f, "{}", s),
        }
    }
}

/// A QA record snapshot fetched from the record store
///
/// The core never owns records; it holds copies taken at fetch time.
/// `record_number` is unique and immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub record_number: i64,
    pub record_date: NaiveDate,
    pub ri_id: String,
    #[serde(flatten)]
    pub fields: BTreeMap<String, FieldValue>,
}

impl Record {
    pub fn new(record_number: i64, record_date: NaiveDate, ri_id: impl Into<String>) -> Self {
        Self {
            record_number,
            record_date,
            ri_id: ri_id.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field setter, handy for tests and seed data
    pub fn with_field(mut self, name: &str, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn set_field(&mut self, name: &str, value: FieldValue) {
        self.fields.insert(name.to_string(), value);
    }

    pub fn number_field(&self, name: &str) -> Option<f64> {
        self.field(name).and_then(FieldValue::as_number)
    }

    pub fn text_field(&self, name: &str) -> Option<&str> {
        self.field(name).and_then(FieldValue::as_str)
    }
}

/// The editable shape of one field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FieldSpec {
    pub label: &'static str,
    pub field_type: FieldType,
    pub editable: bool,
}

const fn spec(label: &'static str, field_type: FieldType, editable: bool) -> FieldSpec {
    FieldSpec {
        label,
        field_type,
        editable,
    }
}

/// Field kinds carried by monitoring forms and their report derivatives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// Scored question, values restricted to -1 / 0 / 1 / null
    ScoringDropdown,
    /// Free-text tied to a scored question
    ScoringText,
    /// Descriptive form attribute (dates, sample IDs, dispositions)
    FormAttribute,
    Checkbox,
    Text,
    /// Filled by the backend, never editable
    Autopopulated,
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ScoringDropdown => write!(f, "scoring_dropdown"),
            Self::ScoringText => write!(f, "scoring_text"),
            Self::FormAttribute => write!(f, "form_attribute"),
            Self::Checkbox => write!(f, "checkbox"),
            Self::Text => write!(f, "text"),
            Self::Autopopulated => write!(f, "autopopulated"),
        }
    }
}

/// Closed set of record types the core works with
///
/// Dispatch goes through the match arms below rather than a string-keyed
/// registry, so "type not found" is unrepresentable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    /// Call monitoring form filled by a quality reviewer
    Monitoring,
    /// Compliance escalation record
    Mca,
    /// Score source rows matched into CMR report rows
    Score,
}

impl std::fmt::Display for RecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Monitoring => write!(f, "monitoring"),
            Self::Mca => write!(f, "mca"),
            Self::Score => write!(f, "score"),
        }
    }
}

impl std::str::FromStr for RecordType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "monitoring" => Ok(Self::Monitoring),
            "mca" => Ok(Self::Mca),
            "score" => Ok(Self::Score),
            _ => Err(()),
        }
    }
}

/// Scored questions on a monitoring form, in report ordinal order.
/// Deviation ordinals are 1-based positions into this list; the order is
/// part of the report contract and must not change between releases.
const MONITORING_SCORED: &[FieldSpec] = &[
    spec("proper_introduction", FieldType::ScoringDropdown, true),
    spec("mailing_address", FieldType::ScoringDropdown, true),
    spec("home_address", FieldType::ScoringDropdown, true),
    spec("delayed_coding", FieldType::ScoringDropdown, true),
    spec("persuading_respondent", FieldType::ScoringDropdown, true),
    spec("disposition_code", FieldType::ScoringDropdown, true),
    spec("verbatim_response", FieldType::ScoringDropdown, true),
    spec("data_entry_accuracy", FieldType::ScoringDropdown, true),
    spec("mandatory_script", FieldType::ScoringDropdown, true),
    spec("leading_questions", FieldType::ScoringDropdown, true),
];

const MONITORING_OTHER: &[FieldSpec] = &[
    spec("record_number", FieldType::Autopopulated, false),
    spec("record_date", FieldType::FormAttribute, true),
    spec("ri_id", FieldType::FormAttribute, true),
    spec("audio_smp", FieldType::FormAttribute, true),
    spec("call_type", FieldType::FormAttribute, true),
    spec("frame_code", FieldType::FormAttribute, true),
    spec("monitor_complete", FieldType::Checkbox, true),
    spec("call_notes", FieldType::Text, true),
    spec("deviation_notes", FieldType::ScoringText, true),
    spec("qr_id", FieldType::Autopopulated, false),
];

const MCA_FIELDS: &[FieldSpec] = &[
    spec("record_number", FieldType::Autopopulated, false),
    spec("record_date", FieldType::FormAttribute, true),
    spec("ri_id", FieldType::FormAttribute, true),
    spec("mca_category", FieldType::FormAttribute, true),
    spec("mca_notes", FieldType::Text, true),
    spec("reviewed", FieldType::Checkbox, true),
];

const SCORE_FIELDS: &[FieldSpec] = &[
    spec("record_number", FieldType::Autopopulated, false),
    spec("record_date", FieldType::Autopopulated, false),
    spec("ri_id", FieldType::Autopopulated, false),
    spec("final_score", FieldType::Autopopulated, false),
];

impl RecordType {
    /// URL path segment on the record store backend
    pub fn path_segment(self) -> &'static str {
        match self {
            Self::Monitoring => "monitoring_forms",
            Self::Mca => "mca_records",
            Self::Score => "score_reports",
        }
    }

    /// All field specs for this record type
    pub fn field_specs(self) -> impl Iterator<Item = &'static FieldSpec> {
        let (scored, other): (&[FieldSpec], &[FieldSpec]) = match self {
            Self::Monitoring => (MONITORING_SCORED, MONITORING_OTHER),
            Self::Mca => (&[], MCA_FIELDS),
            Self::Score => (&[], SCORE_FIELDS),
        };
        scored.iter().chain(other.iter())
    }

    /// Scored question labels in ordinal order (empty for non-scoring types)
    pub fn scored_fields(self) -> Vec<&'static str> {
        match self {
            Self::Monitoring => MONITORING_SCORED.iter().map(|s| s.label).collect(),
            _ => Vec::new(),
        }
    }

    pub fn lookup(self, label: &str) -> Option<&'static FieldSpec> {
        self.field_specs().find(|s| s.label == label)
    }
}
