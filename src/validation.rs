//! Field-level validation for monitoring form edits
//!
//! Validation failures block a submission locally; an invalid value is never
//! sent to the record store.

use crate::record::{FieldSpec, FieldType, FieldValue};
use once_cell::sync::Lazy;
use thiserror::Error;

static SAMPLE_ID_RE: Lazy<regex_lite::Regex> =
    Lazy::new(|| regex_lite::Regex::new(r"^\d{1,12}$").unwrap());

/// Maximum size for free-text note fields
pub const MAX_NOTE_BYTES: usize = 10_000;

/// Allowed frame codes per call type. A combination outside this table is a
/// data-entry error, not a schema variation.
const CALL_FRAME_COMBINATIONS: &[(&str, &[&str])] = &[
    ("landline", &["LL1", "LL2", "RDD"]),
    ("cell", &["CP1", "RDD"]),
    ("inbound", &["INB"]),
];

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("Sample ID must be numeric: {0}")]
    NonNumericSampleId(String),
    #[error("Invalid call type / frame code combination: {call_type}/{frame_code}")]
    InvalidCallFrame {
        call_type: String,
        frame_code: String,
    },
    #[error("Scoring value must be -1, 0, 1, or null")]
    InvalidScoringValue,
    #[error("Checkbox value must be a boolean")]
    InvalidCheckboxValue,
    #[error("{field} exceeds maximum size of {max} bytes")]
    InputTooLarge { field: String, max: usize },
    #[error("Empty input not allowed")]
    EmptyInput,
}

/// Validate a sample ID (e.g. `audio_smp`): digits only, 1-12 characters
pub fn validate_sample_id(sample_id: &str) -> Result<(), ValidationError> {
    if !SAMPLE_ID_RE.is_match(sample_id) {
        return Err(ValidationError::NonNumericSampleId(sample_id.to_string()));
    }
    Ok(())
}

/// Validate a call-type/frame-code combination against the closed table
pub fn validate_call_frame(call_type: &str, frame_code: &str) -> Result<(), ValidationError> {
    let allowed = CALL_FRAME_COMBINATIONS
        .iter()
        .find(|(ct, _)| *ct == call_type)
        .map(|(_, codes)| codes.contains(&frame_code))
        .unwrap_or(false);

    if !allowed {
        return Err(ValidationError::InvalidCallFrame {
            call_type: call_type.to_string(),
            frame_code: frame_code.to_string(),
        });
    }
    Ok(())
}

/// Scoring dropdowns carry -1 / 0 / 1 / null only
pub fn validate_scoring_value(value: &FieldValue) -> Result<(), ValidationError> {
    match value {
        FieldValue::Null => Ok(()),
        FieldValue::Number(n) if *n == -1.0 || *n == 0.0 || *n == 1.0 => Ok(()),
        _ => Err(ValidationError::InvalidScoringValue),
    }
}

pub fn validate_checkbox_value(value: &FieldValue) -> Result<(), ValidationError> {
    match value {
        FieldValue::Bool(_) => Ok(()),
        _ => Err(ValidationError::InvalidCheckboxValue),
    }
}

pub fn validate_text_size(field: &str, text: &str, max: usize) -> Result<(), ValidationError> {
    if text.len() > max {
        return Err(ValidationError::InputTooLarge {
            field: field.to_string(),
            max,
        });
    }
    Ok(())
}

pub fn validate_non_empty(text: &str) -> Result<(), ValidationError> {
    if text.trim().is_empty() {
        return Err(ValidationError::EmptyInput);
    }
    Ok(())
}

/// Validate a new value against its field spec before it enters the ledger
pub fn validate_field_value(spec: &FieldSpec, value: &FieldValue) -> Result<(), ValidationError> {
    match spec.field_type {
        FieldType::ScoringDropdown => validate_scoring_value(value),
        FieldType::Checkbox => validate_checkbox_value(value),
        FieldType::Text | FieldType::ScoringText => {
            if let FieldValue::Text(s) = value {
                validate_text_size(spec.label, s, MAX_NOTE_BYTES)?;
            }
            Ok(())
        }
        FieldType::FormAttribute => {
            if spec.label == "audio_smp" {
                if let FieldValue::Text(s) = value {
                    validate_sample_id(s)?;
                }
            }
            Ok(())
        }
        FieldType::Autopopulated => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordType;

    #[test]
    fn test_validate_sample_id() {
        assert!(validate_sample_id("4471902").is_ok());
        assert!(validate_sample_id("1").is_ok());

        assert!(validate_sample_id("447-1902").is_err());
        assert!(validate_sample_id("sample").is_err());
        assert!(validate_sample_id("").is_err());
        assert!(validate_sample_id("1234567890123").is_err()); // too long
    }

    #[test]
    fn test_validate_call_frame() {
        assert!(validate_call_frame("landline", "LL1").is_ok());
        assert!(validate_call_frame("landline", "RDD").is_ok());
        assert!(validate_call_frame("cell", "CP1").is_ok());
        assert!(validate_call_frame("inbound", "INB").is_ok());

        assert!(validate_call_frame("cell", "LL1").is_err());
        assert!(validate_call_frame("inbound", "RDD").is_err());
        assert!(validate_call_frame("fax", "LL1").is_err());
    }

    #[test]
    fn test_validate_scoring_value() {
        assert!(validate_scoring_value(&FieldValue::Number(-1.0)).is_ok());
        assert!(validate_scoring_value(&FieldValue::Number(0.0)).is_ok());
        assert!(validate_scoring_value(&FieldValue::Number(1.0)).is_ok());
        assert!(validate_scoring_value(&FieldValue::Null).is_ok());

        assert!(validate_scoring_value(&FieldValue::Number(2.0)).is_err());
        assert!(validate_scoring_value(&FieldValue::Text("-1".into())).is_err());
        assert!(validate_scoring_value(&FieldValue::Bool(true)).is_err());
    }

    #[test]
    fn test_validate_field_value_dispatch() {
        let scored = RecordType::Monitoring.lookup("mailing_address").unwrap();
        assert!(validate_field_value(scored, &FieldValue::Number(-1.0)).is_ok());
        assert!(validate_field_value(scored, &FieldValue::Number(5.0)).is_err());

        let checkbox = RecordType::Monitoring.lookup("monitor_complete").unwrap();
        assert!(validate_field_value(checkbox, &FieldValue::Bool(false)).is_ok());
        assert!(validate_field_value(checkbox, &FieldValue::Number(1.0)).is_err());

        let smp = RecordType::Monitoring.lookup("audio_smp").unwrap();
        assert!(validate_field_value(smp, &FieldValue::Text("8842".into())).is_ok());
        assert!(validate_field_value(smp, &FieldValue::Text("abc".into())).is_err());
    }

    #[test]
    fn test_validate_text_size() {
        let notes = RecordType::Monitoring.lookup("call_notes").unwrap();
        let big = "x".repeat(MAX_NOTE_BYTES + 1);
        assert!(validate_field_value(notes, &FieldValue::Text(big)).is_err());
        assert!(validate_field_value(notes, &FieldValue::Text("short".into())).is_ok());
    }

    #[test]
    fn test_validate_non_empty() {
        assert!(validate_non_empty("reason").is_ok());
        assert!(matches!(
            validate_non_empty("   "),
            Err(ValidationError::EmptyInput)
        ));
    }
}
