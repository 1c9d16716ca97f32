//! Deviation extraction
//!
//! A deviation is a scored question answered as a failure (-1). The report
//! identifies deviations by ordinal, the 1-based position of the question
//! in the scored-field list, so the input ordering is part of the contract.

use crate::record::Record;

/// Extract the ordered deviation ordinals for one record.
///
/// Pure and deterministic: identical inputs always yield the identical
/// ordinal list. Fields absent from the record are skipped without error.
pub fn extract_deviations(scored_fields: &[&str], record: &Record) -> Vec<usize> {
    let mut ordinals = Vec::new();
    for (index, field) in scored_fields.iter().enumerate() {
        if let Some(value) = record.field(field) {
            if value.is_failing_score() {
                ordinals.push(index + 1);
            }
        }
    }
    ordinals
}
