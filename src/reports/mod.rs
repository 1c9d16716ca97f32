//! Report derivation engines
//!
//! Everything in this module is pure computation over record snapshots:
//! deviation extraction, rolling summary aggregation, CMR row assembly, and
//! MCA priority selection. Malformed or missing fields are skipped, never
//! fatal, so report generation stays resilient to schema drift.

pub mod deviation;
pub mod mca;
pub mod summary;

pub use deviation::extract_deviations;
pub use mca::{default_priority_table, select_for_window, select_primary, McaSelection, PriorityTable};
pub use summary::{build_cmr_summary, build_summary_dates, CmrSummary, DeviationCategory};

use crate::record::{Record, RecordType};
use serde::Serialize;
use std::collections::HashMap;

/// One row of the Call Monitoring Report
#[derive(Debug, Clone, Serialize)]
pub struct ReportRow {
    #[serde(flatten)]
    pub record: Record,
    /// Matched from the score source; `NaN` when no row matches
    pub final_score: f64,
    /// 1-based ordinals of scored questions answered as failures
    pub obsv_diffs: Vec<usize>,
    pub call_notes: String,
}

/// Assemble CMR rows from monitoring records and the score source.
///
/// The score source is matched by record number, the only unique immutable
/// key in the model; an unmatched row carries `NaN` and is excluded from
/// the accuracy numerator downstream (but not the denominator).
pub fn build_report_rows(records: &[Record], scores: &[Record]) -> Vec<ReportRow> {
    let scored_fields = RecordType::Monitoring.scored_fields();
    let score_by_number: HashMap<i64, f64> = scores
        .iter()
        .filter_map(|s| {
            s.number_field("final_score")
                .map(|score| (s.record_number, score))
        })
        .collect();

    records
        .iter()
        .map(|record| {
            let final_score = score_by_number
                .get(&record.record_number)
                .copied()
                .unwrap_or(f64::NAN);
            let obsv_diffs = extract_deviations(&scored_fields, record);
            let call_notes = record.text_field("call_notes").unwrap_or("").to_string();
            ReportRow {
                record: record.clone(),
                final_score,
                obsv_diffs,
                call_notes,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;
    use chrono::NaiveDate;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn test_build_report_rows_score_matching() {
        let records = vec![
            Record::new(101, date("2026-02-03"), "RI-1")
                .with_field("mailing_address", -1i64)
                .with_field("call_notes", "late coding"),
            Record::new(102, date("2026-02-04"), "RI-2"),
        ];
        let scores = vec![
            Record::new(101, date("2026-02-03"), "RI-1").with_field("final_score", 92.5),
        ];

        let rows = build_report_rows(&records, &scores);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].final_score, 92.5);
        assert_eq!(rows[0].obsv_diffs, vec![2]); // mailing_address is ordinal 2
        assert_eq!(rows[0].call_notes, "late coding");

        assert!(rows[1].final_score.is_nan());
        assert!(rows[1].obsv_diffs.is_empty());
        assert_eq!(rows[1].call_notes, "");
    }

    #[test]
    fn test_score_source_without_score_field_is_skipped() {
        let records = vec![Record::new(101, date("2026-02-03"), "RI-1")];
        let scores = vec![Record::new(101, date("2026-02-03"), "RI-1")]; // no final_score

        let rows = build_report_rows(&records, &scores);
        assert!(rows[0].final_score.is_nan());
    }
}
