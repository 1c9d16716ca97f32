//! Rolling-window summary aggregation
//!
//! Builds the per-category deviation date lists and the CMR accuracy
//! summary consumed by the periodic reports.

use super::ReportRow;
use crate::record::Record;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Fixed deviation categories reported in the rolling summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviationCategory {
    Address,
    DelayedCoding,
    Persuading,
    IncorrectDisposition,
    VerbatimBreak,
    InaccurateData,
    ImproperIntro,
    MandatoryText,
    LeadingBias,
}

impl DeviationCategory {
    pub const ALL: [DeviationCategory; 9] = [
        Self::Address,
        Self::DelayedCoding,
        Self::Persuading,
        Self::IncorrectDisposition,
        Self::VerbatimBreak,
        Self::InaccurateData,
        Self::ImproperIntro,
        Self::MandatoryText,
        Self::LeadingBias,
    ];

    /// Scored fields whose failure triggers this category
    fn trigger_fields(self) -> &'static [&'static str] {
        match self {
            Self::Address => &["mailing_address", "home_address"],
            Self::DelayedCoding => &["delayed_coding"],
            Self::Persuading => &["persuading_respondent"],
            Self::IncorrectDisposition => &["disposition_code"],
            Self::VerbatimBreak => &["verbatim_response"],
            Self::InaccurateData => &["data_entry_accuracy"],
            Self::ImproperIntro => &["proper_introduction"],
            Self::MandatoryText => &["mandatory_script"],
            Self::LeadingBias => &["leading_questions"],
        }
    }

    fn applies(self, record: &Record) -> bool {
        self.trigger_fields()
            .iter()
            .any(|f| record.field(f).is_some_and(|v| v.is_failing_score()))
    }
}

impl std::fmt::Display for DeviationCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Address => write!(f, "address"),
            Self::DelayedCoding => write!(f, "delayed_coding"),
            Self::Persuading => write!(f, "persuading"),
            Self::IncorrectDisposition => write!(f, "incorrect_disposition"),
            Self::VerbatimBreak => write!(f, "verbatim_break"),
            Self::InaccurateData => write!(f, "inaccurate_data"),
            Self::ImproperIntro => write!(f, "improper_intro"),
            Self::MandatoryText => write!(f, "mandatory_text"),
            Self::LeadingBias => write!(f, "leading_bias"),
        }
    }
}

/// CMR accuracy summary for one reporting window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CmrSummary {
    pub total_calls: usize,
    /// Mean of scored rows over ALL rows, rounded to two decimals.
    /// The denominator is every call attempted, not every call scored;
    /// that asymmetry is inherited behavior and intentional.
    pub total_accuracy: f64,
    pub mca_dates: Vec<NaiveDate>,
}

/// Build the per-category deviation date lists for a record window.
///
/// Records are sorted by record number first so that records sharing a date
/// always land in the same order; each category keeps a de-duplicated date
/// list in first-insertion order. Running this twice over the same input
/// yields identical output.
pub fn build_summary_dates(records: &[Record]) -> Vec<(DeviationCategory, Vec<NaiveDate>)> {
    let mut sorted: Vec<&Record> = records.iter().collect();
    sorted.sort_by_key(|r| r.record_number);

    DeviationCategory::ALL
        .iter()
        .map(|category| {
            let mut dates: Vec<NaiveDate> = Vec::new();
            for record in &sorted {
                if category.applies(record) && !dates.contains(&record.record_date) {
                    dates.push(record.record_date);
                }
            }
            (*category, dates)
        })
        .collect()
}

/// Build the CMR summary from assembled report rows.
pub fn build_cmr_summary(rows: &[ReportRow]) -> CmrSummary {
    let total_calls = rows.len();
    let scored_sum: f64 = rows
        .iter()
        .map(|r| r.final_score)
        .filter(|s| !s.is_nan())
        .sum();

    let total_accuracy = if total_calls == 0 {
        0.0
    } else {
        let mean = scored_sum / total_calls as f64;
        (mean * 100.0).round() / 100.0
    };

    let mut mca_dates: Vec<NaiveDate> = Vec::new();
    for row in rows {
        let flagged = row
            .record
            .text_field("mca_category")
            .is_some_and(|c| !c.is_empty());
        if flagged && !mca_dates.contains(&row.record.record_date) {
            mca_dates.push(row.record.record_date);
        }
    }

    CmrSummary {
        total_calls,
        total_accuracy,
        mca_dates,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reports::build_report_rows;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn row(record: Record, final_score: f64) -> ReportRow {
        ReportRow {
            record,
            final_score,
            obsv_diffs: Vec::new(),
            call_notes: String::new(),
        }
    }

    #[test]
    fn test_summary_dates_sorted_and_deduplicated() {
        let records = vec![
            // deliberately out of record-number order
            Record::new(300, date("2026-01-08"), "RI-1").with_field("delayed_coding", -1i64),
            Record::new(100, date("2026-01-05"), "RI-1").with_field("mailing_address", -1i64),
            Record::new(200, date("2026-01-05"), "RI-1").with_field("home_address", -1i64),
        ];

        let summary = build_summary_dates(&records);
        let address = &summary
            .iter()
            .find(|(c, _)| *c == DeviationCategory::Address)
            .unwrap()
            .1;
        // two address deviations on the same date collapse to one entry
        assert_eq!(address, &vec![date("2026-01-05")]);

        let delayed = &summary
            .iter()
            .find(|(c, _)| *c == DeviationCategory::DelayedCoding)
            .unwrap()
            .1;
        assert_eq!(delayed, &vec![date("2026-01-08")]);

        let leading = &summary
            .iter()
            .find(|(c, _)| *c == DeviationCategory::LeadingBias)
            .unwrap()
            .1;
        assert!(leading.is_empty());
    }

    #[test]
    fn test_summary_dates_idempotent() {
        let records = vec![
            Record::new(2, date("2026-01-06"), "RI-1").with_field("mandatory_script", -1i64),
            Record::new(1, date("2026-01-05"), "RI-1").with_field("leading_questions", -1i64),
        ];
        let first = build_summary_dates(&records);
        let second = build_summary_dates(&records);
        assert_eq!(first, second);
    }

    #[test]
    fn test_records_missing_fields_are_skipped() {
        // no scored fields at all: every category list stays empty
        let records = vec![Record::new(1, date("2026-01-05"), "RI-1")];
        let summary = build_summary_dates(&records);
        assert!(summary.iter().all(|(_, dates)| dates.is_empty()));
    }

    #[test]
    fn test_cmr_summary_all_rows_denominator() {
        let rows = vec![
            row(Record::new(1, date("2026-01-05"), "RI-1"), 80.0),
            row(Record::new(2, date("2026-01-06"), "RI-1"), f64::NAN),
        ];
        let summary = build_cmr_summary(&rows);
        assert_eq!(summary.total_calls, 2);
        // 80 / 2, not 80 / 1
        assert_eq!(summary.total_accuracy, 40.0);
    }

    #[test]
    fn test_cmr_summary_rounding() {
        let rows = vec![
            row(Record::new(1, date("2026-01-05"), "RI-1"), 85.0),
            row(Record::new(2, date("2026-01-06"), "RI-1"), 90.5),
            row(Record::new(3, date("2026-01-07"), "RI-1"), 91.0),
        ];
        let summary = build_cmr_summary(&rows);
        // 266.5 / 3 = 88.8333... -> 88.83
        assert_eq!(summary.total_accuracy, 88.83);
    }

    #[test]
    fn test_cmr_summary_empty_window() {
        let summary = build_cmr_summary(&[]);
        assert_eq!(summary.total_calls, 0);
        assert_eq!(summary.total_accuracy, 0.0);
        assert!(summary.mca_dates.is_empty());
    }

    #[test]
    fn test_cmr_summary_mca_dates() {
        let records = vec![
            Record::new(1, date("2026-01-05"), "RI-1").with_field("mca_category", "falsification"),
            Record::new(2, date("2026-01-05"), "RI-1").with_field("mca_category", "coaching"),
            Record::new(3, date("2026-01-07"), "RI-1").with_field("mca_category", ""),
        ];
        let rows = build_report_rows(&records, &[]);
        let summary = build_cmr_summary(&rows);
        assert_eq!(summary.mca_dates, vec![date("2026-01-05")]);
    }
}
