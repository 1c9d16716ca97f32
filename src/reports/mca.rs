//! MCA priority selection
//!
//! When a reporting window holds more than one escalation record for the
//! same RI, exactly one becomes the primary record of the MCA report. The
//! choice is driven by a priority table; the selection must be
//! deterministic for identical inputs, including ties.

use crate::record::Record;
use chrono::{Months, NaiveDate};
use serde::Serialize;
use std::collections::HashMap;

/// Category name -> priority rank (lower rank wins)
pub type PriorityTable = HashMap<String, i32>;

/// The stock priority table used when a site does not configure its own
pub fn default_priority_table() -> PriorityTable {
    let mut table = PriorityTable::new();
    table.insert("falsification".to_string(), 1);
    table.insert("coaching".to_string(), 2);
    table.insert("privacy_breach".to_string(), 3);
    table.insert("hostile_conduct".to_string(), 4);
    table.insert("procedure_break".to_string(), 5);
    table
}

/// Primary escalation record plus its look-back context
#[derive(Debug, Clone, Serialize)]
pub struct McaSelection {
    pub primary: Record,
    /// Same-RI escalations dated within the 12 months before the window
    pub prior_escalations: Vec<Record>,
}

fn priority_of(record: &Record, table: &PriorityTable) -> i64 {
    record
        .text_field("mca_category")
        .and_then(|c| table.get(c))
        .map(|p| i64::from(*p))
        .unwrap_or(i64::MAX)
}

/// Pick the single highest-priority candidate.
///
/// A lone candidate is returned unchanged. Otherwise candidates rank by
/// `table[mca_category]` ascending, with categories missing from the table
/// ranking last; ties keep the original array order.
pub fn select_primary<'a>(candidates: &'a [Record], table: &PriorityTable) -> Option<&'a Record> {
    if candidates.len() <= 1 {
        return candidates.first();
    }
    candidates
        .iter()
        .enumerate()
        .min_by_key(|(index, record)| (priority_of(record, table), *index))
        .map(|(_, record)| record)
}

/// Select the primary record for one (RI, window) pair and collect the
/// 12-month prior escalation list from `history`.
pub fn select_for_window(
    candidates: &[Record],
    history: &[Record],
    window_date: NaiveDate,
    table: &PriorityTable,
) -> Option<McaSelection> {
    let primary = select_primary(candidates, table)?.clone();
    let cutoff = window_date
        .checked_sub_months(Months::new(12))
        .unwrap_or(NaiveDate::MIN);

    let prior_escalations = history
        .iter()
        .filter(|h| {
            h.ri_id == primary.ri_id && h.record_date >= cutoff && h.record_date < window_date
        })
        .cloned()
        .collect();

    Some(McaSelection {
        primary,
        prior_escalations,
    })
}
