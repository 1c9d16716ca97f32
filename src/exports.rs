//! CSV export for report tables
//!
//! The output contract is byte-exact for spreadsheet interoperability:
//! the header row is the object keys of the first row, every string value
//! (headers included) is individually double-quoted with embedded quotes
//! doubled, numbers and booleans are bare, null is empty, fields are
//! comma-joined and rows newline-joined.

use crate::record::{Record, RecordType};
use crate::reports::ReportRow;
use serde_json::{Map, Value};

fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

fn render(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => quote(s),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Number(n)) => n.to_string(),
        // nested structures export as their JSON text
        Some(other) => quote(&other.to_string()),
    }
}

/// Export object rows as CSV. Columns come from the first row's keys;
/// later rows are projected onto those columns. Empty input yields an
/// empty string.
pub fn rows_to_csv(rows: &[Map<String, Value>]) -> String {
    let Some(first) = rows.first() else {
        return String::new();
    };
    let columns: Vec<&String> = first.keys().collect();

    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(
        columns
            .iter()
            .map(|c| quote(c))
            .collect::<Vec<_>>()
            .join(","),
    );
    for row in rows {
        lines.push(
            columns
                .iter()
                .map(|c| render(row.get(c.as_str())))
                .collect::<Vec<_>>()
                .join(","),
        );
    }
    lines.join("\n")
}

/// Export arbitrary JSON values; non-object entries are skipped
pub fn values_to_csv(values: &[Value]) -> String {
    let rows: Vec<Map<String, Value>> = values
        .iter()
        .filter_map(|v| v.as_object().cloned())
        .collect();
    rows_to_csv(&rows)
}

/// Export records with a deterministic column order: the identifying
/// attributes first, then the record type's declared fields.
pub fn records_to_csv(record_type: RecordType, records: &[Record]) -> String {
    let rows: Vec<Map<String, Value>> = records
        .iter()
        .map(|r| record_row(record_type, r))
        .collect();
    rows_to_csv(&rows)
}

fn record_row(record_type: RecordType, record: &Record) -> Map<String, Value> {
    let mut row = Map::new();
    row.insert("record_number".into(), Value::from(record.record_number));
    row.insert(
        "record_date".into(),
        Value::String(record.record_date.to_string()),
    );
    row.insert("ri_id".into(), Value::String(record.ri_id.clone()));
    for spec in record_type.field_specs() {
        if matches!(spec.label, "record_number" | "record_date" | "ri_id") {
            continue;
        }
        let value = record
            .field(spec.label)
            .map(|v| serde_json::to_value(v).unwrap_or(Value::Null))
            .unwrap_or(Value::Null);
        row.insert(spec.label.to_string(), value);
    }
    row
}

/// Export CMR report rows (deviation ordinals join with `;`)
pub fn report_rows_to_csv(rows: &[ReportRow]) -> String {
    let mapped: Vec<Map<String, Value>> = rows
        .iter()
        .map(|row| {
            let mut out = Map::new();
            out.insert(
                "record_number".into(),
                Value::from(row.record.record_number),
            );
            out.insert(
                "record_date".into(),
                Value::String(row.record.record_date.to_string()),
            );
            out.insert("ri_id".into(), Value::String(row.record.ri_id.clone()));
            out.insert(
                "final_score".into(),
                serde_json::Number::from_f64(row.final_score)
                    .map(Value::Number)
                    .unwrap_or(Value::Null),
            );
            let diffs = row
                .obsv_diffs
                .iter()
                .map(usize::to_string)
                .collect::<Vec<_>>()
                .join(";");
            out.insert("obsv_diffs".into(), Value::String(diffs));
            out.insert("call_notes".into(), Value::String(row.call_notes.clone()));
            out
        })
        .collect();
    rows_to_csv(&mapped)
}
