//! Common test utilities for callaudit integration tests
//!
//! Provides a seeded in-memory record store, record builders, and temp
//! directories for audit/session files.

use callaudit::record::{FieldValue, Record, RecordType};
use callaudit::store::{MemoryStore, StoreUser};
use chrono::NaiveDate;
use tempfile::TempDir;

/// Test context holding temporary resources and a seeded store
#[allow(dead_code)]
pub struct TestContext {
    pub temp_dir: TempDir,
    pub store: MemoryStore,
}

#[allow(dead_code)]
impl TestContext {
    pub fn new() -> Self {
        let store = MemoryStore::new();
        store.seed_user(StoreUser {
            qr_id: "QR-0440".to_string(),
            site_name: "West".to_string(),
            email: "sam@example.com".to_string(),
        });
        Self {
            temp_dir: TempDir::new().expect("Failed to create temp dir"),
            store,
        }
    }

    /// Seed monitoring records numbered from `start`
    pub fn seed_monitoring(&self, count: i64, start: i64) {
        let records = (0..count)
            .map(|i| monitoring_record(start + i, "2026-03-02", "RI-1"))
            .collect();
        self.store.seed_records(RecordType::Monitoring, records);
    }

    pub fn temp_path(&self) -> &std::path::Path {
        self.temp_dir.path()
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

pub fn date(s: &str) -> NaiveDate {
    s.parse().unwrap()
}

/// A monitoring record with every scored question passing
pub fn monitoring_record(number: i64, day: &str, ri: &str) -> Record {
    let mut record = Record::new(number, date(day), ri)
        .with_field("audio_smp", "44210")
        .with_field("call_type", "landline")
        .with_field("frame_code", "LL1")
        .with_field("monitor_complete", true)
        .with_field("call_notes", "");
    for field in RecordType::Monitoring.scored_fields() {
        record.set_field(field, FieldValue::Number(1.0));
    }
    record
}

/// Mark scored questions as failures on an existing record
#[allow(dead_code)]
pub fn with_failures(mut record: Record, fields: &[&str]) -> Record {
    for field in fields {
        record.set_field(field, FieldValue::Number(-1.0));
    }
    record
}

/// A score-source row for one record number
#[allow(dead_code)]
pub fn score_record(number: i64, day: &str, ri: &str, score: f64) -> Record {
    Record::new(number, date(day), ri).with_field("final_score", score)
}
