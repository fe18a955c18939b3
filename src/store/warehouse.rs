//! Warehouse mirror — best-effort append-only analytics sink.
//!
//! One table per stage, one row per committed case. The document store
//! stays authoritative: append failures are logged and ignored. Rows
//! collapse list values to comma-separated strings and replace sentinel
//! timestamps with the current UTC instant.

use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::PathBuf;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::StoreError;

/// Append-only analytics sink.
pub trait WarehouseSink: Send + Sync {
    fn append(&self, table: &str, row: &Value) -> Result<(), StoreError>;
}

/// Mirror a committed document to the warehouse, swallowing failures.
pub fn mirror<T: Serialize>(sink: &dyn WarehouseSink, table: &str, doc: &T) {
    let row = match serde_json::to_value(doc) {
        Ok(value) => flatten_row(value),
        Err(e) => {
            warn!(table, error = %e, "Warehouse row serialization failed, skipping");
            return;
        }
    };
    match sink.append(table, &row) {
        Ok(()) => debug!(table, "Mirrored row to warehouse"),
        Err(e) => warn!(table, error = %e, "Warehouse append failed (non-fatal)"),
    }
}

/// Collapse lists to comma-separated strings and fill sentinel
/// timestamps, producing a flat analytics row.
fn flatten_row(value: Value) -> Value {
    let Value::Object(fields) = value else {
        return value;
    };
    let flattened = fields
        .into_iter()
        .map(|(key, field)| {
            let flat = match field {
                Value::Array(items) => Value::String(
                    items
                        .iter()
                        .map(render_scalar)
                        .collect::<Vec<_>>()
                        .join(","),
                ),
                Value::Null if key.ends_with("_at") => {
                    Value::String(Utc::now().to_rfc3339())
                }
                other => other,
            };
            (key, flat)
        })
        .collect();
    Value::Object(flattened)
}

fn render_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// File-backed warehouse: one JSONL file per table under a directory.
pub struct JsonlWarehouse {
    dir: PathBuf,
}

impl JsonlWarehouse {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }
}

impl WarehouseSink for JsonlWarehouse {
    fn append(&self, table: &str, row: &Value) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| StoreError::Database(sled::Error::Io(e)))?;
        let path = self.dir.join(format!("{table}.jsonl"));
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| StoreError::Database(sled::Error::Io(e)))?;
        let mut line = serde_json::to_vec(row)?;
        line.push(b'\n');
        file.write_all(&line)
            .map_err(|e| StoreError::Database(sled::Error::Io(e)))?;
        Ok(())
    }
}

/// Disabled mirror.
pub struct NullWarehouse;

impl WarehouseSink for NullWarehouse {
    fn append(&self, _table: &str, _row: &Value) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lists_collapse_to_comma_strings() {
        let row = flatten_row(json!({
            "case_id": "case_1",
            "telemetry_event_ids": ["evt_1", "evt_2"],
            "fallback_slots": [],
        }));
        assert_eq!(row["telemetry_event_ids"], json!("evt_1,evt_2"));
        assert_eq!(row["fallback_slots"], json!(""));
    }

    #[test]
    fn sentinel_timestamps_become_now() {
        let row = flatten_row(json!({"created_at": null, "outcome": null}));
        assert!(row["created_at"].is_string());
        // Non-timestamp nulls stay null.
        assert!(row["outcome"].is_null());
    }

    #[test]
    fn jsonl_sink_appends() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonlWarehouse::new(dir.path().to_path_buf());
        sink.append("anomaly_cases", &json!({"case_id": "case_1"})).unwrap();
        sink.append("anomaly_cases", &json!({"case_id": "case_2"})).unwrap();

        let raw = std::fs::read_to_string(dir.path().join("anomaly_cases.jsonl")).unwrap();
        assert_eq!(raw.lines().count(), 2);
    }

    #[test]
    fn mirror_swallows_failures() {
        struct Failing;
        impl WarehouseSink for Failing {
            fn append(&self, _table: &str, _row: &Value) -> Result<(), StoreError> {
                Err(StoreError::NotFound {
                    collection: "x",
                    key: "y".to_string(),
                })
            }
        }
        // Must not panic or propagate.
        mirror(&Failing, "anomaly_cases", &json!({"case_id": "case_1"}));
    }
}
