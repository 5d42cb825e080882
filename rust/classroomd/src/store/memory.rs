use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use serde_json::Value;
use uuid::Uuid;

use super::schema::{schema, ATTENDANCE_NATURAL_KEY};
use super::{BatchResult, Fields, Query, RecordResult, RecordStore, Row, StoreError, Table};

/// Injected in-memory backend. Each instance owns its tables.
///
/// `latency` is slept after every read, outside the table lock, which widens
/// the window between a lookup and the write that depends on it.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<HashMap<Table, Vec<Row>>>,
    latency: Option<Duration>,
    unique_attendance: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Reject a second attendance row for the same (student, date).
    pub fn with_unique_attendance(mut self) -> Self {
        self.unique_attendance = true;
        self
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<Table, Vec<Row>>>, StoreError> {
        self.tables
            .lock()
            .map_err(|_| StoreError::remote("memory store is poisoned"))
    }

    fn pause(&self) {
        if let Some(d) = self.latency {
            std::thread::sleep(d);
        }
    }
}

fn check_fields(table: Table, fields: &Fields, full: bool) -> Vec<String> {
    let s = schema(table);
    let mut errors: Vec<String> = fields
        .keys()
        .filter(|k| k.as_str() != "id" && s.column(k).is_none())
        .map(|k| format!("unknown field {}", k))
        .collect();
    if full {
        for c in s.columns {
            let missing = fields.get(c.field).map(Value::is_null).unwrap_or(true);
            if missing && !c.nullable {
                errors.push(format!("{} is required", c.field));
            }
        }
    }
    errors
}

fn rejected(errors: Vec<String>) -> RecordResult {
    RecordResult {
        message: errors.first().cloned(),
        errors,
        ..RecordResult::failed("")
    }
}

fn same_natural_key(a: &Row, b: &Row) -> bool {
    ATTENDANCE_NATURAL_KEY
        .iter()
        .all(|k| a.get(*k).is_some() && a.get(*k) == b.get(*k))
}

impl RecordStore for MemoryStore {
    fn fetch_records(&self, table: Table, query: &Query) -> Result<Vec<Row>, StoreError> {
        let mut rows: Vec<Row> = {
            let tables = self.lock()?;
            tables
                .get(&table)
                .map(|rows| rows.iter().filter(|r| query.matches(r)).cloned().collect())
                .unwrap_or_default()
        };
        for o in query.order_by.iter().rev() {
            rows.sort_by(|a, b| {
                let ord = compare_values(
                    a.get(&o.field).unwrap_or(&Value::Null),
                    b.get(&o.field).unwrap_or(&Value::Null),
                );
                if o.descending {
                    ord.reverse()
                } else {
                    ord
                }
            });
        }
        self.pause();
        Ok(rows)
    }

    fn get_record_by_id(&self, table: Table, id: &str) -> Result<Row, StoreError> {
        let found = {
            let tables = self.lock()?;
            tables
                .get(&table)
                .and_then(|rows| rows.iter().find(|r| r.get("id") == Some(&Value::from(id))))
                .cloned()
        };
        self.pause();
        found.ok_or_else(|| StoreError::NotFound {
            table,
            id: id.to_string(),
        })
    }

    fn create_records(&self, table: Table, records: Vec<Fields>) -> Result<BatchResult, StoreError> {
        let mut tables = self.lock()?;
        let rows = tables.entry(table).or_default();
        let mut results = Vec::with_capacity(records.len());
        for fields in records {
            let errors = check_fields(table, &fields, true);
            if !errors.is_empty() {
                results.push(rejected(errors));
                continue;
            }
            let mut row = fields;
            for c in schema(table).columns {
                row.entry(c.field.to_string()).or_insert(Value::Null);
            }
            row.insert("id".to_string(), Value::from(Uuid::new_v4().to_string()));
            if table == Table::Attendance
                && self.unique_attendance
                && rows.iter().any(|r| same_natural_key(r, &row))
            {
                results.push(RecordResult::duplicate("duplicate attendance record"));
                continue;
            }
            rows.push(row.clone());
            results.push(RecordResult::ok(row));
        }
        Ok(BatchResult { results })
    }

    fn update_records(
        &self,
        table: Table,
        records: Vec<(String, Fields)>,
    ) -> Result<BatchResult, StoreError> {
        let mut tables = self.lock()?;
        let rows = tables.entry(table).or_default();
        let mut results = Vec::with_capacity(records.len());
        for (id, fields) in records {
            let errors = check_fields(table, &fields, false);
            if !errors.is_empty() {
                results.push(rejected(errors));
                continue;
            }
            let Some(row) = rows
                .iter_mut()
                .find(|r| r.get("id") == Some(&Value::from(id.as_str())))
            else {
                results.push(RecordResult::failed(format!(
                    "{} record not found: {}",
                    table.label(),
                    id
                )));
                continue;
            };
            for (k, v) in fields {
                if k != "id" {
                    row.insert(k, v);
                }
            }
            results.push(RecordResult::ok(row.clone()));
        }
        Ok(BatchResult { results })
    }

    fn delete_records(&self, table: Table, ids: &[String]) -> Result<BatchResult, StoreError> {
        let mut tables = self.lock()?;
        let rows = tables.entry(table).or_default();
        let mut results = Vec::with_capacity(ids.len());
        for id in ids {
            let before = rows.len();
            rows.retain(|r| r.get("id") != Some(&Value::from(id.as_str())));
            if rows.len() == before {
                results.push(RecordResult::failed(format!(
                    "{} record not found: {}",
                    table.label(),
                    id
                )));
            } else {
                results.push(RecordResult::deleted());
            }
        }
        Ok(BatchResult { results })
    }
}

fn compare_values(a: &Value, b: &Value) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => a.to_string().cmp(&b.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attendance(student: &str, date: &str) -> Fields {
        json!({"studentId": student, "date": date, "status": "present", "notes": ""})
            .as_object()
            .cloned()
            .expect("object")
    }

    #[test]
    fn separate_instances_do_not_share_rows() {
        let a = MemoryStore::new();
        let b = MemoryStore::new();
        a.create_records(Table::Attendance, vec![attendance("s1", "2024-01-10")])
            .expect("create");
        assert_eq!(a.fetch_records(Table::Attendance, &Query::all()).expect("a").len(), 1);
        assert!(b.fetch_records(Table::Attendance, &Query::all()).expect("b").is_empty());
    }

    #[test]
    fn duplicates_allowed_unless_unique_enabled() {
        let loose = MemoryStore::new();
        for _ in 0..2 {
            loose
                .create_records(Table::Attendance, vec![attendance("s1", "2024-01-10")])
                .expect("create")
                .into_rows(Table::Attendance)
                .expect("rows");
        }
        assert_eq!(
            loose.fetch_records(Table::Attendance, &Query::all()).expect("fetch").len(),
            2
        );

        let strict = MemoryStore::new().with_unique_attendance();
        strict
            .create_records(Table::Attendance, vec![attendance("s1", "2024-01-10")])
            .expect("create");
        let second = strict
            .create_records(Table::Attendance, vec![attendance("s1", "2024-01-10")])
            .expect("create")
            .into_rows(Table::Attendance);
        assert!(matches!(second, Err(StoreError::Conflict { .. })));
    }

    #[test]
    fn order_by_descending() {
        let store = MemoryStore::new();
        for d in ["2024-01-09", "2024-01-11", "2024-01-10"] {
            store
                .create_records(Table::Attendance, vec![attendance("s1", d)])
                .expect("create");
        }
        let rows = store
            .fetch_records(Table::Attendance, &Query::all().order_by("date", true))
            .expect("fetch");
        let dates: Vec<&str> = rows.iter().filter_map(|r| r["date"].as_str()).collect();
        assert_eq!(dates, vec!["2024-01-11", "2024-01-10", "2024-01-09"]);
    }

    #[test]
    fn atomic_upsert_is_not_offered() {
        let store = MemoryStore::new();
        assert!(!store.supports_atomic_upsert());
        assert!(matches!(
            store.upsert_record(Table::Attendance, ATTENDANCE_NATURAL_KEY, attendance("s", "d")),
            Err(StoreError::Unsupported(_))
        ));
    }
}
