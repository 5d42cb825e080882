//! Record-store boundary.
//!
//! Everything above this module talks to storage through [`RecordStore`]:
//! named tables of flat JSON-shaped rows, fetched by equality filters and
//! written in batches that report per-record success. Backends are injected
//! (`SqliteStore` for a workspace, `MemoryStore` for tests), never global.

mod error;
#[cfg(test)]
pub mod memory;
pub mod schema;
pub mod sqlite;

use serde::Serialize;
use serde_json::{Map, Value};

pub use error::{FieldError, RecordFailure, StoreError};
#[cfg(test)]
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

pub type Fields = Map<String, Value>;
pub type Row = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Table {
    Students,
    Classes,
    Attendance,
    Grades,
    CurriculumActivities,
}

impl Table {
    pub const ALL: [Table; 5] = [
        Table::Students,
        Table::Classes,
        Table::Attendance,
        Table::Grades,
        Table::CurriculumActivities,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Table::Students => "student",
            Table::Classes => "class",
            Table::Attendance => "attendance",
            Table::Grades => "grade",
            Table::CurriculumActivities => "curriculum activity",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub field: String,
    pub descending: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order_by: Vec<OrderBy>,
}

impl Query {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn where_eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            field: field.to_string(),
            value: value.into(),
        });
        self
    }

    pub fn order_by(mut self, field: &str, descending: bool) -> Self {
        self.order_by.push(OrderBy {
            field: field.to_string(),
            descending,
        });
        self
    }

    /// In-memory evaluation used by backends without a query engine.
    pub fn matches(&self, row: &Row) -> bool {
        self.filters
            .iter()
            .all(|f| row.get(&f.field).unwrap_or(&Value::Null) == &f.value)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Row>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Machine-readable failure kind, e.g. [`DUPLICATE_KEY`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

pub const DUPLICATE_KEY: &str = "duplicate_key";

impl RecordResult {
    pub fn ok(data: Row) -> Self {
        Self {
            success: true,
            data: Some(data),
            ..Default::default()
        }
    }

    pub fn deleted() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn duplicate(message: impl Into<String>) -> Self {
        Self {
            code: Some(DUPLICATE_KEY.to_string()),
            ..Self::failed(message)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchResult {
    pub results: Vec<RecordResult>,
}

impl BatchResult {
    /// Collects every failed record; the error message is the first failure's.
    /// A single-record batch rejected for a duplicate key becomes `Conflict`.
    pub fn into_rows(self, table: Table) -> Result<Vec<Row>, StoreError> {
        if let [only] = self.results.as_slice() {
            if !only.success && only.code.as_deref() == Some(DUPLICATE_KEY) {
                return Err(StoreError::Conflict {
                    table,
                    key: only.message.clone().unwrap_or_default(),
                });
            }
        }
        let mut rows = Vec::with_capacity(self.results.len());
        let mut failures = Vec::new();
        for (index, r) in self.results.into_iter().enumerate() {
            if r.success {
                if let Some(data) = r.data {
                    rows.push(data);
                }
                continue;
            }
            failures.push(RecordFailure {
                index,
                message: r
                    .message
                    .clone()
                    .or_else(|| r.errors.first().cloned())
                    .unwrap_or_else(|| format!("failed to write {} record", table.label())),
                errors: r.errors,
                code: r.code,
            });
        }
        if failures.is_empty() {
            Ok(rows)
        } else {
            Err(StoreError::PartialWrite { table, failures })
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum UpsertOutcome {
    Created,
    Updated,
}

pub trait RecordStore: Send + Sync {
    fn fetch_records(&self, table: Table, query: &Query) -> Result<Vec<Row>, StoreError>;

    fn get_record_by_id(&self, table: Table, id: &str) -> Result<Row, StoreError>;

    fn create_records(&self, table: Table, records: Vec<Fields>) -> Result<BatchResult, StoreError>;

    fn update_records(
        &self,
        table: Table,
        records: Vec<(String, Fields)>,
    ) -> Result<BatchResult, StoreError>;

    fn delete_records(&self, table: Table, ids: &[String]) -> Result<BatchResult, StoreError>;

    fn supports_atomic_upsert(&self) -> bool {
        false
    }

    /// Insert `fields`, or overwrite the non-key fields of the row whose
    /// `natural_key` fields match, as one storage-level operation.
    fn upsert_record(
        &self,
        _table: Table,
        _natural_key: &[&str],
        _fields: Fields,
    ) -> Result<(Row, UpsertOutcome), StoreError> {
        Err(StoreError::Unsupported("atomic upsert is not supported by this store"))
    }
}
