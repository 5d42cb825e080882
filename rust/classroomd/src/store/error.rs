use serde::Serialize;
use thiserror::Error;

use super::Table;

/// One record-level failure out of a batch write.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordFailure {
    pub index: usize,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// Field-level validation failure, keyed by the camelCase field name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{} record not found: {id}", .table.label())]
    NotFound { table: Table, id: String },

    #[error("validation failed: {}", first_field_message(.0))]
    Validation(Vec<FieldError>),

    #[error("record store failure: {0}")]
    Remote(String),

    #[error("{}", first_failure_message(.failures))]
    PartialWrite {
        table: Table,
        failures: Vec<RecordFailure>,
    },

    #[error("duplicate {} record for key {key}", .table.label())]
    Conflict { table: Table, key: String },

    #[error("timed out after {waited_ms}ms waiting for {what}")]
    Timeout { what: String, waited_ms: u64 },

    #[error("{0}")]
    Unsupported(&'static str),
}

impl StoreError {
    pub fn remote(message: impl Into<String>) -> Self {
        StoreError::Remote(message.into())
    }

    pub fn field(field: &str, message: impl Into<String>) -> Self {
        StoreError::Validation(vec![FieldError {
            field: field.to_string(),
            message: message.into(),
        }])
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(code, _) = &e {
            if code.code == rusqlite::ErrorCode::DatabaseBusy
                || code.code == rusqlite::ErrorCode::DatabaseLocked
            {
                return StoreError::Timeout {
                    what: "workspace database lock".to_string(),
                    waited_ms: 0,
                };
            }
        }
        StoreError::Remote(e.to_string())
    }
}

fn first_field_message(errors: &[FieldError]) -> String {
    errors
        .first()
        .map(|e| format!("{}: {}", e.field, e.message))
        .unwrap_or_else(|| "invalid record".to_string())
}

fn first_failure_message(failures: &[RecordFailure]) -> String {
    failures
        .first()
        .map(|f| f.message.clone())
        .unwrap_or_else(|| "batch write failed".to_string())
}
