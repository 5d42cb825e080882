use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use anyhow::Context;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection, ErrorCode, OptionalExtension, TransactionBehavior};
use serde_json::Value;
use uuid::Uuid;

use super::schema::{schema, Column, ColumnKind, TableSchema};
use super::{
    BatchResult, Fields, Query, RecordResult, RecordStore, Row, StoreError, Table, UpsertOutcome,
};

pub const DB_FILE: &str = crate::backup::WORKSPACE_DB;

pub fn open_db(workspace: &Path, busy_timeout: Duration) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)
        .with_context(|| format!("failed to create workspace {}", workspace.to_string_lossy()))?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(&db_path)
        .with_context(|| format!("failed to open database {}", db_path.to_string_lossy()))?;
    conn.busy_timeout(busy_timeout)?;
    init_schema(&conn).context("failed to initialize workspace schema")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    // No foreign keys: deleting a class or student leaves referencing rows alone.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            year INTEGER NOT NULL,
            section TEXT NOT NULL,
            capacity INTEGER,
            teacher_id TEXT,
            updated_at TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            email TEXT NOT NULL,
            phone TEXT NOT NULL,
            date_of_birth TEXT NOT NULL,
            enrollment_date TEXT NOT NULL,
            status TEXT NOT NULL,
            guardian_name TEXT NOT NULL,
            guardian_contact TEXT NOT NULL,
            class_id TEXT,
            updated_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class ON students(class_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            date TEXT NOT NULL,
            status TEXT NOT NULL,
            notes TEXT NOT NULL DEFAULT '',
            updated_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_date ON attendance(date)",
        [],
    )?;
    // Workspaces written before the unique index may hold duplicate
    // (student, date) rows. Keep the most recently inserted one.
    collapse_duplicate_attendance(conn)?;
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_attendance_student_date
         ON attendance(student_id, date)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS grades(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            subject TEXT NOT NULL,
            term TEXT NOT NULL,
            score REAL NOT NULL,
            max_score REAL NOT NULL,
            letter_grade TEXT NOT NULL,
            date TEXT NOT NULL,
            updated_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grades_student ON grades(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS curriculum_activities(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            internal_name TEXT NOT NULL,
            description TEXT NOT NULL,
            start_date TEXT,
            end_date TEXT,
            updated_at TEXT
        )",
        [],
    )?;
    // Tags arrived after the first activities schema.
    ensure_column(
        conn,
        "curriculum_activities",
        "tags",
        "TEXT NOT NULL DEFAULT ''",
    )?;

    Ok(())
}

fn collapse_duplicate_attendance(conn: &Connection) -> anyhow::Result<()> {
    let removed = conn.execute(
        "DELETE FROM attendance
         WHERE rowid NOT IN (
           SELECT MAX(rowid) FROM attendance GROUP BY student_id, date
         )",
        [],
    )?;
    if removed > 0 {
        tracing::warn!(removed, "collapsed duplicate attendance rows");
    }
    Ok(())
}

fn ensure_column(conn: &Connection, table: &str, column: &str, decl: &str) -> anyhow::Result<()> {
    if table_has_column(conn, table, column)? {
        return Ok(());
    }
    conn.execute(
        &format!("ALTER TABLE {} ADD COLUMN {} {}", table, column, decl),
        [],
    )?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Workspace-backed store. One connection, serialized behind a mutex.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(workspace: &Path, busy_timeout: Duration) -> anyhow::Result<Self> {
        let conn = open_db(workspace, busy_timeout)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Flush any WAL content into the main file before it is copied.
    pub fn checkpoint(&self) -> Result<(), StoreError> {
        self.lock()?.execute_batch("PRAGMA wal_checkpoint(FULL)")?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::remote("workspace connection is poisoned"))
    }
}

fn select_list(s: &TableSchema) -> String {
    let mut cols = vec!["id"];
    cols.extend(s.columns.iter().map(|c| c.column));
    cols.join(", ")
}

fn column_for(s: &TableSchema, field: &str) -> Result<&'static str, StoreError> {
    if field == "id" {
        return Ok("id");
    }
    s.column(field)
        .map(|c| c.column)
        .ok_or_else(|| StoreError::remote(format!("unknown field {} on {}", field, s.sql_name)))
}

fn to_sql(col: &Column, v: &Value) -> Result<SqlValue, String> {
    if v.is_null() {
        if col.nullable {
            return Ok(SqlValue::Null);
        }
        return Err(format!("{} is required", col.field));
    }
    match col.kind {
        ColumnKind::Text => v
            .as_str()
            .map(|s| SqlValue::Text(s.to_string()))
            .ok_or_else(|| format!("{} must be a string", col.field)),
        ColumnKind::Integer => v
            .as_i64()
            .map(SqlValue::Integer)
            .ok_or_else(|| format!("{} must be an integer", col.field)),
        ColumnKind::Real => v
            .as_f64()
            .map(SqlValue::Real)
            .ok_or_else(|| format!("{} must be a number", col.field)),
    }
}

fn filter_value(s: &TableSchema, field: &str, v: &Value) -> Result<SqlValue, StoreError> {
    if field == "id" {
        return v
            .as_str()
            .map(|s| SqlValue::Text(s.to_string()))
            .ok_or_else(|| StoreError::remote("id filter must be a string"));
    }
    let col = s
        .column(field)
        .ok_or_else(|| StoreError::remote(format!("unknown field {} on {}", field, s.sql_name)))?;
    to_sql(col, v).map_err(StoreError::Remote)
}

fn from_sql(kind: ColumnKind, v: ValueRef<'_>) -> Value {
    match (kind, v) {
        (_, ValueRef::Null) => Value::Null,
        (ColumnKind::Real, ValueRef::Integer(i)) => Value::from(i as f64),
        (_, ValueRef::Integer(i)) => Value::from(i),
        (_, ValueRef::Real(f)) => Value::from(f),
        (_, ValueRef::Text(t)) => Value::from(String::from_utf8_lossy(t).to_string()),
        (_, ValueRef::Blob(_)) => Value::Null,
    }
}

fn read_row(s: &TableSchema, r: &rusqlite::Row<'_>) -> rusqlite::Result<Row> {
    let mut row = Row::new();
    row.insert("id".to_string(), Value::from(r.get::<_, String>(0)?));
    for (i, c) in s.columns.iter().enumerate() {
        row.insert(c.field.to_string(), from_sql(c.kind, r.get_ref(i + 1)?));
    }
    Ok(row)
}

fn load_by_id(conn: &Connection, s: &TableSchema, id: &str) -> Result<Option<Row>, StoreError> {
    let sql = format!(
        "SELECT {} FROM {} WHERE id = ?",
        select_list(s),
        s.sql_name
    );
    Ok(conn
        .query_row(&sql, [id], |r| read_row(s, r))
        .optional()?)
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(f, _) if f.code == ErrorCode::ConstraintViolation
            && (f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
    )
}

/// Validates and orders `fields` against the schema. `full` requires every
/// non-nullable column to be present.
fn bind_fields(
    s: &TableSchema,
    fields: &Fields,
    full: bool,
) -> Result<Vec<(&'static Column, SqlValue)>, Vec<String>> {
    let mut errors = Vec::new();
    for key in fields.keys() {
        if key != "id" && s.column(key).is_none() {
            errors.push(format!("unknown field {}", key));
        }
    }
    let mut bound = Vec::new();
    for c in s.columns {
        match fields.get(c.field) {
            Some(v) => match to_sql(c, v) {
                Ok(sv) => bound.push((c, sv)),
                Err(e) => errors.push(e),
            },
            None if full && !c.nullable => errors.push(format!("{} is required", c.field)),
            None if full => bound.push((c, SqlValue::Null)),
            None => {}
        }
    }
    if errors.is_empty() {
        Ok(bound)
    } else {
        Err(errors)
    }
}

fn rejected(errors: Vec<String>) -> RecordResult {
    RecordResult {
        message: errors.first().cloned(),
        errors,
        ..RecordResult::failed("")
    }
}

impl RecordStore for SqliteStore {
    fn fetch_records(&self, table: Table, query: &Query) -> Result<Vec<Row>, StoreError> {
        let s = schema(table);
        let mut sql = format!("SELECT {} FROM {}", select_list(&s), s.sql_name);
        let mut params = Vec::with_capacity(query.filters.len());
        let mut clauses = Vec::with_capacity(query.filters.len());
        for f in &query.filters {
            let column = column_for(&s, &f.field)?;
            if f.value.is_null() {
                clauses.push(format!("{} IS NULL", column));
            } else {
                clauses.push(format!("{} = ?", column));
                params.push(filter_value(&s, &f.field, &f.value)?);
            }
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        let mut order = Vec::with_capacity(query.order_by.len() + 1);
        for o in &query.order_by {
            let column = column_for(&s, &o.field)?;
            order.push(format!("{} {}", column, if o.descending { "DESC" } else { "ASC" }));
        }
        order.push("rowid ASC".to_string());
        sql.push_str(" ORDER BY ");
        sql.push_str(&order.join(", "));

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(params), |r| read_row(&s, r))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn get_record_by_id(&self, table: Table, id: &str) -> Result<Row, StoreError> {
        let s = schema(table);
        let conn = self.lock()?;
        load_by_id(&conn, &s, id)?.ok_or_else(|| StoreError::NotFound {
            table,
            id: id.to_string(),
        })
    }

    fn create_records(&self, table: Table, records: Vec<Fields>) -> Result<BatchResult, StoreError> {
        let s = schema(table);
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;
        let mut results = Vec::with_capacity(records.len());
        for fields in records {
            let bound = match bind_fields(&s, &fields, true) {
                Ok(b) => b,
                Err(errors) => {
                    results.push(rejected(errors));
                    continue;
                }
            };
            let id = Uuid::new_v4().to_string();
            let mut columns = vec!["id"];
            let mut values = vec![SqlValue::Text(id.clone())];
            for (c, v) in bound {
                columns.push(c.column);
                values.push(v);
            }
            let sql = format!(
                "INSERT INTO {}({}, updated_at) VALUES({}, strftime('%Y-%m-%dT%H:%M:%SZ','now'))",
                s.sql_name,
                columns.join(", "),
                vec!["?"; columns.len()].join(", ")
            );
            match tx.execute(&sql, params_from_iter(values)) {
                Ok(_) => match load_by_id(&tx, &s, &id)? {
                    Some(row) => results.push(RecordResult::ok(row)),
                    None => results.push(RecordResult::failed("inserted row vanished")),
                },
                Err(e) if is_unique_violation(&e) => results.push(RecordResult::duplicate(
                    format!("duplicate {} record", table.label()),
                )),
                Err(e) => results.push(RecordResult::failed(e.to_string())),
            }
        }
        tx.commit()?;
        Ok(BatchResult { results })
    }

    fn update_records(
        &self,
        table: Table,
        records: Vec<(String, Fields)>,
    ) -> Result<BatchResult, StoreError> {
        let s = schema(table);
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;
        let mut results = Vec::with_capacity(records.len());
        for (id, fields) in records {
            let bound = match bind_fields(&s, &fields, false) {
                Ok(b) => b,
                Err(errors) => {
                    results.push(rejected(errors));
                    continue;
                }
            };
            let mut sets: Vec<String> = bound
                .iter()
                .map(|(c, _)| format!("{} = ?", c.column))
                .collect();
            sets.push("updated_at = strftime('%Y-%m-%dT%H:%M:%SZ','now')".to_string());
            let mut values: Vec<SqlValue> = bound.into_iter().map(|(_, v)| v).collect();
            values.push(SqlValue::Text(id.clone()));
            let sql = format!(
                "UPDATE {} SET {} WHERE id = ?",
                s.sql_name,
                sets.join(", ")
            );
            match tx.execute(&sql, params_from_iter(values)) {
                Ok(0) => results.push(RecordResult::failed(format!(
                    "{} record not found: {}",
                    table.label(),
                    id
                ))),
                Ok(_) => match load_by_id(&tx, &s, &id)? {
                    Some(row) => results.push(RecordResult::ok(row)),
                    None => results.push(RecordResult::failed("updated row vanished")),
                },
                Err(e) if is_unique_violation(&e) => results.push(RecordResult::duplicate(
                    format!("duplicate {} record", table.label()),
                )),
                Err(e) => results.push(RecordResult::failed(e.to_string())),
            }
        }
        tx.commit()?;
        Ok(BatchResult { results })
    }

    fn delete_records(&self, table: Table, ids: &[String]) -> Result<BatchResult, StoreError> {
        let s = schema(table);
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;
        let sql = format!("DELETE FROM {} WHERE id = ?", s.sql_name);
        let mut results = Vec::with_capacity(ids.len());
        for id in ids {
            match tx.execute(&sql, [id]) {
                Ok(0) => results.push(RecordResult::failed(format!(
                    "{} record not found: {}",
                    table.label(),
                    id
                ))),
                Ok(_) => results.push(RecordResult::deleted()),
                Err(e) => results.push(RecordResult::failed(e.to_string())),
            }
        }
        tx.commit()?;
        Ok(BatchResult { results })
    }

    fn supports_atomic_upsert(&self) -> bool {
        true
    }

    fn upsert_record(
        &self,
        table: Table,
        natural_key: &[&str],
        fields: Fields,
    ) -> Result<(Row, UpsertOutcome), StoreError> {
        let s = schema(table);
        let bound = bind_fields(&s, &fields, true).map_err(|errors| {
            StoreError::remote(errors.first().cloned().unwrap_or_default())
        })?;
        let key_columns = natural_key
            .iter()
            .map(|f| column_for(&s, f))
            .collect::<Result<Vec<_>, _>>()?;
        let key_values = natural_key
            .iter()
            .map(|f| filter_value(&s, f, fields.get(*f).unwrap_or(&Value::Null)))
            .collect::<Result<Vec<_>, _>>()?;
        let key_where = key_columns
            .iter()
            .map(|c| format!("{} = ?", c))
            .collect::<Vec<_>>()
            .join(" AND ");

        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let existing: Option<String> = tx
            .query_row(
                &format!("SELECT id FROM {} WHERE {}", s.sql_name, key_where),
                params_from_iter(key_values.iter()),
                |r| r.get(0),
            )
            .optional()?;

        let mut columns = vec!["id"];
        let mut values = vec![SqlValue::Text(Uuid::new_v4().to_string())];
        let mut updates = Vec::new();
        for (c, v) in bound {
            columns.push(c.column);
            values.push(v);
            if !key_columns.contains(&c.column) {
                updates.push(format!("{0} = excluded.{0}", c.column));
            }
        }
        updates.push("updated_at = excluded.updated_at".to_string());
        let sql = format!(
            "INSERT INTO {}({}, updated_at) VALUES({}, strftime('%Y-%m-%dT%H:%M:%SZ','now'))
             ON CONFLICT({}) DO UPDATE SET {}",
            s.sql_name,
            columns.join(", "),
            vec!["?"; columns.len()].join(", "),
            key_columns.join(", "),
            updates.join(", ")
        );
        tx.execute(&sql, params_from_iter(values))?;

        let row = tx.query_row(
            &format!(
                "SELECT {} FROM {} WHERE {}",
                select_list(&s),
                s.sql_name,
                key_where
            ),
            params_from_iter(key_values.iter()),
            |r| read_row(&s, r),
        )?;
        tx.commit()?;

        let outcome = if existing.is_some() {
            UpsertOutcome::Updated
        } else {
            UpsertOutcome::Created
        };
        Ok((row, outcome))
    }
}
