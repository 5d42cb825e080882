//! Column layout of each table, shared by the SQLite backend and row decoding.

use super::Table;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Integer,
    Real,
}

#[derive(Debug, Clone, Copy)]
pub struct Column {
    /// Row/JSON field name.
    pub field: &'static str,
    /// SQL column name.
    pub column: &'static str,
    pub kind: ColumnKind,
    pub nullable: bool,
}

const fn col(field: &'static str, column: &'static str, kind: ColumnKind) -> Column {
    Column {
        field,
        column,
        kind,
        nullable: false,
    }
}

const fn opt(field: &'static str, column: &'static str, kind: ColumnKind) -> Column {
    Column {
        field,
        column,
        kind,
        nullable: true,
    }
}

use ColumnKind::{Integer, Real, Text};

const STUDENT_COLUMNS: &[Column] = &[
    col("firstName", "first_name", Text),
    col("lastName", "last_name", Text),
    col("email", "email", Text),
    col("phone", "phone", Text),
    col("dateOfBirth", "date_of_birth", Text),
    col("enrollmentDate", "enrollment_date", Text),
    col("status", "status", Text),
    col("guardianName", "guardian_name", Text),
    col("guardianContact", "guardian_contact", Text),
    opt("classId", "class_id", Text),
];

const CLASS_COLUMNS: &[Column] = &[
    col("name", "name", Text),
    col("year", "year", Integer),
    col("section", "section", Text),
    opt("capacity", "capacity", Integer),
    opt("teacherId", "teacher_id", Text),
];

const ATTENDANCE_COLUMNS: &[Column] = &[
    col("studentId", "student_id", Text),
    col("date", "date", Text),
    col("status", "status", Text),
    col("notes", "notes", Text),
];

const GRADE_COLUMNS: &[Column] = &[
    col("studentId", "student_id", Text),
    col("subject", "subject", Text),
    col("term", "term", Text),
    col("score", "score", Real),
    col("maxScore", "max_score", Real),
    col("letterGrade", "letter_grade", Text),
    col("date", "date", Text),
];

const ACTIVITY_COLUMNS: &[Column] = &[
    col("name", "name", Text),
    col("internalName", "internal_name", Text),
    col("description", "description", Text),
    opt("startDate", "start_date", Text),
    opt("endDate", "end_date", Text),
    col("tags", "tags", Text),
];

#[derive(Debug, Clone, Copy)]
pub struct TableSchema {
    pub sql_name: &'static str,
    pub columns: &'static [Column],
}

impl TableSchema {
    pub fn column(&self, field: &str) -> Option<&'static Column> {
        self.columns.iter().find(|c| c.field == field)
    }
}

pub fn schema(table: Table) -> TableSchema {
    match table {
        Table::Students => TableSchema {
            sql_name: "students",
            columns: STUDENT_COLUMNS,
        },
        Table::Classes => TableSchema {
            sql_name: "classes",
            columns: CLASS_COLUMNS,
        },
        Table::Attendance => TableSchema {
            sql_name: "attendance",
            columns: ATTENDANCE_COLUMNS,
        },
        Table::Grades => TableSchema {
            sql_name: "grades",
            columns: GRADE_COLUMNS,
        },
        Table::CurriculumActivities => TableSchema {
            sql_name: "curriculum_activities",
            columns: ACTIVITY_COLUMNS,
        },
    }
}

/// Fields that identify an attendance record independent of its id.
pub const ATTENDANCE_NATURAL_KEY: &[&str] = &["studentId", "date"];
