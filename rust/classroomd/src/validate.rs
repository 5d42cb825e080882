//! Field-level checks run before any write. Each function collects every
//! failing field and returns normalized store fields on success.

use chrono::NaiveDate;
use serde_json::{json, Value};

use crate::grades;
use crate::model::{
    ActivityDraft, AttendanceDraft, AttendanceStatus, ClassDraft, GradeDraft, StudentDraft,
    StudentStatus,
};
use crate::store::{FieldError, Fields, StoreError};

#[derive(Default)]
struct Checker {
    errors: Vec<FieldError>,
    fields: Fields,
}

impl Checker {
    fn fail(&mut self, field: &str, message: &str) {
        self.errors.push(FieldError {
            field: field.to_string(),
            message: message.to_string(),
        });
    }

    fn required(&mut self, field: &str, raw: &str, message: &str) -> Option<String> {
        let t = raw.trim();
        if t.is_empty() {
            self.fail(field, message);
            return None;
        }
        self.fields.insert(field.to_string(), Value::from(t));
        Some(t.to_string())
    }

    fn text(&mut self, field: &str, raw: &str) {
        self.fields.insert(field.to_string(), Value::from(raw.trim()));
    }

    fn date(&mut self, field: &str, raw: &str, required_msg: &str) -> Option<NaiveDate> {
        let t = raw.trim();
        if t.is_empty() {
            self.fail(field, required_msg);
            return None;
        }
        self.parsed_date(field, t)
    }

    fn optional_date(&mut self, field: &str, raw: Option<&str>) -> Option<NaiveDate> {
        match raw.map(str::trim).filter(|t| !t.is_empty()) {
            Some(t) => self.parsed_date(field, t),
            None => {
                self.fields.insert(field.to_string(), Value::Null);
                None
            }
        }
    }

    fn parsed_date(&mut self, field: &str, t: &str) -> Option<NaiveDate> {
        match parse_date(t) {
            Some(d) => {
                self.fields.insert(field.to_string(), Value::from(d.to_string()));
                Some(d)
            }
            None => {
                self.fail(field, "Date must be YYYY-MM-DD");
                None
            }
        }
    }

    fn optional_ref(&mut self, field: &str, raw: &Option<String>) {
        let v = raw
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(Value::from)
            .unwrap_or(Value::Null);
        self.fields.insert(field.to_string(), v);
    }

    fn finish(self) -> Result<Fields, StoreError> {
        if self.errors.is_empty() {
            Ok(self.fields)
        } else {
            Err(StoreError::Validation(self.errors))
        }
    }
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}

/// Loose `local@domain.tld` shape check.
pub fn looks_like_email(raw: &str) -> bool {
    let t = raw.trim();
    if t.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = t.split_once('@') else {
        return false;
    };
    if local.is_empty() {
        return false;
    }
    match domain.rfind('.') {
        Some(dot) => dot > 0 && dot + 1 < domain.len(),
        None => false,
    }
}

pub fn student(d: &StudentDraft) -> Result<Fields, StoreError> {
    let mut c = Checker::default();
    c.required("firstName", &d.first_name, "First name is required");
    c.required("lastName", &d.last_name, "Last name is required");
    if d.email.trim().is_empty() {
        c.fail("email", "Email is required");
    } else if !looks_like_email(&d.email) {
        c.fail("email", "Email is invalid");
    } else {
        c.text("email", &d.email);
    }
    c.required("phone", &d.phone, "Phone is required");
    c.date("dateOfBirth", &d.date_of_birth, "Date of birth is required");
    c.date("enrollmentDate", &d.enrollment_date, "Enrollment date is required");
    let status = if d.status.trim().is_empty() {
        Some(StudentStatus::Active)
    } else {
        StudentStatus::parse(&d.status)
    };
    match status {
        Some(s) => {
            c.fields.insert("status".into(), Value::from(s.as_str()));
        }
        None => c.fail("status", "Status must be active, inactive or graduated"),
    }
    c.required("guardianName", &d.guardian_name, "Guardian name is required");
    c.required(
        "guardianContact",
        &d.guardian_contact,
        "Guardian contact is required",
    );
    c.optional_ref("classId", &d.class_id);
    c.finish()
}

pub fn class(d: &ClassDraft) -> Result<Fields, StoreError> {
    let mut c = Checker::default();
    c.required("name", &d.name, "Class name is required");
    match d.year {
        None => c.fail("year", "Year is required"),
        Some(y) if y < 1 => c.fail("year", "Year must be a positive number"),
        Some(y) => {
            c.fields.insert("year".into(), json!(y));
        }
    }
    c.required("section", &d.section, "Section is required");
    match d.capacity {
        Some(cap) if cap < 1 => c.fail("capacity", "Capacity must be a positive number"),
        cap => {
            c.fields.insert("capacity".into(), json!(cap));
        }
    }
    c.optional_ref("teacherId", &d.teacher_id);
    c.finish()
}

pub fn activity(d: &ActivityDraft) -> Result<Fields, StoreError> {
    let mut c = Checker::default();
    c.required("name", &d.name, "Activity name is required");
    c.text("internalName", &d.internal_name);
    c.required("description", &d.description, "Description is required");
    let start = c.optional_date("startDate", d.start_date.as_deref());
    let end = c.optional_date("endDate", d.end_date.as_deref());
    if let (Some(s), Some(e)) = (start, end) {
        if s > e {
            c.fail("endDate", "End date must be after start date");
        }
    }
    c.text("tags", &d.tags);
    c.finish()
}

/// Also derives `letterGrade`; a client-supplied letter is never trusted.
pub fn grade(d: &GradeDraft) -> Result<Fields, StoreError> {
    let mut c = Checker::default();
    c.required("studentId", &d.student_id, "Student is required");
    c.required("subject", &d.subject, "Subject is required");
    c.required("term", &d.term, "Term is required");
    let score = match d.score {
        None => {
            c.fail("score", "Score is required");
            None
        }
        Some(s) if !s.is_finite() => {
            c.fail("score", "Score must be a number");
            None
        }
        Some(s) => Some(s),
    };
    let max = match d.max_score {
        None => {
            c.fail("maxScore", "Max score is required");
            None
        }
        Some(m) if !m.is_finite() || m <= 0.0 => {
            c.fail("maxScore", "Max score must be greater than zero");
            None
        }
        Some(m) => Some(m),
    };
    c.date("date", &d.date, "Date is required");
    if let (Some(score), Some(max)) = (score, max) {
        c.fields.insert("score".into(), json!(score));
        c.fields.insert("maxScore".into(), json!(max));
        match grades::letter_grade(score, max) {
            Ok(letter) => {
                c.fields
                    .insert("letterGrade".into(), Value::from(letter.as_str()));
            }
            Err(e) => c.fail("maxScore", &e.to_string()),
        }
    }
    c.finish()
}

pub fn attendance(d: &AttendanceDraft) -> Result<Fields, StoreError> {
    let mut c = Checker::default();
    c.required("studentId", &d.student_id, "Student is required");
    c.date("date", &d.date, "Date is required");
    match AttendanceStatus::parse(&d.status) {
        Some(s) => {
            c.fields.insert("status".into(), Value::from(s.as_str()));
        }
        None => c.fail("status", "Status must be present, late, absent or excused"),
    }
    c.text("notes", &d.notes);
    c.finish()
}
