//! Read-only reductions over already-fetched records. Nothing here is cached;
//! callers recompute on every request.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate};
use serde::Serialize;

use crate::grades::{percentage, LetterGrade};
use crate::model::{AttendanceRecord, AttendanceStatus, Class, GradeRecord, Student, StudentStatus};

/// Days before `today` still counted as recent attendance. Records dated
/// after `today` are never recent.
pub const RECENT_ATTENDANCE_DAYS: i64 = 7;

/// Percent of records marked present; 0 for an empty set.
pub fn attendance_rate<'a, I>(records: I) -> f64
where
    I: IntoIterator<Item = &'a AttendanceRecord>,
{
    let mut total = 0usize;
    let mut present = 0usize;
    for r in records {
        total += 1;
        if r.status == AttendanceStatus::Present {
            present += 1;
        }
    }
    if total == 0 {
        0.0
    } else {
        present as f64 / total as f64 * 100.0
    }
}

/// Mean of per-record percentages; 0 for an empty set. Records with a
/// non-positive max score carry no percentage and are skipped.
pub fn grade_average<'a, I>(records: I) -> f64
where
    I: IntoIterator<Item = &'a GradeRecord>,
{
    let mut n = 0usize;
    let mut sum = 0.0;
    for g in records {
        if let Ok(p) = percentage(g.score, g.max_score) {
            n += 1;
            sum += p;
        }
    }
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

pub fn student_grade_average(grades: &[GradeRecord], student_id: &str) -> f64 {
    grade_average(grades.iter().filter(|g| g.student_id == student_id))
}

/// Count of grades per leading letter (A, B, C, D, F).
pub fn letter_distribution(grades: &[GradeRecord]) -> BTreeMap<char, usize> {
    let mut out: BTreeMap<char, usize> =
        ['A', 'B', 'C', 'D', 'F'].into_iter().map(|c| (c, 0)).collect();
    for g in grades {
        if let Ok(p) = percentage(g.score, g.max_score) {
            *out.entry(LetterGrade::from_percent(p).family()).or_default() += 1;
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrollment {
    pub class_id: String,
    pub active_students: usize,
    pub capacity: Option<i64>,
    pub enrollment_rate: Option<f64>,
}

pub fn class_enrollment(class: &Class, students: &[Student]) -> Enrollment {
    let active_students = students
        .iter()
        .filter(|s| s.status == StudentStatus::Active && s.class_id.as_deref() == Some(&class.id))
        .count();
    let enrollment_rate = class
        .capacity
        .filter(|c| *c > 0)
        .map(|c| active_students as f64 / c as f64 * 100.0);
    Enrollment {
        class_id: class.id.clone(),
        active_students,
        capacity: class.capacity,
        enrollment_rate,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DaySummary {
    pub date: Option<NaiveDate>,
    pub total: usize,
    pub present: usize,
    pub late: usize,
    pub absent: usize,
    pub excused: usize,
}

pub fn day_summary(records: &[AttendanceRecord], date: NaiveDate) -> DaySummary {
    let mut s = DaySummary {
        date: Some(date),
        ..Default::default()
    };
    for r in records.iter().filter(|r| r.date == date) {
        s.total += 1;
        match r.status {
            AttendanceStatus::Present => s.present += 1,
            AttendanceStatus::Late => s.late += 1,
            AttendanceStatus::Absent => s.absent += 1,
            AttendanceStatus::Excused => s.excused += 1,
        }
    }
    s
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub total_students: usize,
    pub active_students: usize,
    pub class_count: usize,
    pub activity_count: usize,
    pub recent_attendance_records: usize,
    pub attendance_rate: f64,
    pub average_grade: f64,
}

pub struct DashboardInput<'a> {
    pub students: &'a [Student],
    pub classes: &'a [Class],
    pub attendance: &'a [AttendanceRecord],
    pub grades: &'a [GradeRecord],
    pub activity_count: usize,
}

pub fn dashboard(input: &DashboardInput<'_>, today: NaiveDate) -> Dashboard {
    let window_start = today - Duration::days(RECENT_ATTENDANCE_DAYS);
    let recent: Vec<&AttendanceRecord> = input
        .attendance
        .iter()
        .filter(|r| r.date >= window_start && r.date <= today)
        .collect();
    Dashboard {
        total_students: input.students.len(),
        active_students: input
            .students
            .iter()
            .filter(|s| s.status == StudentStatus::Active)
            .count(),
        class_count: input.classes.len(),
        activity_count: input.activity_count,
        recent_attendance_records: recent.len(),
        attendance_rate: attendance_rate(recent.iter().copied()),
        average_grade: grade_average(input.grades),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentMetrics {
    pub student_id: String,
    pub attendance_records: usize,
    pub attendance_rate: f64,
    pub grade_count: usize,
    pub average_grade: f64,
    pub average_letter: Option<LetterGrade>,
}

pub fn student_metrics(
    student_id: &str,
    attendance: &[AttendanceRecord],
    grades: &[GradeRecord],
) -> StudentMetrics {
    let mine: Vec<&AttendanceRecord> = attendance
        .iter()
        .filter(|r| r.student_id == student_id)
        .collect();
    let grade_count = grades.iter().filter(|g| g.student_id == student_id).count();
    let average_grade = student_grade_average(grades, student_id);
    StudentMetrics {
        student_id: student_id.to_string(),
        attendance_records: mine.len(),
        attendance_rate: attendance_rate(mine.iter().copied()),
        grade_count,
        average_grade,
        average_letter: if grade_count == 0 {
            None
        } else {
            Some(LetterGrade::from_percent(average_grade))
        },
    }
}
