//! Typed records and the draft shapes accepted on create/update.

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::store::Table;

pub trait Entity: Serialize + DeserializeOwned + Clone {
    const TABLE: Table;
}

macro_rules! string_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "lowercase")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }

            pub fn parse(raw: &str) -> Option<Self> {
                let t = raw.trim();
                Self::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str().eq_ignore_ascii_case(t))
            }
        }
    };
}

string_enum!(StudentStatus {
    Active => "active",
    Inactive => "inactive",
    Graduated => "graduated",
});

string_enum!(AttendanceStatus {
    Present => "present",
    Late => "late",
    Absent => "absent",
    Excused => "excused",
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub date_of_birth: NaiveDate,
    pub enrollment_date: NaiveDate,
    pub status: StudentStatus,
    pub guardian_name: String,
    pub guardian_contact: String,
    #[serde(default)]
    pub class_id: Option<String>,
}

impl Student {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Class {
    pub id: String,
    pub name: String,
    pub year: i64,
    pub section: String,
    #[serde(default)]
    pub capacity: Option<i64>,
    #[serde(default)]
    pub teacher_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub id: String,
    pub student_id: String,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeRecord {
    pub id: String,
    pub student_id: String,
    pub subject: String,
    pub term: String,
    pub score: f64,
    pub max_score: f64,
    pub letter_grade: String,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurriculumActivity {
    pub id: String,
    /// Display name.
    pub name: String,
    pub internal_name: String,
    pub description: String,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub tags: String,
}

impl Entity for Student {
    const TABLE: Table = Table::Students;
}

impl Entity for Class {
    const TABLE: Table = Table::Classes;
}

impl Entity for AttendanceRecord {
    const TABLE: Table = Table::Attendance;
}

impl Entity for GradeRecord {
    const TABLE: Table = Table::Grades;
}

impl Entity for CurriculumActivity {
    const TABLE: Table = Table::CurriculumActivities;
}

// Draft fields all default: a missing value must surface as a field error
// from `validate`, not as a decode error.

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StudentDraft {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub date_of_birth: String,
    pub enrollment_date: String,
    pub status: String,
    pub guardian_name: String,
    pub guardian_contact: String,
    pub class_id: Option<String>,
}

impl From<&Student> for StudentDraft {
    fn from(s: &Student) -> Self {
        Self {
            first_name: s.first_name.clone(),
            last_name: s.last_name.clone(),
            email: s.email.clone(),
            phone: s.phone.clone(),
            date_of_birth: s.date_of_birth.to_string(),
            enrollment_date: s.enrollment_date.to_string(),
            status: s.status.as_str().to_string(),
            guardian_name: s.guardian_name.clone(),
            guardian_contact: s.guardian_contact.clone(),
            class_id: s.class_id.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClassDraft {
    pub name: String,
    pub year: Option<i64>,
    pub section: String,
    pub capacity: Option<i64>,
    pub teacher_id: Option<String>,
}

impl From<&Class> for ClassDraft {
    fn from(c: &Class) -> Self {
        Self {
            name: c.name.clone(),
            year: Some(c.year),
            section: c.section.clone(),
            capacity: c.capacity,
            teacher_id: c.teacher_id.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AttendanceDraft {
    pub student_id: String,
    pub date: String,
    pub status: String,
    pub notes: String,
}

impl From<&AttendanceRecord> for AttendanceDraft {
    fn from(a: &AttendanceRecord) -> Self {
        Self {
            student_id: a.student_id.clone(),
            date: a.date.to_string(),
            status: a.status.as_str().to_string(),
            notes: a.notes.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GradeDraft {
    pub student_id: String,
    pub subject: String,
    pub term: String,
    pub score: Option<f64>,
    pub max_score: Option<f64>,
    pub date: String,
}

impl From<&GradeRecord> for GradeDraft {
    fn from(g: &GradeRecord) -> Self {
        Self {
            student_id: g.student_id.clone(),
            subject: g.subject.clone(),
            term: g.term.clone(),
            score: Some(g.score),
            max_score: Some(g.max_score),
            date: g.date.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ActivityDraft {
    pub name: String,
    pub internal_name: String,
    pub description: String,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub tags: String,
}

impl From<&CurriculumActivity> for ActivityDraft {
    fn from(a: &CurriculumActivity) -> Self {
        Self {
            name: a.name.clone(),
            internal_name: a.internal_name.clone(),
            description: a.description.clone(),
            start_date: a.start_date.map(|d| d.to_string()),
            end_date: a.end_date.map(|d| d.to_string()),
            tags: a.tags.clone(),
        }
    }
}

/// Overlays a JSON patch onto `base`. `id` keys in the patch are ignored.
pub fn merge_patch<D>(base: &D, patch: &Map<String, Value>) -> Result<D, serde_json::Error>
where
    D: Serialize + DeserializeOwned,
{
    let mut merged = serde_json::to_value(base)?;
    if let Value::Object(obj) = &mut merged {
        for (k, v) in patch {
            if k != "id" {
                obj.insert(k.clone(), v.clone());
            }
        }
    }
    serde_json::from_value(merged)
}
