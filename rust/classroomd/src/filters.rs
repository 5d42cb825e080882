use serde::{Deserialize, Deserializer};

use crate::model::{CurriculumActivity, Student, StudentStatus};

fn contains_ci(haystack: &str, needle_lower: &str) -> bool {
    haystack.to_lowercase().contains(needle_lower)
}

fn normalized_query(q: &Option<String>) -> Option<String> {
    q.as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

/// Blank and `"all"` mean no status filter. Anything else must name a status.
fn status_filter<'de, D>(deserializer: D) -> Result<Option<StudentStatus>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(t) if t.eq_ignore_ascii_case("all") => Ok(None),
        Some(t) => StudentStatus::parse(t)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown student status: {}", t))),
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StudentFilter {
    pub query: Option<String>,
    #[serde(deserialize_with = "status_filter")]
    pub status: Option<StudentStatus>,
    pub class_id: Option<String>,
}

impl StudentFilter {
    pub fn matches(&self, s: &Student) -> bool {
        if let Some(q) = normalized_query(&self.query) {
            let hit = contains_ci(&s.first_name, &q)
                || contains_ci(&s.last_name, &q)
                || contains_ci(&s.email, &q);
            if !hit {
                return false;
            }
        }
        if let Some(status) = self.status {
            if s.status != status {
                return false;
            }
        }
        if let Some(class_id) = self.class_id.as_deref().filter(|c| !c.is_empty()) {
            if s.class_id.as_deref() != Some(class_id) {
                return false;
            }
        }
        true
    }

    pub fn apply(&self, students: Vec<Student>) -> Vec<Student> {
        students.into_iter().filter(|s| self.matches(s)).collect()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ActivityFilter {
    pub query: Option<String>,
}

impl ActivityFilter {
    pub fn matches(&self, a: &CurriculumActivity) -> bool {
        match normalized_query(&self.query) {
            Some(q) => {
                contains_ci(&a.name, &q)
                    || contains_ci(&a.internal_name, &q)
                    || contains_ci(&a.description, &q)
                    || contains_ci(&a.tags, &q)
            }
            None => true,
        }
    }

    pub fn apply(&self, activities: Vec<CurriculumActivity>) -> Vec<CurriculumActivity> {
        activities.into_iter().filter(|a| self.matches(a)).collect()
    }
}
