//! Mark-or-update of the daily attendance status for a (student, date) pair.
//!
//! `mark_attendance_naive` is the plain read-then-write: look up the day's
//! records, update the student's row if one exists, create it otherwise. Two
//! overlapping calls for the same pair can both see "absent" and both create.
//! `AttendanceCoordinator` closes that gap, either with the store's atomic
//! upsert or by serializing the read-modify-write per key.

use std::collections::HashSet;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;

use crate::model::{AttendanceDraft, AttendanceRecord, AttendanceStatus};
use crate::repo::Repository;
use crate::store::schema::ATTENDANCE_NATURAL_KEY;
use crate::store::{Fields, Query, RecordStore, StoreError, UpsertOutcome};
use crate::validate;

#[derive(Debug, Clone, PartialEq)]
pub struct MarkRequest {
    pub student_id: String,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    pub notes: String,
}

impl MarkRequest {
    pub fn new(student_id: &str, date: NaiveDate, status: AttendanceStatus, notes: &str) -> Self {
        Self {
            student_id: student_id.to_string(),
            date,
            status,
            notes: notes.to_string(),
        }
    }

    pub fn from_draft(d: &AttendanceDraft) -> Result<Self, StoreError> {
        validate::attendance(d)?;
        let date = validate::parse_date(&d.date)
            .ok_or_else(|| StoreError::field("date", "Date must be YYYY-MM-DD"))?;
        let status = AttendanceStatus::parse(&d.status)
            .ok_or_else(|| StoreError::field("status", "Unknown attendance status"))?;
        Ok(Self::new(d.student_id.trim(), date, status, d.notes.trim()))
    }

    fn key(&self) -> String {
        format!("{}|{}", self.student_id, self.date)
    }

    fn full_fields(&self) -> Fields {
        let mut f = self.status_fields();
        f.insert("studentId".into(), Value::from(self.student_id.as_str()));
        f.insert("date".into(), Value::from(self.date.to_string()));
        f
    }

    /// The fields an update may overwrite; student and date stay fixed.
    fn status_fields(&self) -> Fields {
        let mut f = Fields::new();
        f.insert("status".into(), Value::from(self.status.as_str()));
        f.insert("notes".into(), Value::from(self.notes.as_str()));
        f
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MarkPlan {
    Update { id: String },
    Create,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Marked {
    pub record: AttendanceRecord,
    pub outcome: UpsertOutcome,
}

/// Lookup phase: fetch the day's records, then pick this student's in memory.
pub fn plan_mark(store: &dyn RecordStore, req: &MarkRequest) -> Result<MarkPlan, StoreError> {
    let same_day = Repository::<AttendanceRecord>::new(store)
        .list(&Query::all().where_eq("date", req.date.to_string()))?;
    Ok(same_day
        .into_iter()
        .find(|r| r.student_id == req.student_id)
        .map(|r| MarkPlan::Update { id: r.id })
        .unwrap_or(MarkPlan::Create))
}

/// Write phase for a plan produced by [`plan_mark`].
pub fn apply_plan(
    store: &dyn RecordStore,
    req: &MarkRequest,
    plan: MarkPlan,
) -> Result<Marked, StoreError> {
    let repo = Repository::<AttendanceRecord>::new(store);
    match plan {
        MarkPlan::Update { id } => Ok(Marked {
            record: repo.update(&id, req.status_fields())?,
            outcome: UpsertOutcome::Updated,
        }),
        MarkPlan::Create => Ok(Marked {
            record: repo.create(req.full_fields())?,
            outcome: UpsertOutcome::Created,
        }),
    }
}

/// Unserialized read-then-write. Overlapping calls for one key can both create.
#[allow(dead_code)]
pub fn mark_attendance_naive(
    store: &dyn RecordStore,
    req: &MarkRequest,
) -> Result<Marked, StoreError> {
    let plan = plan_mark(store, req)?;
    apply_plan(store, req, plan)
}

/// A duplicate-key rejection on create means another writer got there first;
/// take the update path against its row.
fn apply_or_update(
    store: &dyn RecordStore,
    req: &MarkRequest,
    plan: MarkPlan,
) -> Result<Marked, StoreError> {
    match apply_plan(store, req, plan) {
        Err(StoreError::Conflict { table, key }) => match plan_mark(store, req)? {
            update @ MarkPlan::Update { .. } => {
                tracing::debug!(student_id = %req.student_id, date = %req.date, "create conflicted, updating instead");
                apply_plan(store, req, update)
            }
            MarkPlan::Create => Err(StoreError::Conflict { table, key }),
        },
        other => other,
    }
}

/// Set of keys currently being written. Waiters block on a condvar until the
/// key is released or `wait` elapses.
pub struct KeyLocks {
    held: Mutex<HashSet<String>>,
    released: Condvar,
    wait: Duration,
}

pub struct KeyGuard<'a> {
    locks: &'a KeyLocks,
    key: String,
}

impl KeyLocks {
    pub fn new(wait: Duration) -> Self {
        Self {
            held: Mutex::new(HashSet::new()),
            released: Condvar::new(),
            wait,
        }
    }

    pub fn acquire(&self, key: &str) -> Result<KeyGuard<'_>, StoreError> {
        let deadline = Instant::now() + self.wait;
        let mut held = self
            .held
            .lock()
            .map_err(|_| StoreError::remote("attendance key locks are poisoned"))?;
        while held.contains(key) {
            let now = Instant::now();
            if now >= deadline {
                return Err(StoreError::Timeout {
                    what: format!("attendance key {}", key),
                    waited_ms: self.wait.as_millis() as u64,
                });
            }
            let (next, _) = self
                .released
                .wait_timeout(held, deadline - now)
                .map_err(|_| StoreError::remote("attendance key locks are poisoned"))?;
            held = next;
        }
        held.insert(key.to_string());
        Ok(KeyGuard {
            locks: self,
            key: key.to_string(),
        })
    }
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut held) = self.locks.held.lock() {
            held.remove(&self.key);
        }
        self.locks.released.notify_all();
    }
}

pub struct AttendanceCoordinator {
    locks: KeyLocks,
}

impl AttendanceCoordinator {
    pub fn new(lock_wait: Duration) -> Self {
        Self {
            locks: KeyLocks::new(lock_wait),
        }
    }

    pub fn mark_attendance(
        &self,
        store: &dyn RecordStore,
        req: &MarkRequest,
    ) -> Result<Marked, StoreError> {
        if store.supports_atomic_upsert() {
            let (row, outcome) = store.upsert_record(
                crate::store::Table::Attendance,
                ATTENDANCE_NATURAL_KEY,
                req.full_fields(),
            )?;
            let record: AttendanceRecord = serde_json::from_value(Value::Object(row))
                .map_err(|e| StoreError::remote(format!("malformed attendance record: {}", e)))?;
            tracing::debug!(student_id = %req.student_id, date = %req.date, ?outcome, "attendance upserted");
            return Ok(Marked { record, outcome });
        }

        let _guard = self.locks.acquire(&req.key())?;
        let plan = plan_mark(store, req)?;
        tracing::debug!(student_id = %req.student_id, date = %req.date, ?plan, "attendance marked under key lock");
        apply_or_update(store, req, plan)
    }
}

pub fn list_attendance(
    store: &dyn RecordStore,
    date: Option<NaiveDate>,
    student_id: Option<&str>,
) -> Result<Vec<AttendanceRecord>, StoreError> {
    let mut q = Query::all();
    if let Some(d) = date {
        q = q.where_eq("date", d.to_string());
    }
    if let Some(s) = student_id {
        q = q.where_eq("studentId", s);
    }
    Repository::<AttendanceRecord>::new(store).list(&q.order_by("date", true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, SqliteStore};
    use std::sync::Barrier;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 10).expect("date")
    }

    fn req(status: AttendanceStatus) -> MarkRequest {
        MarkRequest::new("S", day(), status, "")
    }

    fn records(store: &dyn RecordStore) -> Vec<AttendanceRecord> {
        list_attendance(store, None, None).expect("list")
    }

    #[test]
    fn mark_twice_updates_the_same_record() {
        let store = MemoryStore::new();
        let first = mark_attendance_naive(&store, &req(AttendanceStatus::Present)).expect("mark");
        assert_eq!(first.outcome, UpsertOutcome::Created);
        assert_eq!(records(&store).len(), 1);

        let second = mark_attendance_naive(&store, &req(AttendanceStatus::Late)).expect("mark");
        assert_eq!(second.outcome, UpsertOutcome::Updated);
        assert_eq!(second.record.id, first.record.id);

        let all = records(&store);
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].status, AttendanceStatus::Late);
        assert_eq!(all[0].student_id, "S");
        assert_eq!(all[0].date, day());
    }

    #[test]
    fn other_students_on_the_same_day_are_left_alone() {
        let store = MemoryStore::new();
        mark_attendance_naive(&store, &MarkRequest::new("A", day(), AttendanceStatus::Absent, ""))
            .expect("mark");
        let marked = mark_attendance_naive(&store, &req(AttendanceStatus::Present)).expect("mark");
        assert_eq!(marked.outcome, UpsertOutcome::Created);
        let all = records(&store);
        assert_eq!(all.len(), 2);
        assert!(all
            .iter()
            .any(|r| r.student_id == "A" && r.status == AttendanceStatus::Absent));
    }

    #[test]
    fn naive_interleaving_creates_duplicates() {
        let store = MemoryStore::new();
        let a = req(AttendanceStatus::Present);
        let b = req(AttendanceStatus::Late);
        let plan_a = plan_mark(&store, &a).expect("plan");
        let plan_b = plan_mark(&store, &b).expect("plan");
        assert_eq!(plan_a, MarkPlan::Create);
        assert_eq!(plan_b, MarkPlan::Create);
        apply_plan(&store, &a, plan_a).expect("apply");
        apply_plan(&store, &b, plan_b).expect("apply");
        assert_eq!(records(&store).len(), 2);
    }

    #[test]
    fn coordinator_serializes_concurrent_marks() {
        let store = MemoryStore::new().with_latency(Duration::from_millis(5));
        let coordinator = AttendanceCoordinator::new(Duration::from_secs(10));
        let barrier = Barrier::new(8);
        let statuses = [
            AttendanceStatus::Present,
            AttendanceStatus::Late,
            AttendanceStatus::Absent,
            AttendanceStatus::Excused,
        ];
        std::thread::scope(|scope| {
            for i in 0..8 {
                let (store, coordinator, barrier) = (&store, &coordinator, &barrier);
                let status = statuses[i % statuses.len()];
                scope.spawn(move || {
                    barrier.wait();
                    coordinator
                        .mark_attendance(store, &req(status))
                        .expect("mark");
                });
            }
        });
        assert_eq!(records(&store).len(), 1);
    }

    #[test]
    fn conflict_on_create_takes_the_update_path() {
        let store = MemoryStore::new().with_unique_attendance();
        let ours = req(AttendanceStatus::Late);
        let stale = plan_mark(&store, &ours).expect("plan");
        assert_eq!(stale, MarkPlan::Create);
        mark_attendance_naive(&store, &req(AttendanceStatus::Present)).expect("other writer");

        let marked = apply_or_update(&store, &ours, stale).expect("mark");
        assert_eq!(marked.outcome, UpsertOutcome::Updated);
        let all = records(&store);
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].status, AttendanceStatus::Late);
    }

    #[test]
    fn sqlite_store_uses_atomic_upsert() {
        let store = SqliteStore::open_in_memory().expect("open");
        let coordinator = AttendanceCoordinator::new(Duration::from_secs(5));
        let first = coordinator
            .mark_attendance(&store, &req(AttendanceStatus::Present))
            .expect("mark");
        let second = coordinator
            .mark_attendance(&store, &MarkRequest::new("S", day(), AttendanceStatus::Late, "bus"))
            .expect("mark");
        assert_eq!(first.outcome, UpsertOutcome::Created);
        assert_eq!(second.outcome, UpsertOutcome::Updated);
        assert_eq!(second.record.id, first.record.id);
        assert_eq!(second.record.notes, "bus");

        std::thread::scope(|scope| {
            for _ in 0..4 {
                let (store, coordinator) = (&store, &coordinator);
                scope.spawn(move || {
                    coordinator
                        .mark_attendance(store, &req(AttendanceStatus::Excused))
                        .expect("mark");
                });
            }
        });
        let all = records(&store);
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].status, AttendanceStatus::Excused);
    }

    #[test]
    fn held_key_times_out() {
        let locks = KeyLocks::new(Duration::from_millis(20));
        let _held = locks.acquire("S|2024-01-10").expect("first");
        assert!(matches!(
            locks.acquire("S|2024-01-10"),
            Err(StoreError::Timeout { .. })
        ));
        assert!(locks.acquire("T|2024-01-10").is_ok());
    }

    #[test]
    fn key_is_released_on_drop() {
        let locks = KeyLocks::new(Duration::from_millis(20));
        drop(locks.acquire("k").expect("first"));
        assert!(locks.acquire("k").is_ok());
    }

    #[test]
    fn draft_is_validated() {
        let bad = AttendanceDraft {
            student_id: "S".into(),
            date: "10/01/2024".into(),
            status: "present".into(),
            notes: String::new(),
        };
        assert!(matches!(
            MarkRequest::from_draft(&bad),
            Err(StoreError::Validation(_))
        ));
        let ok = MarkRequest::from_draft(&AttendanceDraft {
            date: "2024-01-10".into(),
            ..bad
        })
        .expect("valid");
        assert_eq!(ok, req(AttendanceStatus::Present));
    }
}
