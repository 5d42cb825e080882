use serde_json::{json, Value};

use crate::attendance::{list_attendance, MarkRequest};
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{
    get_optional_date, get_optional_str, get_patch, get_required_str, parse_params,
    require_store, respond,
};
use crate::ipc::types::{AppState, Request};
use crate::metrics::day_summary;
use crate::model::{merge_patch, AttendanceDraft, AttendanceRecord};
use crate::repo::Repository;
use crate::validate;

fn attendance_list(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let store = require_store(state)?;
    let date = get_optional_date(params, "date")?;
    let student_id = get_optional_str(params, "studentId");
    let records = list_attendance(store, date, student_id.as_deref())?;
    Ok(json!({ "records": records }))
}

fn attendance_mark(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let store = require_store(state)?;
    let draft: AttendanceDraft = parse_params(params)?;
    let mark = MarkRequest::from_draft(&draft)?;
    let marked = state.attendance.mark_attendance(store, &mark)?;
    Ok(json!({ "record": marked.record, "outcome": marked.outcome }))
}

/// Edits one record by id. Moving it onto an existing (student, date) pair is
/// rejected by the store as a conflict.
fn attendance_update(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let store = require_store(state)?;
    let id = get_required_str(params, "id")?;
    let patch = get_patch(params)?;
    let repo = Repository::<AttendanceRecord>::new(store);
    let existing = repo.get(&id)?;
    let merged = merge_patch(&AttendanceDraft::from(&existing), patch)
        .map_err(|e| HandlerErr::bad_params(e.to_string()))?;
    let record = repo.update(&id, validate::attendance(&merged)?)?;
    Ok(json!({ "record": record }))
}

fn attendance_day_summary(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let store = require_store(state)?;
    let date = get_optional_date(params, "date")?
        .ok_or_else(|| HandlerErr::bad_params("missing date"))?;
    let records = list_attendance(store, Some(date), None)?;
    Ok(json!({ "summary": day_summary(&records, date) }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "attendance.list" => attendance_list(state, &req.params),
        "attendance.mark" => attendance_mark(state, &req.params),
        "attendance.update" => attendance_update(state, &req.params),
        "attendance.daySummary" => attendance_day_summary(state, &req.params),
        _ => return None,
    };
    Some(respond(req, result))
}
