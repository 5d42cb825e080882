use serde_json::{json, Value};

use crate::filters::StudentFilter;
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{get_patch, get_required_str, parse_params, require_store, respond};
use crate::ipc::types::{AppState, Request};
use crate::model::{merge_patch, Student, StudentDraft};
use crate::repo::Repository;
use crate::store::Query;
use crate::validate;

fn students_list(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let store = require_store(state)?;
    let filter: StudentFilter = parse_params(params)?;
    let all = Repository::<Student>::new(store).list(
        &Query::all()
            .order_by("lastName", false)
            .order_by("firstName", false),
    )?;
    let total = all.len();
    let students = filter.apply(all);
    Ok(json!({ "students": students, "total": total }))
}

fn students_get(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let store = require_store(state)?;
    let id = get_required_str(params, "id")?;
    let student = Repository::<Student>::new(store).get(&id)?;
    Ok(json!({ "student": student }))
}

fn students_create(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let store = require_store(state)?;
    let draft: StudentDraft = parse_params(params)?;
    let fields = validate::student(&draft)?;
    let student = Repository::<Student>::new(store).create(fields)?;
    tracing::info!(student_id = %student.id, "student created");
    Ok(json!({ "student": student }))
}

fn students_update(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let store = require_store(state)?;
    let id = get_required_str(params, "id")?;
    let patch = get_patch(params)?;
    let repo = Repository::<Student>::new(store);
    let existing = repo.get(&id)?;
    let merged = merge_patch(&StudentDraft::from(&existing), patch)
        .map_err(|e| HandlerErr::bad_params(e.to_string()))?;
    let student = repo.update(&id, validate::student(&merged)?)?;
    Ok(json!({ "student": student }))
}

fn students_delete(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let store = require_store(state)?;
    let id = get_required_str(params, "id")?;
    Repository::<Student>::new(store).delete(&id)?;
    tracing::info!(student_id = %id, "student deleted");
    Ok(json!({ "deleted": true, "id": id }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "students.list" => students_list(state, &req.params),
        "students.get" => students_get(state, &req.params),
        "students.create" => students_create(state, &req.params),
        "students.update" => students_update(state, &req.params),
        "students.delete" => students_delete(state, &req.params),
        _ => return None,
    };
    Some(respond(req, result))
}
