use serde_json::{json, Value};

use crate::grades::{letter_grade, percentage};
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{
    get_optional_str, get_patch, get_required_f64, get_required_str, parse_params,
    require_store, respond,
};
use crate::ipc::types::{AppState, Request};
use crate::metrics::grade_average;
use crate::model::{merge_patch, GradeDraft, GradeRecord};
use crate::repo::Repository;
use crate::store::Query;
use crate::validate;

fn grades_list(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let store = require_store(state)?;
    let mut q = Query::all();
    for key in ["studentId", "subject", "term"] {
        if let Some(v) = get_optional_str(params, key) {
            q = q.where_eq(key, v);
        }
    }
    let grades = Repository::<GradeRecord>::new(store).list(&q.order_by("date", true))?;
    Ok(json!({ "grades": grades, "average": grade_average(&grades) }))
}

fn grades_create(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let store = require_store(state)?;
    let draft: GradeDraft = parse_params(params)?;
    let grade = Repository::<GradeRecord>::new(store).create(validate::grade(&draft)?)?;
    tracing::info!(grade_id = %grade.id, letter = %grade.letter_grade, "grade recorded");
    Ok(json!({ "grade": grade }))
}

/// The letter is re-derived from the merged score and max score.
fn grades_update(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let store = require_store(state)?;
    let id = get_required_str(params, "id")?;
    let patch = get_patch(params)?;
    let repo = Repository::<GradeRecord>::new(store);
    let existing = repo.get(&id)?;
    let merged = merge_patch(&GradeDraft::from(&existing), patch)
        .map_err(|e| HandlerErr::bad_params(e.to_string()))?;
    let grade = repo.update(&id, validate::grade(&merged)?)?;
    Ok(json!({ "grade": grade }))
}

fn grades_delete(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let store = require_store(state)?;
    let id = get_required_str(params, "id")?;
    Repository::<GradeRecord>::new(store).delete(&id)?;
    Ok(json!({ "deleted": true, "id": id }))
}

/// Pure computation; needs no workspace.
fn grades_letter(params: &Value) -> Result<Value, HandlerErr> {
    let score = get_required_f64(params, "score")?;
    let max_score = get_required_f64(params, "maxScore")?;
    let letter = letter_grade(score, max_score)?;
    Ok(json!({
        "letterGrade": letter,
        "percentage": percentage(score, max_score)?,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "grades.list" => grades_list(state, &req.params),
        "grades.create" => grades_create(state, &req.params),
        "grades.update" => grades_update(state, &req.params),
        "grades.delete" => grades_delete(state, &req.params),
        "grades.letter" => grades_letter(&req.params),
        _ => return None,
    };
    Some(respond(req, result))
}
