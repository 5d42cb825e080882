use serde_json::{json, Value};

use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{
    get_patch, get_required_str, parse_params, require_store, respond, to_json,
};
use crate::ipc::types::{AppState, Request};
use crate::metrics::class_enrollment;
use crate::model::{merge_patch, Class, ClassDraft, Student};
use crate::repo::Repository;
use crate::store::{Query, RecordStore};
use crate::validate;

fn with_enrollment(class: &Class, students: &[Student]) -> Result<Value, HandlerErr> {
    let mut v = to_json(class)?;
    let e = class_enrollment(class, students);
    v["activeStudents"] = json!(e.active_students);
    v["enrollmentRate"] = json!(e.enrollment_rate);
    Ok(v)
}

fn all_students(store: &dyn RecordStore) -> Result<Vec<Student>, HandlerErr> {
    Ok(Repository::<Student>::new(store).list(&Query::all())?)
}

fn classes_list(state: &AppState) -> Result<Value, HandlerErr> {
    let store = require_store(state)?;
    let classes = Repository::<Class>::new(store).list(
        &Query::all()
            .order_by("year", false)
            .order_by("section", false),
    )?;
    let students = all_students(store)?;
    let rows = classes
        .iter()
        .map(|c| with_enrollment(c, &students))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "classes": rows }))
}

fn classes_get(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let store = require_store(state)?;
    let id = get_required_str(params, "id")?;
    let class = Repository::<Class>::new(store).get(&id)?;
    Ok(json!({ "class": with_enrollment(&class, &all_students(store)?)? }))
}

fn classes_create(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let store = require_store(state)?;
    let draft: ClassDraft = parse_params(params)?;
    let class = Repository::<Class>::new(store).create(validate::class(&draft)?)?;
    tracing::info!(class_id = %class.id, "class created");
    Ok(json!({ "class": class }))
}

fn classes_update(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let store = require_store(state)?;
    let id = get_required_str(params, "id")?;
    let patch = get_patch(params)?;
    let repo = Repository::<Class>::new(store);
    let existing = repo.get(&id)?;
    let merged = merge_patch(&ClassDraft::from(&existing), patch)
        .map_err(|e| HandlerErr::bad_params(e.to_string()))?;
    let class = repo.update(&id, validate::class(&merged)?)?;
    Ok(json!({ "class": class }))
}

/// Students pointing at the class keep their `classId`.
fn classes_delete(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let store = require_store(state)?;
    let id = get_required_str(params, "id")?;
    Repository::<Class>::new(store).delete(&id)?;
    tracing::info!(class_id = %id, "class deleted");
    Ok(json!({ "deleted": true, "id": id }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "classes.list" => classes_list(state),
        "classes.get" => classes_get(state, &req.params),
        "classes.create" => classes_create(state, &req.params),
        "classes.update" => classes_update(state, &req.params),
        "classes.delete" => classes_delete(state, &req.params),
        _ => return None,
    };
    Some(respond(req, result))
}
