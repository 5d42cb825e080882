use serde_json::{json, Value};

use crate::filters::ActivityFilter;
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{get_patch, get_required_str, parse_params, require_store, respond};
use crate::ipc::types::{AppState, Request};
use crate::model::{merge_patch, ActivityDraft, CurriculumActivity};
use crate::repo::Repository;
use crate::store::Query;
use crate::validate;

fn activities_list(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let store = require_store(state)?;
    let filter: ActivityFilter = parse_params(params)?;
    let all = Repository::<CurriculumActivity>::new(store)
        .list(&Query::all().order_by("name", false))?;
    Ok(json!({ "activities": filter.apply(all) }))
}

fn activities_get(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let store = require_store(state)?;
    let id = get_required_str(params, "id")?;
    let activity = Repository::<CurriculumActivity>::new(store).get(&id)?;
    Ok(json!({ "activity": activity }))
}

fn activities_create(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let store = require_store(state)?;
    let draft: ActivityDraft = parse_params(params)?;
    let activity =
        Repository::<CurriculumActivity>::new(store).create(validate::activity(&draft)?)?;
    Ok(json!({ "activity": activity }))
}

fn activities_update(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let store = require_store(state)?;
    let id = get_required_str(params, "id")?;
    let patch = get_patch(params)?;
    let repo = Repository::<CurriculumActivity>::new(store);
    let existing = repo.get(&id)?;
    let merged = merge_patch(&ActivityDraft::from(&existing), patch)
        .map_err(|e| HandlerErr::bad_params(e.to_string()))?;
    let activity = repo.update(&id, validate::activity(&merged)?)?;
    Ok(json!({ "activity": activity }))
}

fn activities_delete(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let store = require_store(state)?;
    let id = get_required_str(params, "id")?;
    Repository::<CurriculumActivity>::new(store).delete(&id)?;
    Ok(json!({ "deleted": true, "id": id }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "activities.list" => activities_list(state, &req.params),
        "activities.get" => activities_get(state, &req.params),
        "activities.create" => activities_create(state, &req.params),
        "activities.update" => activities_update(state, &req.params),
        "activities.delete" => activities_delete(state, &req.params),
        _ => return None,
    };
    Some(respond(req, result))
}
