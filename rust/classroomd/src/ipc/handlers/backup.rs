use std::path::PathBuf;

use serde_json::{json, Value};

use crate::backup;
use crate::ipc::error::HandlerErr;
use crate::ipc::handlers::core::open_workspace;
use crate::ipc::helpers::{get_optional_str, get_required_str, respond};
use crate::ipc::types::{AppState, Request};

fn target_workspace(state: &AppState, params: &Value) -> Result<PathBuf, HandlerErr> {
    get_optional_str(params, "workspacePath")
        .map(PathBuf::from)
        .or_else(|| state.workspace.clone())
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

fn export_bundle(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let out_path = get_required_str(params, "outPath")?;
    let workspace_path = target_workspace(state, params)?;
    if let Some(store) = state.store.as_ref() {
        if let Err(e) = store.checkpoint() {
            tracing::warn!(error = %e, "wal checkpoint before export failed");
        }
    }
    let export = backup::export_workspace_bundle(&workspace_path, &PathBuf::from(&out_path))
        .map_err(|e| {
            HandlerErr::new("io_failed", format!("{:#}", e))
                .with_details(json!({ "path": out_path }))
        })?;
    tracing::info!(path = %out_path, sha256 = %export.db_sha256, "workspace bundle exported");
    Ok(json!({
        "path": out_path,
        "bundleFormat": export.bundle_format,
        "entryCount": export.entry_count,
        "dbSha256": export.db_sha256,
    }))
}

fn import_bundle(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let in_path = get_required_str(params, "inPath")?;
    let workspace_path = target_workspace(state, params)?;
    let src = PathBuf::from(&in_path);
    if !src.is_file() {
        return Err(HandlerErr::new("not_found", "bundle file not found")
            .with_details(json!({ "path": in_path })));
    }

    // The database file is replaced underneath; drop the open handle first.
    state.store = None;

    let import = match backup::import_workspace_bundle(&src, &workspace_path) {
        Ok(v) => v,
        Err(e) => {
            // The live database is untouched on failure; put the handle back.
            if let Some(previous) = state.workspace.clone() {
                if let Err(reopen) = open_workspace(state, &previous) {
                    tracing::error!(error = %format!("{:#}", reopen), "could not reopen workspace after failed import");
                }
            }
            return Err(HandlerErr::new("io_failed", format!("{:#}", e))
                .with_details(json!({ "path": in_path })));
        }
    };
    open_workspace(state, &workspace_path)
        .map_err(|e| HandlerErr::new("db_open_failed", format!("{:#}", e)))?;
    tracing::info!(path = %in_path, format = %import.bundle_format_detected, "workspace bundle imported");
    Ok(json!({
        "workspacePath": workspace_path.to_string_lossy(),
        "bundleFormatDetected": import.bundle_format_detected,
        "dbSha256": import.db_sha256,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "backup.exportWorkspaceBundle" => export_bundle(state, &req.params),
        "backup.importWorkspaceBundle" => import_bundle(state, &req.params),
        _ => return None,
    };
    Some(respond(req, result))
}
