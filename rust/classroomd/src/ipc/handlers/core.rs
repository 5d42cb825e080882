use std::path::{Path, PathBuf};

use anyhow::Context;
use serde_json::{json, Value};

use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{get_required_str, respond};
use crate::ipc::types::{AppState, Request};
use crate::store::SqliteStore;

fn handle_health(state: &mut AppState, req: &Request) -> Value {
    respond(
        req,
        Ok(json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string())
        })),
    )
}

/// Opens (creating if needed) the workspace database and makes it current.
pub fn open_workspace(state: &mut AppState, path: &Path) -> anyhow::Result<()> {
    // Release the previous handle before opening, the new path may be the same file.
    state.store = None;
    let store = SqliteStore::open(path, state.config.store_timeout)
        .with_context(|| format!("failed to open workspace {}", path.to_string_lossy()))?;
    state.store = Some(store);
    state.workspace = Some(path.to_path_buf());
    tracing::info!(workspace = %path.to_string_lossy(), "workspace opened");
    Ok(())
}

fn workspace_select(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let path = PathBuf::from(get_required_str(params, "path")?);
    open_workspace(state, &path)
        .map_err(|e| HandlerErr::new("db_open_failed", format!("{:#}", e)))?;
    Ok(json!({ "workspacePath": path.to_string_lossy() }))
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> Value {
    let result = workspace_select(state, &req.params);
    respond(req, result)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        _ => None,
    }
}
