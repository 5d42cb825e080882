use std::path::PathBuf;

use serde::Deserialize;

use crate::attendance::AttendanceCoordinator;
use crate::config::Config;
use crate::store::SqliteStore;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub config: Config,
    pub workspace: Option<PathBuf>,
    pub store: Option<SqliteStore>,
    pub attendance: AttendanceCoordinator,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let attendance = AttendanceCoordinator::new(config.store_timeout);
        Self {
            config,
            workspace: None,
            store: None,
            attendance,
        }
    }
}
