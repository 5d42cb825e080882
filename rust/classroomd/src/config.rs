use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_STORE_TIMEOUT_MS: u64 = 5000;

/// Process settings, read once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub log_filter: String,
    pub log_json: bool,
    pub workspace: Option<PathBuf>,
    /// SQLite busy timeout and the per-key attendance lock wait.
    pub store_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_filter: "info".to_string(),
            log_json: false,
            workspace: None,
            store_timeout: Duration::from_millis(DEFAULT_STORE_TIMEOUT_MS),
        }
    }
}

fn parse_bool(v: &str) -> Option<bool> {
    match v {
        "1" | "true" | "TRUE" | "yes" | "YES" => Some(true),
        "0" | "false" | "FALSE" | "no" | "NO" => Some(false),
        _ => None,
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let env_bool = |name: &str, default: bool| {
            get(name).as_deref().and_then(parse_bool).unwrap_or(default)
        };
        let env_u64 = |name: &str, default: u64| {
            get(name)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .unwrap_or(default)
        };
        Self {
            log_filter: get("CLASSROOMD_LOG")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.log_filter),
            log_json: env_bool("CLASSROOMD_LOG_JSON", defaults.log_json),
            workspace: get("CLASSROOMD_WORKSPACE")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
            store_timeout: Duration::from_millis(env_u64(
                "CLASSROOMD_STORE_TIMEOUT_MS",
                DEFAULT_STORE_TIMEOUT_MS,
            )),
        }
    }
}
