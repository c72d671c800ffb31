//! Process configuration from environment variables

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_PORT: u16 = 8000;
const DEFAULT_DEADLINE_MS: u64 = 3000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// Bot definition YAML (`CHATFLOW_DEFINITION`)
    pub definition: Option<PathBuf>,
    /// Database file overriding the definition's persistence
    pub db_path: Option<PathBuf>,
    pub port: u16,
    pub bot_id: i64,
    /// Execution limit for events from the update loop
    pub event_deadline: Duration,
    /// Execution limit for API invocations
    pub request_timeout: Duration,
    /// Directory image and document replies are read from
    pub assets_root: PathBuf,
    /// Check the definition and exit instead of serving (`CHATFLOW_VALIDATE_ONLY`)
    pub validate_only: bool,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup; unparsable values fall back to defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let millis = |name: &str| {
            Duration::from_millis(parsed(&lookup, name).unwrap_or(DEFAULT_DEADLINE_MS))
        };

        Self {
            definition: lookup("CHATFLOW_DEFINITION").map(PathBuf::from),
            db_path: lookup("CHATFLOW_DB_PATH").map(PathBuf::from),
            port: parsed(&lookup, "CHATFLOW_PORT").unwrap_or(DEFAULT_PORT),
            bot_id: parsed(&lookup, "CHATFLOW_BOT_ID").unwrap_or(0),
            event_deadline: millis("CHATFLOW_EVENT_DEADLINE_MS"),
            request_timeout: millis("CHATFLOW_REQUEST_TIMEOUT_MS"),
            assets_root: lookup("CHATFLOW_ASSETS_ROOT")
                .map_or_else(|| PathBuf::from("assets"), PathBuf::from),
            validate_only: lookup("CHATFLOW_VALIDATE_ONLY")
                .is_some_and(|v| matches!(v.trim(), "1" | "true" | "yes")),
        }
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
    let raw = lookup(name)?;
    if let Ok(value) = raw.trim().parse() {
        Some(value)
    } else {
        tracing::warn!(variable = name, value = %raw, "Ignoring unparsable setting");
        None
    }
}
