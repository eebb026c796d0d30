use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

/// One line of the sidecar protocol: `{"id", "method", "params"}`.
#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Per-process state. No workspace is open until `workspace.select`
/// (or `ROLLOVERD_WORKSPACE`) provides one.
#[derive(Default)]
pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
}
