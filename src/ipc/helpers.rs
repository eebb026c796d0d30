use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::transitions::TransitionError;
use rusqlite::Connection;
use serde::Serialize;
use serde_json::Value;

pub fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub fn required_str(req: &Request, key: &str) -> Result<String, Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

/// Absent and `null` both mean "not given"; anything else must be a string.
pub fn opt_str(req: &Request, key: &str) -> Result<Option<String>, Value> {
    match req.params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => v
            .as_str()
            .map(|s| Some(s.to_string()))
            .ok_or_else(|| {
                err(
                    &req.id,
                    "bad_params",
                    format!("{} must be string or null", key),
                    None,
                )
            }),
    }
}

pub fn opt_u32(req: &Request, key: &str) -> Result<Option<u32>, Value> {
    match req.params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => v
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| {
                err(
                    &req.id,
                    "bad_params",
                    format!("{} must be a non-negative integer", key),
                    None,
                )
            }),
    }
}

pub fn transition_err(id: &str, e: TransitionError) -> Value {
    err(id, e.code(), e.to_string(), e.details())
}

pub fn respond<T: Serialize>(id: &str, result: Result<T, TransitionError>) -> Value {
    match result {
        Ok(v) => match serde_json::to_value(v) {
            Ok(v) => ok(id, v),
            Err(e) => err(id, "internal", e.to_string(), None),
        },
        Err(e) => transition_err(id, e),
    }
}
