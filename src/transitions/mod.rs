//! End-of-year class transitions: draft a set of from->to class rules,
//! preview their effect, apply them to the roster in one transaction and
//! revert them from the history written at apply time.

mod apply;
mod crud;
mod error;
mod model;
mod preview;
mod revert;
pub mod settings;
mod store;
mod suggest;
mod validate;

pub use apply::apply_transition;
pub use crud::{
    create_transition, delete_transition, get_transition, list_transitions, update_transition,
};
pub use error::{TransitionError, TransitionResult};
pub use model::{
    HistoryRecord, ListQuery, MappingInput, NewTransition, TransitionPatch, TransitionStatus,
};
pub use preview::preview_transition;
pub use revert::revert_transition;
pub use suggest::suggest_mappings;

use crate::roster;
use chrono::{SecondsFormat, Utc};
use rusqlite::Connection;

pub(crate) fn now_ts() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn distinct_classes(conn: &Connection) -> TransitionResult<Vec<String>> {
    Ok(roster::distinct_classes(conn)?)
}

pub fn transition_history(conn: &Connection, id: &str) -> TransitionResult<Vec<HistoryRecord>> {
    if store::load_header(conn, id)?.is_none() {
        return Err(TransitionError::transition_not_found());
    }
    Ok(store::load_history(conn, id)?)
}
