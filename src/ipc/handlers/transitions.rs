use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, opt_str, opt_u32, required_str, respond, transition_err};
use crate::ipc::types::{AppState, Request};
use crate::transitions::{
    self, ListQuery, MappingInput, NewTransition, TransitionPatch, TransitionStatus,
};
use serde_json::{json, Value};

const DEFAULT_ACTOR: &str = "system";

fn parse_mappings(id: &str, raw: &Value, key: &str) -> Result<Vec<MappingInput>, Value> {
    if !raw.is_array() {
        return Err(err(id, "bad_params", format!("{} must be an array", key), None));
    }
    serde_json::from_value::<Vec<MappingInput>>(raw.clone()).map_err(|e| {
        err(
            id,
            "bad_params",
            format!("{} entries must be {{fromClass, toClass?}}: {}", key, e),
            None,
        )
    })
}

fn handle_create(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let academic_year = match opt_str(req, "academicYear") {
        Ok(v) => v.unwrap_or_default(),
        Err(e) => return e,
    };
    let notes = match opt_str(req, "notes") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let mappings = match req.params.get("mappings") {
        None | Some(Value::Null) => Vec::new(),
        Some(raw) => match parse_mappings(&req.id, raw, "mappings") {
            Ok(v) => v,
            Err(e) => return e,
        },
    };
    let created_by = match opt_str(req, "actorId") {
        Ok(v) => v.unwrap_or_else(|| DEFAULT_ACTOR.to_string()),
        Err(e) => return e,
    };
    respond(
        &req.id,
        transitions::create_transition(
            conn,
            NewTransition {
                academic_year,
                notes,
                mappings,
                created_by,
            },
        ),
    )
}

fn handle_update(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let transition_id = match required_str(req, "transitionId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "missing patch", None);
    };

    let mut patch = TransitionPatch::default();
    for (k, v) in patch_obj {
        match k.as_str() {
            "academicYear" => {
                let Some(s) = v.as_str() else {
                    return err(&req.id, "bad_params", "patch.academicYear must be string", None);
                };
                patch.academic_year = Some(s.to_string());
            }
            "notes" => {
                if v.is_null() {
                    patch.notes = Some(None);
                } else if let Some(s) = v.as_str() {
                    patch.notes = Some(Some(s.to_string()));
                } else {
                    return err(&req.id, "bad_params", "patch.notes must be string or null", None);
                }
            }
            "mappings" => match parse_mappings(&req.id, v, "patch.mappings") {
                Ok(m) => patch.mappings = Some(m),
                Err(e) => return e,
            },
            _ => return err(&req.id, "bad_params", format!("unknown patch field: {}", k), None),
        }
    }
    respond(
        &req.id,
        transitions::update_transition(conn, &transition_id, patch),
    )
}

fn handle_delete(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let transition_id = match required_str(req, "transitionId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match transitions::delete_transition(conn, &transition_id) {
        Ok(()) => ok(&req.id, json!({ "ok": true })),
        Err(e) => transition_err(&req.id, e),
    }
}

fn handle_get(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let transition_id = match required_str(req, "transitionId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    respond(&req.id, transitions::get_transition(conn, &transition_id))
}

fn handle_list(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let page = match opt_u32(req, "page") {
        Ok(v) => v.unwrap_or(1),
        Err(e) => return e,
    };
    let page_size = match opt_u32(req, "pageSize") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let status = match opt_str(req, "status") {
        Ok(None) => None,
        Ok(Some(raw)) => match TransitionStatus::parse(&raw.trim().to_ascii_lowercase()) {
            Some(s) => Some(s),
            None => {
                return err(
                    &req.id,
                    "bad_params",
                    "status must be one of: draft, applied, reverted",
                    None,
                )
            }
        },
        Err(e) => return e,
    };
    let academic_year = match opt_str(req, "academicYear") {
        Ok(v) => v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()),
        Err(e) => return e,
    };
    respond(
        &req.id,
        transitions::list_transitions(
            conn,
            &ListQuery {
                page,
                page_size,
                status,
                academic_year,
            },
        ),
    )
}

fn handle_preview(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let transition_id = match required_str(req, "transitionId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    respond(&req.id, transitions::preview_transition(conn, &transition_id))
}

fn handle_apply(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let transition_id = match required_str(req, "transitionId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let actor_id = match required_str(req, "actorId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    respond(
        &req.id,
        transitions::apply_transition(conn, &transition_id, &actor_id),
    )
}

fn handle_revert(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let transition_id = match required_str(req, "transitionId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let actor_id = match required_str(req, "actorId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    respond(
        &req.id,
        transitions::revert_transition(conn, &transition_id, &actor_id),
    )
}

fn handle_classes(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    match transitions::distinct_classes(conn) {
        Ok(classes) => ok(&req.id, json!({ "classes": classes })),
        Err(e) => transition_err(&req.id, e),
    }
}

fn handle_suggest(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    match transitions::suggest_mappings(conn) {
        Ok(suggestions) => ok(&req.id, json!({ "suggestions": suggestions })),
        Err(e) => transition_err(&req.id, e),
    }
}

fn handle_history(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let transition_id = match required_str(req, "transitionId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match transitions::transition_history(conn, &transition_id) {
        Ok(history) => ok(&req.id, json!({ "history": history })),
        Err(e) => transition_err(&req.id, e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "transitions.create" => Some(handle_create(state, req)),
        "transitions.update" => Some(handle_update(state, req)),
        "transitions.delete" => Some(handle_delete(state, req)),
        "transitions.get" => Some(handle_get(state, req)),
        "transitions.list" => Some(handle_list(state, req)),
        "transitions.preview" => Some(handle_preview(state, req)),
        "transitions.apply" => Some(handle_apply(state, req)),
        "transitions.revert" => Some(handle_revert(state, req)),
        "transitions.classes" => Some(handle_classes(state, req)),
        "transitions.suggest" => Some(handle_suggest(state, req)),
        "transitions.history" => Some(handle_history(state, req)),
        _ => None,
    }
}
