use super::error::{TransitionError, TransitionResult};
use super::model::{
    ListQuery, NewTransition, Transition, TransitionPage, TransitionPatch, TransitionStatus,
};
use super::settings::TransitionSettings;
use super::store;
use super::validate::{
    normalize_academic_year, normalize_actor, normalize_mappings, normalize_notes,
};
use super::now_ts;
use rusqlite::Connection;
use tracing::{debug, info};
use uuid::Uuid;

pub fn create_transition(conn: &Connection, input: NewTransition) -> TransitionResult<Transition> {
    // Validate everything before the first write.
    let academic_year = normalize_academic_year(&input.academic_year)?;
    let mappings = normalize_mappings(&input.mappings)?;
    let created_by = normalize_actor(&input.created_by)?;
    let notes = normalize_notes(input.notes.as_deref());

    let now = now_ts();
    let header = Transition {
        id: Uuid::new_v4().to_string(),
        academic_year,
        status: TransitionStatus::Draft,
        notes,
        created_by,
        created_at: now.clone(),
        updated_at: now,
        applied_at: None,
        applied_by: None,
        reverted_at: None,
        reverted_by: None,
        mappings: Vec::new(),
    };

    let tx = conn.unchecked_transaction()?;
    store::insert_transition(&tx, &header)?;
    store::replace_mappings(&tx, &header.id, &mappings)?;
    let created = store::load_transition(&tx, &header.id)?
        .ok_or_else(TransitionError::transition_not_found)?;
    tx.commit()?;

    info!(
        transition_id = %created.id,
        academic_year = %created.academic_year,
        mappings = created.mappings.len(),
        "transition created"
    );
    Ok(created)
}

pub fn update_transition(
    conn: &Connection,
    id: &str,
    patch: TransitionPatch,
) -> TransitionResult<Transition> {
    let academic_year = patch
        .academic_year
        .as_deref()
        .map(normalize_academic_year)
        .transpose()?;
    let mappings = patch
        .mappings
        .as_deref()
        .map(normalize_mappings)
        .transpose()?;

    let tx = conn.unchecked_transaction()?;
    let current = store::load_header(&tx, id)?.ok_or_else(TransitionError::transition_not_found)?;
    current.status.ensure_editable()?;

    if patch.is_empty() {
        return store::load_transition(&tx, id)?.ok_or_else(TransitionError::transition_not_found);
    }

    let next_year = academic_year.unwrap_or(current.academic_year);
    let next_notes = match patch.notes {
        Some(n) => normalize_notes(n.as_deref()),
        None => current.notes,
    };
    store::update_header(&tx, id, &next_year, next_notes.as_deref(), &now_ts())?;
    if let Some(mappings) = &mappings {
        store::replace_mappings(&tx, id, mappings)?;
    }
    let updated =
        store::load_transition(&tx, id)?.ok_or_else(TransitionError::transition_not_found)?;
    tx.commit()?;

    debug!(
        transition_id = %id,
        replaced_mappings = mappings.is_some(),
        "transition updated"
    );
    Ok(updated)
}

pub fn delete_transition(conn: &Connection, id: &str) -> TransitionResult<()> {
    let tx = conn.unchecked_transaction()?;
    let current = store::load_header(&tx, id)?.ok_or_else(TransitionError::transition_not_found)?;
    current.status.ensure_deletable()?;
    store::delete_transition(&tx, id)?;
    tx.commit()?;
    info!(transition_id = %id, "transition deleted");
    Ok(())
}

pub fn get_transition(conn: &Connection, id: &str) -> TransitionResult<Transition> {
    store::load_transition(conn, id)?.ok_or_else(TransitionError::transition_not_found)
}

pub fn list_transitions(conn: &Connection, query: &ListQuery) -> TransitionResult<TransitionPage> {
    let settings = TransitionSettings::load(conn)?;
    let page = query.page.max(1);
    let page_size = settings.page_size(query.page_size);
    let (transitions, total_count) = store::list_transitions(
        conn,
        &ListQuery {
            page,
            ..query.clone()
        },
        page_size,
    )?;
    Ok(TransitionPage {
        transitions,
        total_count,
        page,
        page_size,
    })
}
