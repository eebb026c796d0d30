use super::model::{
    HistoryAction, HistoryRecord, ListQuery, Mapping, MappingInput, Transition, TransitionStatus,
};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use uuid::Uuid;

const HEADER_COLUMNS: &str = "id, academic_year, status, notes, created_by, created_at, updated_at,
     applied_at, applied_by, reverted_at, reverted_by";

/// A history row as planned by apply, before ids and timestamps exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedRecord {
    pub student_id: String,
    pub person_name: String,
    pub from_class: String,
    pub to_class: Option<String>,
    pub action: HistoryAction,
}

fn bad_tag(idx: usize, raw: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        rusqlite::types::Type::Text,
        format!("unknown tag: {}", raw).into(),
    )
}

fn header_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Transition> {
    let status_raw: String = row.get(2)?;
    let status = TransitionStatus::parse(&status_raw).ok_or_else(|| bad_tag(2, &status_raw))?;
    Ok(Transition {
        id: row.get(0)?,
        academic_year: row.get(1)?,
        status,
        notes: row.get(3)?,
        created_by: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
        applied_at: row.get(7)?,
        applied_by: row.get(8)?,
        reverted_at: row.get(9)?,
        reverted_by: row.get(10)?,
        mappings: Vec::new(),
    })
}

pub fn insert_transition(conn: &Connection, t: &Transition) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO class_transitions(
           id, academic_year, status, notes, created_by, created_at, updated_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?)",
        params![
            t.id,
            t.academic_year,
            t.status.as_str(),
            t.notes,
            t.created_by,
            t.created_at,
            t.updated_at
        ],
    )?;
    Ok(())
}

/// Header only; `mappings` is left empty.
pub fn load_header(conn: &Connection, id: &str) -> rusqlite::Result<Option<Transition>> {
    conn.query_row(
        &format!("SELECT {} FROM class_transitions WHERE id = ?", HEADER_COLUMNS),
        [id],
        header_from_row,
    )
    .optional()
}

pub fn load_transition(conn: &Connection, id: &str) -> rusqlite::Result<Option<Transition>> {
    let Some(mut t) = load_header(conn, id)? else {
        return Ok(None);
    };
    t.mappings = load_mappings(conn, id)?;
    Ok(Some(t))
}

pub fn load_mappings(conn: &Connection, transition_id: &str) -> rusqlite::Result<Vec<Mapping>> {
    let mut stmt = conn.prepare(
        "SELECT transition_id, from_class, to_class
         FROM class_transition_mappings
         WHERE transition_id = ?
         ORDER BY sort_order, from_class",
    )?;
    let rows = stmt
        .query_map([transition_id], |r| {
            Ok(Mapping {
                transition_id: r.get(0)?,
                from_class: r.get(1)?,
                to_class: r.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Delete-then-recreate. Inputs must already be normalized.
pub fn replace_mappings(
    conn: &Connection,
    transition_id: &str,
    mappings: &[MappingInput],
) -> rusqlite::Result<()> {
    conn.execute(
        "DELETE FROM class_transition_mappings WHERE transition_id = ?",
        [transition_id],
    )?;
    let mut stmt = conn.prepare(
        "INSERT INTO class_transition_mappings(id, transition_id, from_class, to_class, sort_order)
         VALUES(?, ?, ?, ?, ?)",
    )?;
    for (i, m) in mappings.iter().enumerate() {
        stmt.execute(params![
            Uuid::new_v4().to_string(),
            transition_id,
            m.from_class,
            m.to_class,
            i as i64
        ])?;
    }
    Ok(())
}

pub fn update_header(
    conn: &Connection,
    id: &str,
    academic_year: &str,
    notes: Option<&str>,
    updated_at: &str,
) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE class_transitions SET academic_year = ?, notes = ?, updated_at = ? WHERE id = ?",
        params![academic_year, notes, updated_at, id],
    )
}

/// Explicitly deletes in dependency order (no ON DELETE CASCADE here).
pub fn delete_transition(conn: &Connection, id: &str) -> rusqlite::Result<usize> {
    conn.execute(
        "DELETE FROM class_transition_history WHERE transition_id = ?",
        [id],
    )?;
    conn.execute(
        "DELETE FROM class_transition_mappings WHERE transition_id = ?",
        [id],
    )?;
    conn.execute("DELETE FROM class_transitions WHERE id = ?", [id])
}

/// Returns the requested page (newest first) and the unpaged total.
pub fn list_transitions(
    conn: &Connection,
    query: &ListQuery,
    page_size: u32,
) -> rusqlite::Result<(Vec<Transition>, i64)> {
    let mut filters: Vec<&str> = Vec::new();
    let mut values: Vec<Value> = Vec::new();
    if let Some(status) = query.status {
        filters.push("status = ?");
        values.push(Value::Text(status.as_str().to_string()));
    }
    if let Some(year) = query.academic_year.as_deref() {
        filters.push("academic_year = ?");
        values.push(Value::Text(year.to_string()));
    }
    let where_sql = if filters.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", filters.join(" AND "))
    };

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM class_transitions{}", where_sql),
        params_from_iter(values.iter()),
        |r| r.get(0),
    )?;

    let offset = i64::from(query.page.saturating_sub(1)) * i64::from(page_size);
    values.push(Value::Integer(i64::from(page_size)));
    values.push(Value::Integer(offset));
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM class_transitions{} ORDER BY created_at DESC, rowid DESC LIMIT ? OFFSET ?",
        HEADER_COLUMNS, where_sql
    ))?;
    let mut rows = stmt
        .query_map(params_from_iter(values.iter()), header_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    for t in rows.iter_mut() {
        t.mappings = load_mappings(conn, &t.id)?;
    }
    Ok((rows, total))
}

pub fn insert_history(
    conn: &Connection,
    transition_id: &str,
    records: &[PlannedRecord],
    created_at: &str,
) -> rusqlite::Result<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO class_transition_history(
           id, transition_id, seq, student_id, person_name, from_class, to_class, action, created_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )?;
    for (seq, r) in records.iter().enumerate() {
        stmt.execute(params![
            Uuid::new_v4().to_string(),
            transition_id,
            seq as i64,
            r.student_id,
            r.person_name,
            r.from_class,
            r.to_class,
            r.action.as_str(),
            created_at
        ])?;
    }
    Ok(())
}

pub fn load_history(
    conn: &Connection,
    transition_id: &str,
) -> rusqlite::Result<Vec<HistoryRecord>> {
    let mut stmt = conn.prepare(
        "SELECT id, transition_id, student_id, person_name, from_class, to_class, action, created_at
         FROM class_transition_history
         WHERE transition_id = ?
         ORDER BY seq",
    )?;
    let rows = stmt
        .query_map([transition_id], |r| {
            let action_raw: String = r.get(6)?;
            let action = HistoryAction::parse(&action_raw).ok_or_else(|| bad_tag(6, &action_raw))?;
            Ok(HistoryRecord {
                id: r.get(0)?,
                transition_id: r.get(1)?,
                student_id: r.get(2)?,
                person_name: r.get(3)?,
                from_class: r.get(4)?,
                to_class: r.get(5)?,
                action,
                created_at: r.get(7)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Conditional on the row still being a draft; 0 means another caller won.
pub fn mark_applied(
    conn: &Connection,
    id: &str,
    actor: &str,
    at: &str,
) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE class_transitions
         SET status = ?, applied_at = ?, applied_by = ?, updated_at = ?
         WHERE id = ? AND status = ?",
        params![
            TransitionStatus::Applied.as_str(),
            at,
            actor,
            at,
            id,
            TransitionStatus::Draft.as_str()
        ],
    )
}

pub fn mark_reverted(
    conn: &Connection,
    id: &str,
    actor: &str,
    at: &str,
) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE class_transitions
         SET status = ?, reverted_at = ?, reverted_by = ?, updated_at = ?
         WHERE id = ? AND status = ?",
        params![
            TransitionStatus::Reverted.as_str(),
            at,
            actor,
            at,
            id,
            TransitionStatus::Applied.as_str()
        ],
    )
}
