use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub const DB_FILE_NAME: &str = "rollover.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            last_name TEXT NOT NULL,
            first_name TEXT NOT NULL,
            student_no TEXT,
            school_class TEXT NOT NULL,
            updated_at TEXT
        )",
        [],
    )?;
    // Older workspaces were created before students carried a timestamp.
    ensure_students_updated_at(conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_school_class ON students(school_class)",
        [],
    )?;

    // Graduating a student deletes the row; dependents go with it.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS student_notes(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            note TEXT NOT NULL,
            FOREIGN KEY(student_id) REFERENCES students(id) ON DELETE CASCADE,
            UNIQUE(student_id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS class_transitions(
            id TEXT PRIMARY KEY,
            academic_year TEXT NOT NULL,
            status TEXT NOT NULL,
            notes TEXT,
            created_by TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            applied_at TEXT,
            applied_by TEXT,
            reverted_at TEXT,
            reverted_by TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_class_transitions_status ON class_transitions(status)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS class_transition_mappings(
            id TEXT PRIMARY KEY,
            transition_id TEXT NOT NULL,
            from_class TEXT NOT NULL,
            to_class TEXT,
            sort_order INTEGER NOT NULL,
            FOREIGN KEY(transition_id) REFERENCES class_transitions(id),
            UNIQUE(transition_id, from_class)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_class_transition_mappings_transition
         ON class_transition_mappings(transition_id, sort_order)",
        [],
    )?;

    // No foreign key on student_id: history outlives graduated students.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS class_transition_history(
            id TEXT PRIMARY KEY,
            transition_id TEXT NOT NULL,
            seq INTEGER NOT NULL,
            student_id TEXT NOT NULL,
            person_name TEXT NOT NULL,
            from_class TEXT NOT NULL,
            to_class TEXT,
            action TEXT NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY(transition_id) REFERENCES class_transitions(id),
            UNIQUE(transition_id, student_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_class_transition_history_transition
         ON class_transition_history(transition_id, seq)",
        [],
    )?;

    Ok(())
}

/// Stored text for `key`, unparsed.
pub fn settings_get_raw(conn: &Connection, key: &str) -> rusqlite::Result<Option<String>> {
    conn.query_row(
        "SELECT value_json FROM settings WHERE key = ?",
        [key],
        |r| r.get(0),
    )
    .optional()
}

pub fn settings_get_json(
    conn: &Connection,
    key: &str,
) -> anyhow::Result<Option<serde_json::Value>> {
    match settings_get_raw(conn, key)? {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

fn ensure_students_updated_at(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "students", "updated_at")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE students ADD COLUMN updated_at TEXT", [])?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
