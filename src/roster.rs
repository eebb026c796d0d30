//! Student roster queries and the narrow set of writes class transitions
//! perform on it.

use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension};

// Stays well below SQLITE_MAX_VARIABLE_NUMBER on every build.
const ID_CHUNK: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentRow {
    pub id: String,
    pub last_name: String,
    pub first_name: String,
    pub student_no: Option<String>,
    pub school_class: String,
}

impl StudentRow {
    pub fn display_name(&self) -> String {
        format!("{}, {}", self.last_name, self.first_name)
    }
}

fn student_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<StudentRow> {
    Ok(StudentRow {
        id: row.get(0)?,
        last_name: row.get(1)?,
        first_name: row.get(2)?,
        student_no: row.get(3)?,
        school_class: row.get(4)?,
    })
}

/// Class labels that currently hold at least one student, ascending.
pub fn class_counts(conn: &Connection) -> rusqlite::Result<Vec<(String, i64)>> {
    let mut stmt = conn.prepare(
        "SELECT school_class, COUNT(*)
         FROM students
         WHERE TRIM(school_class) <> ''
         GROUP BY school_class
         ORDER BY school_class",
    )?;
    let rows = stmt
        .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn distinct_classes(conn: &Connection) -> rusqlite::Result<Vec<String>> {
    Ok(class_counts(conn)?.into_iter().map(|(c, _)| c).collect())
}

pub fn count_in_class(conn: &Connection, school_class: &str) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM students WHERE school_class = ?",
        [school_class],
        |r| r.get(0),
    )
}

pub fn students_in_classes(
    conn: &Connection,
    classes: &[String],
) -> rusqlite::Result<Vec<StudentRow>> {
    let mut out = Vec::new();
    for chunk in classes.chunks(ID_CHUNK) {
        let placeholders = vec!["?"; chunk.len()].join(", ");
        let sql = format!(
            "SELECT id, last_name, first_name, student_no, school_class
             FROM students
             WHERE school_class IN ({})
             ORDER BY school_class, last_name, first_name, id",
            placeholders
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(chunk.iter()), student_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        out.extend(rows);
    }
    Ok(out)
}

/// Moves the given students to `school_class`. Keyed by id so that chained
/// rules never move a student twice.
pub fn set_class_for_ids(
    conn: &Connection,
    ids: &[String],
    school_class: &str,
    updated_at: &str,
) -> rusqlite::Result<usize> {
    let mut changed = 0usize;
    for chunk in ids.chunks(ID_CHUNK) {
        let placeholders = vec!["?"; chunk.len()].join(", ");
        let sql = format!(
            "UPDATE students SET school_class = ?, updated_at = ? WHERE id IN ({})",
            placeholders
        );
        let mut values: Vec<Value> = Vec::with_capacity(chunk.len() + 2);
        values.push(Value::Text(school_class.to_string()));
        values.push(Value::Text(updated_at.to_string()));
        values.extend(chunk.iter().map(|id| Value::Text(id.clone())));
        changed += conn.execute(&sql, params_from_iter(values))?;
    }
    Ok(changed)
}

/// Dependent rows are removed by the schema's ON DELETE CASCADE.
pub fn delete_ids(conn: &Connection, ids: &[String]) -> rusqlite::Result<usize> {
    let mut removed = 0usize;
    for chunk in ids.chunks(ID_CHUNK) {
        let placeholders = vec!["?"; chunk.len()].join(", ");
        let sql = format!("DELETE FROM students WHERE id IN ({})", placeholders);
        removed += conn.execute(&sql, params_from_iter(chunk.iter()))?;
    }
    Ok(removed)
}

/// Returns affected rows; 0 means the student no longer exists.
pub fn restore_class(
    conn: &Connection,
    student_id: &str,
    school_class: &str,
    updated_at: &str,
) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE students SET school_class = ?, updated_at = ? WHERE id = ?",
        (school_class, updated_at, student_id),
    )
}

pub fn list_students(
    conn: &Connection,
    school_class: Option<&str>,
) -> rusqlite::Result<Vec<StudentRow>> {
    let base = "SELECT id, last_name, first_name, student_no, school_class FROM students";
    match school_class {
        Some(c) => {
            let mut stmt = conn.prepare(&format!(
                "{} WHERE school_class = ? ORDER BY last_name, first_name, id",
                base
            ))?;
            let rows = stmt
                .query_map([c], student_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        }
        None => {
            let mut stmt = conn.prepare(&format!(
                "{} ORDER BY school_class, last_name, first_name, id",
                base
            ))?;
            let rows = stmt
                .query_map([], student_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        }
    }
}

pub fn get_student(conn: &Connection, student_id: &str) -> rusqlite::Result<Option<StudentRow>> {
    conn.query_row(
        "SELECT id, last_name, first_name, student_no, school_class FROM students WHERE id = ?",
        [student_id],
        student_from_row,
    )
    .optional()
}

pub fn insert_student(
    conn: &Connection,
    student: &StudentRow,
    updated_at: &str,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO students(id, last_name, first_name, student_no, school_class, updated_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &student.id,
            &student.last_name,
            &student.first_name,
            &student.student_no,
            &student.school_class,
            updated_at,
        ),
    )?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_util {
    use super::*;

    pub fn seeded_conn(students: &[(&str, &str, &str)]) -> Connection {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        crate::db::init_schema(&conn).expect("init schema");
        for (id, name, class) in students {
            add_student(&conn, id, name, class);
        }
        conn
    }

    pub fn add_student(conn: &Connection, id: &str, last_name: &str, school_class: &str) {
        insert_student(
            conn,
            &StudentRow {
                id: id.to_string(),
                last_name: last_name.to_string(),
                first_name: "Test".to_string(),
                student_no: None,
                school_class: school_class.to_string(),
            },
            "0",
        )
        .expect("insert student");
    }

    pub fn class_of(conn: &Connection, id: &str) -> Option<String> {
        get_student(conn, id)
            .expect("query student")
            .map(|s| s.school_class)
    }

    /// File-backed workspace so several connections can share one database.
    pub fn temp_workspace(prefix: &str) -> std::path::PathBuf {
        let p = std::env::temp_dir().join(format!(
            "{}-{}",
            prefix,
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ));
        std::fs::create_dir_all(&p).expect("create temp dir");
        p
    }
}
