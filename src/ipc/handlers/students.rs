use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, opt_str, required_str};
use crate::ipc::types::{AppState, Request};
use crate::roster::{self, StudentRow};
use crate::transitions;
use rusqlite::params_from_iter;
use rusqlite::types::Value;
use serde_json::json;
use uuid::Uuid;

fn student_json(s: &StudentRow) -> serde_json::Value {
    json!({
        "id": s.id,
        "lastName": s.last_name,
        "firstName": s.first_name,
        "displayName": s.display_name(),
        "studentNo": s.student_no,
        "schoolClass": s.school_class,
    })
}

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let school_class = match opt_str(req, "schoolClass") {
        Ok(v) => v.map(|s| s.trim().to_string()),
        Err(e) => return e,
    };
    match roster::list_students(conn, school_class.as_deref()) {
        Ok(rows) => {
            let students: Vec<_> = rows.iter().map(student_json).collect();
            ok(&req.id, json!({ "students": students }))
        }
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_students_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let last_name = match required_str(req, "lastName") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let first_name = match required_str(req, "firstName") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let school_class = match required_str(req, "schoolClass") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let student_no = match opt_str(req, "studentNo") {
        Ok(v) => v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()),
        Err(e) => return e,
    };

    let student = StudentRow {
        id: Uuid::new_v4().to_string(),
        last_name,
        first_name,
        student_no,
        school_class,
    };
    if let Err(e) = roster::insert_student(conn, &student, &transitions::now_ts()) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "students" })),
        );
    }
    ok(&req.id, json!({ "studentId": student.id }))
}

fn handle_students_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(patch) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "missing patch", None);
    };

    match roster::get_student(conn, &student_id) {
        Ok(Some(_)) => {}
        Ok(None) => return err(&req.id, "not_found", "student not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }

    let mut fields: Vec<&str> = Vec::new();
    let mut values: Vec<Value> = Vec::new();
    for (k, v) in patch {
        let column = match k.as_str() {
            "lastName" => "last_name = ?",
            "firstName" => "first_name = ?",
            "schoolClass" => "school_class = ?",
            "studentNo" => "student_no = ?",
            _ => return err(&req.id, "bad_params", format!("unknown patch field: {}", k), None),
        };
        if k == "studentNo" && v.is_null() {
            fields.push(column);
            values.push(Value::Null);
            continue;
        }
        let Some(s) = v.as_str().map(str::trim) else {
            return err(&req.id, "bad_params", format!("patch.{} must be string", k), None);
        };
        if s.is_empty() && k != "studentNo" {
            return err(&req.id, "bad_params", format!("patch.{} must not be empty", k), None);
        }
        fields.push(column);
        values.push(if s.is_empty() {
            Value::Null
        } else {
            Value::Text(s.to_string())
        });
    }
    if fields.is_empty() {
        return ok(&req.id, json!({ "ok": true }));
    }
    fields.push("updated_at = ?");
    values.push(Value::Text(transitions::now_ts()));
    values.push(Value::Text(student_id));
    let sql = format!("UPDATE students SET {} WHERE id = ?", fields.join(", "));
    if let Err(e) = conn.execute(&sql, params_from_iter(values)) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "ok": true }))
}

fn handle_students_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match roster::delete_ids(conn, &[student_id]) {
        Ok(0) => err(&req.id, "not_found", "student not found", None),
        Ok(_) => ok(&req.id, json!({ "ok": true })),
        Err(e) => err(&req.id, "db_delete_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(handle_students_list(state, req)),
        "students.create" => Some(handle_students_create(state, req)),
        "students.update" => Some(handle_students_update(state, req)),
        "students.delete" => Some(handle_students_delete(state, req)),
        _ => None,
    }
}
