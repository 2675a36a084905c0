use crate::ipc::error::{err, get_required_str, ok, HandlerErr};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

fn student_exists(conn: &Connection, student_id: &str) -> Result<bool, HandlerErr> {
    conn.query_row("SELECT 1 FROM students WHERE id = ?", [student_id], |r| {
        r.get::<_, i64>(0)
    })
    .optional()
    .map(|v| v.is_some())
    .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))
}

fn handle_families_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let name = match get_required_str(&req.params, "name") {
        Ok(v) => v.trim().to_string(),
        Err(e) => return e.response(&req.id),
    };
    if name.is_empty() {
        return err(&req.id, "bad_params", "name must not be empty", None);
    }
    let phone = req
        .params
        .get("phone")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());

    let family_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO families(id, name, phone) VALUES(?, ?, ?)",
        (&family_id, &name, &phone),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "families" })),
        );
    }

    ok(&req.id, json!({ "familyId": family_id, "name": name }))
}

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "students": [] }));
    };

    let mut stmt = match conn.prepare(
        "SELECT id, family_id, name, class_name, active, base_fee_override
         FROM students
         ORDER BY class_name, name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([], |row| {
            Ok(json!({
                "id": row.get::<_, String>(0)?,
                "familyId": row.get::<_, String>(1)?,
                "name": row.get::<_, String>(2)?,
                "className": row.get::<_, String>(3)?,
                "active": row.get::<_, i64>(4)? != 0,
                "baseFeeOverride": row.get::<_, Option<i64>>(5)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(students) => ok(&req.id, json!({ "students": students })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_students_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let family_id = match get_required_str(&req.params, "familyId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let name = match get_required_str(&req.params, "name") {
        Ok(v) => v.trim().to_string(),
        Err(e) => return e.response(&req.id),
    };
    let class_name = match get_required_str(&req.params, "className") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    if name.is_empty() {
        return err(&req.id, "bad_params", "name must not be empty", None);
    }
    let base_fee_override = req.params.get("baseFeeOverride").and_then(|v| v.as_i64());

    let student_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO students(id, family_id, name, class_name, active, base_fee_override)
         VALUES(?, ?, ?, ?, 1, ?)",
        (&student_id, &family_id, &name, &class_name, base_fee_override),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "students" })),
        );
    }

    ok(&req.id, json!({ "studentId": student_id, "name": name }))
}

fn handle_students_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let student_id = match get_required_str(&req.params, "studentId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    match student_exists(conn, &student_id) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "student not found", None),
        Err(e) => return e.response(&req.id),
    }

    let Some(patch) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "missing patch", None);
    };

    if let Some(name) = patch.get("name").and_then(|v| v.as_str()) {
        if let Err(e) = conn.execute(
            "UPDATE students SET name = ? WHERE id = ?",
            (name, &student_id),
        ) {
            return err(&req.id, "db_update_failed", e.to_string(), None);
        }
    }
    if let Some(class_name) = patch.get("className").and_then(|v| v.as_str()) {
        if let Err(e) = conn.execute(
            "UPDATE students SET class_name = ? WHERE id = ?",
            (class_name, &student_id),
        ) {
            return err(&req.id, "db_update_failed", e.to_string(), None);
        }
    }
    if let Some(active) = patch.get("active").and_then(|v| v.as_bool()) {
        if let Err(e) = conn.execute(
            "UPDATE students SET active = ? WHERE id = ?",
            (active as i64, &student_id),
        ) {
            return err(&req.id, "db_update_failed", e.to_string(), None);
        }
    }
    // Explicit null clears the override; absent key leaves it alone.
    if let Some(value) = patch.get("baseFeeOverride") {
        let override_fee = value.as_i64();
        if let Err(e) = conn.execute(
            "UPDATE students SET base_fee_override = ? WHERE id = ?",
            (override_fee, &student_id),
        ) {
            return err(&req.id, "db_update_failed", e.to_string(), None);
        }
    }

    ok(&req.id, json!({ "studentId": student_id }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "families.create" => Some(handle_families_create(state, req)),
        "students.list" => Some(handle_students_list(state, req)),
        "students.create" => Some(handle_students_create(state, req)),
        "students.update" => Some(handle_students_update(state, req)),
        _ => None,
    }
}
