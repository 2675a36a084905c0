use crate::ipc::error::{err, get_required_str, ok, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::schedule;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

fn teacher_schedules(conn: &Connection, teacher_name: &str) -> Result<Vec<String>, HandlerErr> {
    let mut stmt = conn
        .prepare("SELECT schedule FROM batches WHERE teacher_name = ? AND active = 1")
        .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?;
    stmt.query_map([teacher_name], |r| r.get::<_, String>(0))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))
}

fn handle_batches_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "batches": [] }));
    };

    let mut stmt = match conn.prepare(
        "SELECT b.id, b.name, b.teacher_name, b.schedule, b.fee, b.active,
           (SELECT COUNT(*) FROM enrollments e WHERE e.batch_id = b.id AND e.active = 1)
         FROM batches b
         ORDER BY b.name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([], |row| {
            Ok(json!({
                "id": row.get::<_, String>(0)?,
                "name": row.get::<_, String>(1)?,
                "teacherName": row.get::<_, String>(2)?,
                "schedule": row.get::<_, String>(3)?,
                "fee": row.get::<_, i64>(4)?,
                "active": row.get::<_, i64>(5)? != 0,
                "enrolledCount": row.get::<_, i64>(6)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(batches) => ok(&req.id, json!({ "batches": batches })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_batches_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let name = match get_required_str(&req.params, "name") {
        Ok(v) => v.trim().to_string(),
        Err(e) => return e.response(&req.id),
    };
    let teacher_name = match get_required_str(&req.params, "teacherName") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let schedule_str = match get_required_str(&req.params, "schedule") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    if name.is_empty() {
        return err(&req.id, "bad_params", "name must not be empty", None);
    }
    let fee = req.params.get("fee").and_then(|v| v.as_i64()).unwrap_or(0);

    let existing = match teacher_schedules(conn, &teacher_name) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let check = schedule::check_time_conflict(&schedule_str, &existing);
    if check.conflict {
        return err(
            &req.id,
            "schedule_conflict",
            check
                .reason
                .unwrap_or_else(|| "schedule conflict".to_string()),
            Some(json!({ "teacherName": teacher_name })),
        );
    }

    let batch_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO batches(id, name, teacher_name, schedule, fee, active)
         VALUES(?, ?, ?, ?, ?, 1)",
        (&batch_id, &name, &teacher_name, &schedule_str, fee),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "batches" })),
        );
    }

    ok(&req.id, json!({ "batchId": batch_id, "name": name }))
}

fn handle_enrollments_assign(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let student_id = match get_required_str(&req.params, "studentId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let batch_id = match get_required_str(&req.params, "batchId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    let batch_active: Option<i64> = match conn
        .query_row("SELECT active FROM batches WHERE id = ?", [&batch_id], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    match batch_active {
        None => return err(&req.id, "not_found", "batch not found", None),
        Some(0) => return err(&req.id, "bad_params", "batch is inactive", None),
        Some(_) => {}
    }

    // Re-enrolling after a session reset revives the existing row.
    let enrollment_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO enrollments(id, student_id, batch_id, active)
         VALUES(?, ?, ?, 1)
         ON CONFLICT(student_id, batch_id) DO UPDATE SET active = 1",
        (&enrollment_id, &student_id, &batch_id),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "enrollments" })),
        );
    }

    ok(&req.id, json!({ "studentId": student_id, "batchId": batch_id }))
}

fn handle_enrollments_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "enrollments": [] }));
    };

    let student_filter = req
        .params
        .get("studentId")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());

    let (sql, params): (&str, Vec<String>) = match &student_filter {
        Some(sid) => (
            "SELECT id, student_id, batch_id, active FROM enrollments
             WHERE student_id = ? ORDER BY batch_id",
            vec![sid.clone()],
        ),
        None => (
            "SELECT id, student_id, batch_id, active FROM enrollments
             ORDER BY student_id, batch_id",
            vec![],
        ),
    };

    let mut stmt = match conn.prepare(sql) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map(rusqlite::params_from_iter(params.iter()), |row| {
            Ok(json!({
                "id": row.get::<_, String>(0)?,
                "studentId": row.get::<_, String>(1)?,
                "batchId": row.get::<_, String>(2)?,
                "active": row.get::<_, i64>(3)? != 0,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(enrollments) => ok(&req.id, json!({ "enrollments": enrollments })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "batches.list" => Some(handle_batches_list(state, req)),
        "batches.create" => Some(handle_batches_create(state, req)),
        "enrollments.assign" => Some(handle_enrollments_assign(state, req)),
        "enrollments.list" => Some(handle_enrollments_list(state, req)),
        _ => None,
    }
}
