use crate::audit;
use crate::ipc::error::{err, get_required_str, ok};
use crate::ipc::types::{AppState, Request};
use crate::rollover::{self, TransitionOptions};
use serde_json::json;
use uuid::Uuid;

fn handle_sessions_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "sessions": [] }));
    };

    let mut stmt = match conn.prepare(
        "SELECT id, name, start_date, end_date, is_current
         FROM academic_sessions
         ORDER BY start_date",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([], |row| {
            Ok(json!({
                "id": row.get::<_, String>(0)?,
                "name": row.get::<_, String>(1)?,
                "startDate": row.get::<_, String>(2)?,
                "endDate": row.get::<_, String>(3)?,
                "isCurrent": row.get::<_, i64>(4)? != 0,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(sessions) => ok(&req.id, json!({ "sessions": sessions })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_sessions_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let name = match get_required_str(&req.params, "name") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let start_date = match get_required_str(&req.params, "startDate") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let end_date = match get_required_str(&req.params, "endDate") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    // The very first session becomes current so billing lookups work
    // before any transition has run.
    let existing: i64 = match conn.query_row("SELECT COUNT(*) FROM academic_sessions", [], |r| {
        r.get(0)
    }) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let is_current = if existing == 0 { 1 } else { 0 };

    let session_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO academic_sessions(id, name, start_date, end_date, is_current)
         VALUES(?, ?, ?, ?, ?)",
        (&session_id, &name, &start_date, &end_date, is_current),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "academic_sessions" })),
        );
    }

    ok(
        &req.id,
        json!({ "sessionId": session_id, "name": name, "isCurrent": is_current != 0 }),
    )
}

fn handle_sessions_transition(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let target_session_id = match get_required_str(&req.params, "targetSessionId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let options: TransitionOptions = match req.params.get("options") {
        Some(raw) => match serde_json::from_value(raw.clone()) {
            Ok(v) => v,
            Err(e) => return err(&req.id, "bad_params", format!("options: {}", e), None),
        },
        None => TransitionOptions::default(),
    };

    let report = match rollover::transition_to_new_session(conn, &target_session_id, &options) {
        Ok(r) => r,
        Err(e) => return err(&req.id, "transition_failed", e.to_string(), None),
    };

    audit::record(
        conn,
        "session.transition",
        &json!({
            "previousSessionId": report.previous_session_id,
            "targetSessionId": report.target_session_id,
            "options": {
                "promoteStudents": options.promote_students,
                "resetEnrollments": options.reset_enrollments,
                "resetFeeOverrides": options.reset_fee_overrides,
                "copyFeeStructures": options.copy_fee_structures,
            },
            "promotedStudents": report.promoted_students,
            "enrollmentsReset": report.enrollments_reset,
            "feeStructuresCopied": report.fee_structures_copied,
        }),
        "academic_session",
        &target_session_id,
    );

    match serde_json::to_value(&report) {
        Ok(v) => ok(&req.id, v),
        Err(e) => err(&req.id, "internal", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "sessions.list" => Some(handle_sessions_list(state, req)),
        "sessions.create" => Some(handle_sessions_create(state, req)),
        "sessions.transition" => Some(handle_sessions_transition(state, req)),
        _ => None,
    }
}
