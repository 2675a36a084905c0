use crate::ipc::error::{err, get_required_i64, get_required_str, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use uuid::Uuid;

fn handle_fee_structures_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "feeStructures": [] }));
    };

    let session_filter = req
        .params
        .get("sessionId")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());

    let (sql, params): (&str, Vec<String>) = match &session_filter {
        Some(sid) => (
            "SELECT id, session_id, class_name, monthly_fee, admission_fee, active
             FROM fee_structures WHERE session_id = ? ORDER BY class_name",
            vec![sid.clone()],
        ),
        None => (
            "SELECT id, session_id, class_name, monthly_fee, admission_fee, active
             FROM fee_structures ORDER BY session_id, class_name",
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
                "sessionId": row.get::<_, String>(1)?,
                "className": row.get::<_, String>(2)?,
                "monthlyFee": row.get::<_, i64>(3)?,
                "admissionFee": row.get::<_, i64>(4)?,
                "active": row.get::<_, i64>(5)? != 0,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(fee_structures) => ok(&req.id, json!({ "feeStructures": fee_structures })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_fee_structures_upsert(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let session_id = match get_required_str(&req.params, "sessionId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let class_name = match get_required_str(&req.params, "className") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let monthly_fee = match get_required_i64(&req.params, "monthlyFee") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let admission_fee = req
        .params
        .get("admissionFee")
        .and_then(|v| v.as_i64())
        .unwrap_or(0);

    let id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO fee_structures(id, session_id, class_name, monthly_fee, admission_fee, active)
         VALUES(?, ?, ?, ?, ?, 1)
         ON CONFLICT(session_id, class_name)
         DO UPDATE SET monthly_fee = excluded.monthly_fee,
                       admission_fee = excluded.admission_fee,
                       active = 1",
        (&id, &session_id, &class_name, monthly_fee, admission_fee),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "fee_structures" })),
        );
    }

    ok(
        &req.id,
        json!({
            "sessionId": session_id,
            "className": class_name,
            "monthlyFee": monthly_fee,
            "admissionFee": admission_fee,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "feeStructures.list" => Some(handle_fee_structures_list(state, req)),
        "feeStructures.upsert" => Some(handle_fee_structures_upsert(state, req)),
        _ => None,
    }
}
