use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_audit_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "events": [] }));
    };

    let entity_type = req
        .params
        .get("entityType")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());
    let entity_id = req
        .params
        .get("entityId")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());

    let (sql, params): (&str, Vec<String>) = match (&entity_type, &entity_id) {
        (Some(t), Some(i)) => (
            "SELECT id, action, entity_type, entity_id, payload, created_at
             FROM audit_log WHERE entity_type = ? AND entity_id = ?
             ORDER BY created_at DESC",
            vec![t.clone(), i.clone()],
        ),
        (Some(t), None) => (
            "SELECT id, action, entity_type, entity_id, payload, created_at
             FROM audit_log WHERE entity_type = ?
             ORDER BY created_at DESC",
            vec![t.clone()],
        ),
        _ => (
            "SELECT id, action, entity_type, entity_id, payload, created_at
             FROM audit_log ORDER BY created_at DESC",
            vec![],
        ),
    };

    let mut stmt = match conn.prepare(sql) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map(rusqlite::params_from_iter(params.iter()), |row| {
            let payload_raw: String = row.get(4)?;
            let payload =
                serde_json::from_str(&payload_raw).unwrap_or(serde_json::Value::Null);
            Ok(json!({
                "id": row.get::<_, String>(0)?,
                "action": row.get::<_, String>(1)?,
                "entityType": row.get::<_, String>(2)?,
                "entityId": row.get::<_, String>(3)?,
                "payload": payload,
                "createdAt": row.get::<_, String>(5)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(events) => ok(&req.id, json!({ "events": events })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "audit.list" => Some(handle_audit_list(state, req)),
        _ => None,
    }
}
