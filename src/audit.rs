use rusqlite::Connection;
use uuid::Uuid;

/// Records an admin-visible event. Best-effort: the caller has already
/// committed its real work and a failed audit insert must not undo it.
pub fn record(
    conn: &Connection,
    action: &str,
    payload: &serde_json::Value,
    entity_type: &str,
    entity_id: &str,
) {
    let _ = conn.execute(
        "INSERT INTO audit_log(id, action, entity_type, entity_id, payload, created_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            Uuid::new_v4().to_string(),
            action,
            entity_type,
            entity_id,
            payload.to_string(),
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S").to_string(),
        ),
    );
}
