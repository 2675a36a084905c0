use crate::db;
use crate::ipc::error::{err, get_required_i64, get_required_str, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

fn handle_ledger_record(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let family_id = match get_required_str(&req.params, "familyId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let amount = match get_required_i64(&req.params, "amount") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let kind = match get_required_str(&req.params, "type") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    if kind != "CREDIT" && kind != "DEBIT" {
        return err(&req.id, "bad_params", "type must be CREDIT or DEBIT", None);
    }
    if amount < 0 {
        return err(&req.id, "bad_params", "amount must not be negative", None);
    }
    let category = match get_required_str(&req.params, "category") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let note = req
        .params
        .get("note")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());

    let today = chrono::Local::now().date_naive();
    let receipt_number = match db::next_receipt_number(conn, today) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let tx_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO ledger_transactions(id, family_id, amount, type, category, note, receipt_number, void, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, 0, ?)",
        (
            &tx_id,
            &family_id,
            amount,
            &kind,
            &category,
            &note,
            &receipt_number,
            today.format("%Y-%m-%d").to_string(),
        ),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "ledger_transactions" })),
        );
    }

    ok(
        &req.id,
        json!({ "transactionId": tx_id, "receiptNumber": receipt_number }),
    )
}

fn handle_ledger_void(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let tx_id = match get_required_str(&req.params, "transactionId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    let exists: Option<i64> = match conn
        .query_row(
            "SELECT 1 FROM ledger_transactions WHERE id = ?",
            [&tx_id],
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if exists.is_none() {
        return err(&req.id, "not_found", "transaction not found", None);
    }

    if let Err(e) = conn.execute(
        "UPDATE ledger_transactions SET void = 1 WHERE id = ?",
        [&tx_id],
    ) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }

    ok(&req.id, json!({ "transactionId": tx_id }))
}

fn handle_family_balance(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let family_id = match get_required_str(&req.params, "familyId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    // Balance is payments received minus charges raised, voids excluded.
    let balance: Result<i64, _> = conn.query_row(
        "SELECT COALESCE(SUM(CASE type WHEN 'CREDIT' THEN amount ELSE -amount END), 0)
         FROM ledger_transactions
         WHERE family_id = ? AND void = 0",
        [&family_id],
        |r| r.get(0),
    );

    match balance {
        Ok(v) => ok(&req.id, json!({ "familyId": family_id, "balance": v })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "ledger.record" => Some(handle_ledger_record(state, req)),
        "ledger.void" => Some(handle_ledger_void(state, req)),
        "ledger.familyBalance" => Some(handle_family_balance(state, req)),
        _ => None,
    }
}
