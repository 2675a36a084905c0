use crate::audit;
use crate::billing;
use crate::db;
use crate::ipc::error::{err, get_required_str, ok, HandlerErr};
use crate::ipc::types::{AppState, Request};
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

struct ClassFees {
    monthly_fee: i64,
    admission_fee: i64,
}

fn current_session_id(conn: &Connection) -> Result<Option<String>, HandlerErr> {
    conn.query_row(
        "SELECT id FROM academic_sessions WHERE is_current = 1",
        [],
        |r| r.get(0),
    )
    .optional()
    .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))
}

fn class_fees(conn: &Connection, session_id: &str, class_name: &str) -> Result<Option<ClassFees>, HandlerErr> {
    conn.query_row(
        "SELECT monthly_fee, admission_fee FROM fee_structures
         WHERE session_id = ? AND class_name = ? AND active = 1",
        (session_id, class_name),
        |r| {
            Ok(ClassFees {
                monthly_fee: r.get(0)?,
                admission_fee: r.get(1)?,
            })
        },
    )
    .optional()
    .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))
}

fn parse_date(raw: &str) -> Result<NaiveDate, HandlerErr> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| HandlerErr::new("bad_params", format!("invalid date: {}", raw)))
}

fn joining_fee_payload(fee: &billing::JoiningFee) -> serde_json::Value {
    json!({
        "isConflict": fee.is_conflict,
        "remainingDays": fee.remaining_days,
        "suggestedAmount": fee.suggested_amount,
        "explanation": fee.explanation,
    })
}

fn handle_preview_joining_fee(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let joining_date = match get_required_str(&req.params, "joiningDate").and_then(|s| parse_date(&s)) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    // Callers may pass the fee directly; otherwise it comes from the
    // current session's fee structure for the class.
    let monthly_fee = match req.params.get("monthlyFee").and_then(|v| v.as_i64()) {
        Some(v) => v,
        None => {
            let class_name = match get_required_str(&req.params, "className") {
                Ok(v) => v,
                Err(e) => return e.response(&req.id),
            };
            let session_id = match current_session_id(conn) {
                Ok(Some(v)) => v,
                Ok(None) => return err(&req.id, "not_found", "no current session", None),
                Err(e) => return e.response(&req.id),
            };
            match class_fees(conn, &session_id, &class_name) {
                Ok(Some(f)) => f.monthly_fee,
                Ok(None) => {
                    return err(
                        &req.id,
                        "not_found",
                        format!("no fee structure for {}", class_name),
                        None,
                    )
                }
                Err(e) => return e.response(&req.id),
            }
        }
    };

    let fee = billing::calculate_joining_fee(joining_date, monthly_fee);
    ok(&req.id, joining_fee_payload(&fee))
}

fn handle_admit(state: &mut AppState, req: &Request) -> serde_json::Value {
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
    let joining_date = match get_required_str(&req.params, "joiningDate").and_then(|s| parse_date(&s)) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    if name.is_empty() {
        return err(&req.id, "bad_params", "name must not be empty", None);
    }

    let session_id = match current_session_id(conn) {
        Ok(Some(v)) => v,
        Ok(None) => return err(&req.id, "not_found", "no current session", None),
        Err(e) => return e.response(&req.id),
    };
    let fees = match class_fees(conn, &session_id, &class_name) {
        Ok(Some(f)) => f,
        Ok(None) => {
            return err(
                &req.id,
                "not_found",
                format!("no fee structure for {}", class_name),
                None,
            )
        }
        Err(e) => return e.response(&req.id),
    };

    let joining_fee = billing::calculate_joining_fee(joining_date, fees.monthly_fee);

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };

    let student_id = Uuid::new_v4().to_string();
    if let Err(e) = tx.execute(
        "INSERT INTO students(id, family_id, name, class_name, active, base_fee_override)
         VALUES(?, ?, ?, ?, 1, NULL)",
        (&student_id, &family_id, &name, &class_name),
    ) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "students" })),
        );
    }

    let created_at = joining_date.format("%Y-%m-%d").to_string();
    let mut receipts = Vec::new();
    for (category, amount, note) in [
        ("ADMISSION_FEE", fees.admission_fee, "Admission fee".to_string()),
        ("MONTHLY_FEE", joining_fee.suggested_amount, joining_fee.explanation.clone()),
    ] {
        let receipt_number = match db::next_receipt_number(&tx, joining_date) {
            Ok(v) => v,
            Err(e) => {
                let _ = tx.rollback();
                return err(&req.id, "db_query_failed", e.to_string(), None);
            }
        };
        if let Err(e) = tx.execute(
            "INSERT INTO ledger_transactions(id, family_id, amount, type, category, note, receipt_number, void, created_at)
             VALUES(?, ?, ?, 'DEBIT', ?, ?, ?, 0, ?)",
            (
                Uuid::new_v4().to_string(),
                &family_id,
                amount,
                category,
                &note,
                &receipt_number,
                &created_at,
            ),
        ) {
            let _ = tx.rollback();
            return err(
                &req.id,
                "db_insert_failed",
                e.to_string(),
                Some(json!({ "table": "ledger_transactions" })),
            );
        }
        receipts.push(receipt_number);
    }

    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    audit::record(
        conn,
        "admission.admit",
        &json!({
            "familyId": family_id,
            "className": class_name,
            "joiningDate": created_at,
            "admissionFee": fees.admission_fee,
            "firstMonthFee": joining_fee.suggested_amount,
        }),
        "student",
        &student_id,
    );

    ok(
        &req.id,
        json!({
            "studentId": student_id,
            "admissionFee": fees.admission_fee,
            "joiningFee": joining_fee_payload(&joining_fee),
            "receipts": receipts,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "admissions.previewJoiningFee" => Some(handle_preview_joining_fee(state, req)),
        "admissions.admit" => Some(handle_admit(state, req)),
        _ => None,
    }
}
