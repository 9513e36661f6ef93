use crate::classify;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{date_or_today, db_conn, optional_str, required_str, student_exists};
use crate::ipc::types::{AppState, Request};
use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

const STATUSES: [&str; 2] = ["presente", "faltou"];

fn required_status(req: &Request) -> Result<String, serde_json::Value> {
    let status = required_str(req, "status")?.trim().to_lowercase();
    if STATUSES.contains(&status.as_str()) {
        Ok(status)
    } else {
        Err(err(
            &req.id,
            "bad_params",
            "status must be one of: presente, faltou",
            Some(json!({ "status": status })),
        ))
    }
}

// Upsert by the natural key (student, date, slot). Last writer wins; the
// storage layer's serialized writers are the only arbitration.
fn handle_record(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let status = match required_status(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let date = match date_or_today(req, "date") {
        Ok(v) => v.to_string(),
        Err(resp) => return resp,
    };
    let slot = optional_str(req, "slot").unwrap_or_default();
    let staff = optional_str(req, "staffName");

    if let Err(resp) = student_exists(conn, req, &student_id) {
        return resp;
    }

    let existing: Option<String> = match conn
        .query_row(
            "SELECT id FROM attendance WHERE student_id = ? AND date = ? AND slot = ?",
            (&student_id, &date, &slot),
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let result = match existing {
        Some(id) => conn
            .execute(
                "UPDATE attendance SET status = ?, staff_name = COALESCE(?, staff_name)
                 WHERE id = ?",
                (&status, &staff, &id),
            )
            .map(|_| false),
        None => conn
            .execute(
                "INSERT INTO attendance(id, student_id, date, slot, status, staff_name)
                 VALUES(?, ?, ?, ?, ?, ?)",
                (
                    Uuid::new_v4().to_string(),
                    &student_id,
                    &date,
                    &slot,
                    &status,
                    &staff,
                ),
            )
            .map(|_| true),
    };

    match result {
        Ok(created) => ok(&req.id, json!({ "created": created, "date": date })),
        Err(e) => err(
            &req.id,
            "db_update_failed",
            e.to_string(),
            Some(json!({ "table": "attendance" })),
        ),
    }
}

// Justifications attach to the day's absence. When none was recorded yet
// (the call happens before the class was taken), a fresh 'faltou' record is
// created to carry it. The category is derived at write time so history
// stays stable when the keyword config changes later.
fn handle_justify(state: &mut AppState, req: &Request) -> serde_json::Value {
    let categories = state.categories.clone();
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let justification = match required_str(req, "justification") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let date = match date_or_today(req, "date") {
        Ok(v) => v.to_string(),
        Err(resp) => return resp,
    };
    let staff = optional_str(req, "staffName");
    let contact_made = req
        .params
        .get("contactMade")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    if let Err(resp) = student_exists(conn, req, &student_id) {
        return resp;
    }

    let category = classify::classify_justification(Some(&justification), &categories);

    let existing: Option<String> = match conn
        .query_row(
            "SELECT id FROM attendance
             WHERE student_id = ? AND date = ? AND status = 'faltou'
             ORDER BY slot LIMIT 1",
            (&student_id, &date),
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let result = match existing {
        Some(id) => conn
            .execute(
                "UPDATE attendance SET
                   justification = ?,
                   staff_name = COALESCE(?, staff_name),
                   contact_made = ?,
                   category = ?
                 WHERE id = ?",
                (&justification, &staff, contact_made as i64, &category, &id),
            )
            .map(|_| false),
        None => conn
            .execute(
                "INSERT INTO attendance(id, student_id, date, status, justification, staff_name, contact_made, category)
                 VALUES(?, ?, ?, 'faltou', ?, ?, ?, ?)",
                (
                    Uuid::new_v4().to_string(),
                    &student_id,
                    &date,
                    &justification,
                    &staff,
                    contact_made as i64,
                    &category,
                ),
            )
            .map(|_| true),
    };

    match result {
        Ok(created) => ok(
            &req.id,
            json!({ "created": created, "category": category, "date": date }),
        ),
        Err(e) => err(
            &req.id,
            "db_update_failed",
            e.to_string(),
            Some(json!({ "table": "attendance" })),
        ),
    }
}

// Manual correction path. A zero row count is a valid outcome ("nothing to
// update"), reported distinctly from a failure.
fn handle_correct_status(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let status = match required_status(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let date = match date_or_today(req, "date") {
        Ok(v) => v.to_string(),
        Err(resp) => return resp,
    };

    match conn.execute(
        "UPDATE attendance SET status = ? WHERE student_id = ? AND date = ?",
        (&status, &student_id, &date),
    ) {
        Ok(updated) => {
            if updated == 0 {
                log::info!(
                    "status correction for student {} on {}: no matching record",
                    student_id,
                    date
                );
            }
            ok(&req.id, json!({ "updated": updated, "date": date }))
        }
        Err(e) => err(
            &req.id,
            "db_update_failed",
            e.to_string(),
            Some(json!({ "table": "attendance" })),
        ),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "attendance.record" => Some(handle_record(state, req)),
        "attendance.justify" => Some(handle_justify(state, req)),
        "attendance.correctStatus" => Some(handle_correct_status(state, req)),
        _ => None,
    }
}
