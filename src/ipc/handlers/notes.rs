use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{date_or_today, db_conn, optional_str, required_str, student_exists};
use crate::ipc::types::{AppState, Request};
use chrono::Local;
use serde_json::json;
use uuid::Uuid;

fn handle_reminder_add(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let text = match required_str(req, "text") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let staff = optional_str(req, "staffName");

    if let Err(resp) = student_exists(conn, req, &student_id) {
        return resp;
    }

    let created_at = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    match conn.execute(
        "INSERT INTO reminders(id, student_id, created_at, text, staff_name)
         VALUES(?, ?, ?, ?, ?)",
        (
            Uuid::new_v4().to_string(),
            &student_id,
            &created_at,
            &text,
            &staff,
        ),
    ) {
        Ok(_) => ok(&req.id, json!({ "createdAt": created_at })),
        Err(e) => err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "reminders" })),
        ),
    }
}

fn handle_reminder_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let mut stmt = match conn.prepare(
        "SELECT created_at, text, staff_name, done
         FROM reminders
         WHERE student_id = ?
         ORDER BY created_at DESC",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([&student_id], |r| {
            Ok(json!({
                "createdAt": r.get::<_, String>(0)?,
                "text": r.get::<_, String>(1)?,
                "staffName": r.get::<_, Option<String>>(2)?,
                "done": r.get::<_, i64>(3)? != 0,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    match rows {
        Ok(reminders) => ok(&req.id, json!({ "reminders": reminders })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_behavior_add(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let text = match required_str(req, "text") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let kind = match required_str(req, "kind") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let date = match date_or_today(req, "date") {
        Ok(v) => v.to_string(),
        Err(resp) => return resp,
    };
    let staff = optional_str(req, "staffName");

    if let Err(resp) = student_exists(conn, req, &student_id) {
        return resp;
    }

    match conn.execute(
        "INSERT INTO behavior_notes(id, student_id, date, text, kind, staff_name)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            Uuid::new_v4().to_string(),
            &student_id,
            &date,
            &text,
            &kind,
            &staff,
        ),
    ) {
        Ok(_) => ok(&req.id, json!({ "date": date })),
        Err(e) => err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "behavior_notes" })),
        ),
    }
}

fn handle_behavior_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let mut stmt = match conn.prepare(
        "SELECT date, text, kind, staff_name
         FROM behavior_notes
         WHERE student_id = ?
         ORDER BY date DESC, rowid DESC",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([&student_id], |r| {
            Ok(json!({
                "date": r.get::<_, String>(0)?,
                "text": r.get::<_, String>(1)?,
                "kind": r.get::<_, String>(2)?,
                "staffName": r.get::<_, Option<String>>(3)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    match rows {
        Ok(notes) => ok(&req.id, json!({ "notes": notes })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reminders.add" => Some(handle_reminder_add(state, req)),
        "reminders.list" => Some(handle_reminder_list(state, req)),
        "behavior.add" => Some(handle_behavior_add(state, req)),
        "behavior.list" => Some(handle_behavior_list(state, req)),
        _ => None,
    }
}
