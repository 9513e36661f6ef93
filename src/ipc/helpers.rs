use chrono::{Local, NaiveDate};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

use super::error::err;
use super::types::{AppState, Request};

pub fn required_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.to_string())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

pub fn optional_str(req: &Request, key: &str) -> Option<String> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

pub fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

/// Reads an ISO date param, defaulting to today when absent. A present but
/// malformed value is a bad_params error, never silently today.
pub fn date_or_today(req: &Request, key: &str) -> Result<NaiveDate, serde_json::Value> {
    match req.params.get(key).and_then(|v| v.as_str()) {
        None => Ok(Local::now().date_naive()),
        Some(raw) => NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| {
            err(
                &req.id,
                "bad_params",
                format!("{} must be yyyy-mm-dd", key),
                Some(json!({ "value": raw })),
            )
        }),
    }
}

pub fn student_exists(
    conn: &Connection,
    req: &Request,
    student_id: &str,
) -> Result<(), serde_json::Value> {
    let found = conn
        .query_row("SELECT 1 FROM students WHERE id = ?", [student_id], |r| {
            r.get::<_, i64>(0)
        })
        .optional()
        .map_err(|e| err(&req.id, "db_query_failed", e.to_string(), None))?
        .is_some();
    if found {
        Ok(())
    } else {
        Err(err(&req.id, "not_found", "student not found", None))
    }
}
