use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{date_or_today, db_conn, required_str};
use crate::ipc::types::{AppState, Request};
use crate::report;
use chrono::NaiveDate;
use rusqlite::{params_from_iter, types::Value, Connection};
use serde_json::json;

struct JoinedCall {
    id: String,
    student_id: String,
    student_name: String,
    guardian_name: Option<String>,
    guardian_phone: Option<String>,
    date: String,
    slot: String,
    status: String,
    justification: Option<String>,
    staff_name: Option<String>,
    contact_made: bool,
    category: Option<String>,
}

fn fetch_all_calls(conn: &Connection) -> rusqlite::Result<Vec<JoinedCall>> {
    let mut stmt = conn.prepare(
        "SELECT c.id, c.student_id, a.display_name, a.guardian_name, a.guardian_phone,
                c.date, c.slot, c.status, c.justification, c.staff_name, c.contact_made, c.category
         FROM attendance c
         JOIN students a ON c.student_id = a.id
         ORDER BY c.date DESC, a.canonical_key, c.slot",
    )?;
    stmt.query_map([], |r| {
        Ok(JoinedCall {
            id: r.get(0)?,
            student_id: r.get(1)?,
            student_name: r.get(2)?,
            guardian_name: r.get(3)?,
            guardian_phone: r.get(4)?,
            date: r.get(5)?,
            slot: r.get(6)?,
            status: r.get(7)?,
            justification: r.get(8)?,
            staff_name: r.get(9)?,
            contact_made: r.get::<_, i64>(10)? != 0,
            category: r.get(11)?,
        })
    })
    .and_then(|it| it.collect())
}

fn call_json(c: &JoinedCall) -> serde_json::Value {
    json!({
        "id": c.id,
        "studentId": c.student_id,
        "studentName": c.student_name,
        "guardianName": c.guardian_name,
        "guardianPhone": c.guardian_phone,
        "date": c.date,
        "slot": c.slot,
        "status": c.status,
        "justification": c.justification,
        "staffName": c.staff_name,
        "contactMade": c.contact_made,
        "category": c.category,
    })
}

// Rows whose stored date no longer parses are dropped from aggregation, the
// same way the original coerced-then-dropped.
fn to_report_rows(calls: &[JoinedCall]) -> Vec<report::CallRow> {
    calls
        .iter()
        .filter_map(|c| {
            let date = NaiveDate::parse_from_str(&c.date, "%Y-%m-%d").ok()?;
            Some(report::CallRow {
                student_name: c.student_name.clone(),
                date,
                status: c.status.clone(),
                staff_name: c.staff_name.clone(),
                contact_made: c.contact_made,
                category: c.category.clone(),
            })
        })
        .collect()
}

// The report-writer sink: everything, joined, newest first. Formatting and
// file export happen outside the daemon.
fn handle_all_calls(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    match fetch_all_calls(conn) {
        Ok(calls) => ok(
            &req.id,
            json!({ "calls": calls.iter().map(call_json).collect::<Vec<_>>() }),
        ),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_absences_by_period(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let start = match required_str(req, "start") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let end = match required_str(req, "end") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let categories: Vec<String> = req
        .params
        .get("categories")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    let mut sql = String::from(
        "SELECT c.id, c.student_id, a.display_name, a.guardian_name, a.guardian_phone,
                c.date, c.slot, c.status, c.justification, c.staff_name, c.contact_made, c.category
         FROM attendance c
         JOIN students a ON c.student_id = a.id
         WHERE c.date BETWEEN ? AND ? AND c.status = 'faltou'",
    );
    let mut params: Vec<Value> = vec![Value::Text(start), Value::Text(end)];
    if !categories.is_empty() {
        let placeholders = vec!["?"; categories.len()].join(", ");
        sql.push_str(&format!(" AND c.category IN ({})", placeholders));
        params.extend(categories.into_iter().map(Value::Text));
    }
    sql.push_str(" ORDER BY c.date DESC, a.canonical_key");

    let mut stmt = match conn.prepare(&sql) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map(params_from_iter(params), |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "studentId": r.get::<_, String>(1)?,
                "studentName": r.get::<_, String>(2)?,
                "guardianName": r.get::<_, Option<String>>(3)?,
                "guardianPhone": r.get::<_, Option<String>>(4)?,
                "date": r.get::<_, String>(5)?,
                "slot": r.get::<_, String>(6)?,
                "status": r.get::<_, String>(7)?,
                "justification": r.get::<_, Option<String>>(8)?,
                "staffName": r.get::<_, Option<String>>(9)?,
                "contactMade": r.get::<_, i64>(10)? != 0,
                "category": r.get::<_, Option<String>>(11)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    match rows {
        Ok(absences) => ok(&req.id, json!({ "absences": absences })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_ranking(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let calls = match fetch_all_calls(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let ranking: Vec<serde_json::Value> = report::absence_ranking(&to_report_rows(&calls))
        .into_iter()
        .map(|(name, n)| json!({ "studentName": name, "absences": n }))
        .collect();
    ok(&req.id, json!({ "ranking": ranking }))
}

fn handle_monthly(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let calls = match fetch_all_calls(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let months: Vec<serde_json::Value> = report::absences_by_month(&to_report_rows(&calls))
        .into_iter()
        .map(|(month, n)| json!({ "month": month, "absences": n }))
        .collect();
    ok(&req.id, json!({ "months": months }))
}

fn handle_summary(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let calls = match fetch_all_calls(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let summary = report::absence_summary(&to_report_rows(&calls));
    ok(
        &req.id,
        json!({
            "byCategory": summary.by_category.iter()
                .map(|(c, n)| json!({ "category": c, "absences": n }))
                .collect::<Vec<_>>(),
            "byStaff": summary.by_staff.iter()
                .map(|(s, n)| json!({ "staffName": s, "absences": n }))
                .collect::<Vec<_>>(),
            "contacted": summary.contacted,
            "notContacted": summary.not_contacted,
        }),
    )
}

fn handle_patterns(state: &mut AppState, req: &Request) -> serde_json::Value {
    let today = match date_or_today(req, "today") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let calls = match fetch_all_calls(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let alerts: Vec<serde_json::Value> =
        report::detect_absence_patterns(&to_report_rows(&calls), today)
            .into_iter()
            .map(|a| json!({ "studentName": a.student_name, "alert": a.message }))
            .collect();
    ok(&req.id, json!({ "alerts": alerts }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reports.allCalls" => Some(handle_all_calls(state, req)),
        "reports.absencesByPeriod" => Some(handle_absences_by_period(state, req)),
        "reports.ranking" => Some(handle_ranking(state, req)),
        "reports.monthly" => Some(handle_monthly(state, req)),
        "reports.summary" => Some(handle_summary(state, req)),
        "reports.patterns" => Some(handle_patterns(state, req)),
        _ => None,
    }
}
