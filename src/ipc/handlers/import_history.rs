use crate::classify;
use crate::identity;
use crate::ingest;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, required_str};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension, Transaction};
use serde_json::json;
use std::collections::HashMap;
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Default)]
struct ImportCounts {
    inserted: usize,
    updated: usize,
    skipped: usize,
}

// Historical sheets record absences only, so every surviving row lands as a
// 'faltou' record. Reconciliation is attendance-only: a name with no known
// identity is a warning, never a fresh student row; only the roster paths
// create identities.
fn handle_import_sheet(state: &mut AppState, req: &Request) -> serde_json::Value {
    let categories = state.categories.clone();
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let path = match required_str(req, "path") {
        Ok(p) => PathBuf::from(p),
        Err(resp) => return resp,
    };

    let sheets = match ingest::load_source(&path) {
        Ok(s) => s,
        Err(e) => {
            return err(
                &req.id,
                "source_unreadable",
                e.to_string(),
                Some(json!({ "path": path.to_string_lossy() })),
            )
        }
    };

    let known = match load_known_identities(conn) {
        Ok(map) => map,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let mut counts = ImportCounts::default();
    let mut warnings: Vec<String> = Vec::new();

    for sheet in &sheets {
        let Some(table) = ingest::detect_table(sheet) else {
            warnings.push(format!(
                "{}: no recognizable header row; sheet skipped",
                sheet.source
            ));
            continue;
        };
        let (rows, mut clean_warnings) = ingest::clean_attendance_rows(&table);
        warnings.append(&mut clean_warnings);
        if rows.is_empty() {
            continue;
        }

        // One transaction per sheet: a hard error rolls this sheet back
        // without touching sheets already committed.
        let tx = match conn.unchecked_transaction() {
            Ok(t) => t,
            Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
        };

        let mut sheet_error: Option<String> = None;
        for row in &rows {
            let key = identity::canonical_key(&row.name);
            let Some(student_id) = known.get(&key) else {
                log::warn!(
                    "{}: {:?} not found in the roster; row skipped",
                    table.source,
                    row.name
                );
                warnings.push(format!(
                    "{}: {:?} not found in the roster; row skipped",
                    table.source, row.name
                ));
                counts.skipped += 1;
                continue;
            };

            match upsert_absence(&tx, student_id, row, &categories) {
                Ok(true) => counts.inserted += 1,
                Ok(false) => counts.updated += 1,
                Err(e) => {
                    sheet_error = Some(format!("{}: {:?}: {}", table.source, row.name, e));
                    break;
                }
            }
        }

        if let Some(message) = sheet_error {
            let _ = tx.rollback();
            log::error!("history import: {}; sheet rolled back", message);
            warnings.push(format!("{}; sheet rolled back", message));
            continue;
        }
        if let Err(e) = tx.commit() {
            return err(&req.id, "db_commit_failed", e.to_string(), None);
        }
        log::info!("history import: committed {}", table.source);
    }

    ok(
        &req.id,
        json!({
            "inserted": counts.inserted,
            "updated": counts.updated,
            "skipped": counts.skipped,
            "warnings": warnings,
        }),
    )
}

fn load_known_identities(conn: &Connection) -> anyhow::Result<HashMap<String, String>> {
    let mut stmt = conn.prepare("SELECT canonical_key, id FROM students")?;
    let map = stmt
        .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))?
        .collect::<Result<HashMap<_, _>, _>>()?;
    Ok(map)
}

// Update-if-exists on the natural key: re-running an import never
// duplicates rows, and the latest file wins.
fn upsert_absence(
    tx: &Transaction,
    student_id: &str,
    row: &ingest::AttendanceRow,
    categories: &classify::CategoryConfig,
) -> anyhow::Result<bool> {
    let date = row.date.to_string();
    let category = classify::classify_justification(Some(&row.justification), categories);

    let existing: Option<String> = tx
        .query_row(
            "SELECT id FROM attendance WHERE student_id = ? AND date = ? AND slot = ''",
            (student_id, &date),
            |r| r.get(0),
        )
        .optional()?;

    match existing {
        Some(id) => {
            tx.execute(
                "UPDATE attendance SET
                   status = 'faltou',
                   justification = ?,
                   staff_name = ?,
                   category = ?
                 WHERE id = ?",
                (&row.justification, &row.staff, &category, &id),
            )?;
            Ok(false)
        }
        None => {
            tx.execute(
                "INSERT INTO attendance(id, student_id, date, status, justification, staff_name, category)
                 VALUES(?, ?, ?, 'faltou', ?, ?, ?)",
                (
                    Uuid::new_v4().to_string(),
                    student_id,
                    &date,
                    &row.justification,
                    &row.staff,
                    &category,
                ),
            )?;
            Ok(true)
        }
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "history.importSheet" => Some(handle_import_sheet(state, req)),
        _ => None,
    }
}
