use crate::identity;
use crate::ingest;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, required_str};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    let mut stmt = match conn.prepare(
        "SELECT id, display_name, guardian_name, guardian_phone
         FROM students
         ORDER BY canonical_key",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "displayName": r.get::<_, String>(1)?,
                "guardianName": r.get::<_, Option<String>>(2)?,
                "guardianPhone": r.get::<_, Option<String>>(3)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    match rows {
        Ok(students) => ok(&req.id, json!({ "students": students })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

// Sink for the scraper collaborator: it hands over a sorted list of display
// names (or fails upstream before this call is made). Only names whose
// canonical key is unseen become new identities.
fn handle_sync_names(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let Some(names) = req.params.get("names").and_then(|v| v.as_array()) else {
        return err(&req.id, "bad_params", "missing names", None);
    };

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };

    let mut inserted = 0usize;
    let mut total = 0usize;
    for value in names {
        let Some(name) = value.as_str().map(str::trim).filter(|s| !s.is_empty()) else {
            continue;
        };
        total += 1;
        let key = identity::canonical_key(name);
        match identity::find_by_key(&tx, &key) {
            Ok(Some(_)) => {}
            Ok(None) => match identity::resolve_or_create(&tx, name) {
                Ok(_) => inserted += 1,
                Err(e) => {
                    let _ = tx.rollback();
                    return err(&req.id, "db_insert_failed", e.to_string(), None);
                }
            },
            Err(e) => {
                let _ = tx.rollback();
                return err(&req.id, "db_query_failed", e.to_string(), None);
            }
        }
    }

    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }
    log::info!("roster sync: {} names received, {} new", total, inserted);
    ok(&req.id, json!({ "received": total, "inserted": inserted }))
}

// Roster spreadsheet import: creates identities on first sighting and
// overwrites guardian fields on re-import (later files win).
fn handle_import_sheet(state: &mut AppState, req: &Request) -> serde_json::Value {
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

    let mut inserted = 0usize;
    let mut updated = 0usize;
    let mut skipped = 0usize;
    let mut warnings: Vec<String> = Vec::new();

    for sheet in &sheets {
        let Some(table) = ingest::detect_table(sheet) else {
            warnings.push(format!("{}: no recognizable header row; sheet skipped", sheet.source));
            continue;
        };
        let (rows, mut clean_warnings) = ingest::clean_roster_rows(&table);
        warnings.append(&mut clean_warnings);

        let tx = match conn.unchecked_transaction() {
            Ok(t) => t,
            Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
        };

        let mut sheet_failed = false;
        for row in &rows {
            let existing = match identity::find_by_key(&tx, &identity::canonical_key(&row.name)) {
                Ok(v) => v,
                Err(e) => {
                    warnings.push(format!("{}: {:?}: {}", table.source, row.name, e));
                    skipped += 1;
                    continue;
                }
            };
            let (student_id, was_new) = match existing {
                Some(id) => (id, false),
                None => match identity::resolve_or_create(&tx, &row.name) {
                    Ok(id) => (id, true),
                    Err(e) => {
                        log::error!("{}: creating {:?} failed: {}", table.source, row.name, e);
                        sheet_failed = true;
                        break;
                    }
                },
            };

            if row.guardian_name.is_some() || row.guardian_phone.is_some() {
                let res = tx.execute(
                    "UPDATE students SET
                       guardian_name = COALESCE(?, guardian_name),
                       guardian_phone = COALESCE(?, guardian_phone)
                     WHERE id = ?",
                    (&row.guardian_name, &row.guardian_phone, &student_id),
                );
                match res {
                    Ok(_) if !was_new => updated += 1,
                    Ok(_) => {}
                    Err(e) => {
                        warnings.push(format!("{}: {:?}: {}", table.source, row.name, e));
                        skipped += 1;
                        continue;
                    }
                }
            }
            if was_new {
                inserted += 1;
            }
        }

        if sheet_failed {
            let _ = tx.rollback();
            warnings.push(format!("{}: sheet rolled back after a write failure", table.source));
            continue;
        }
        if let Err(e) = tx.commit() {
            return err(&req.id, "db_commit_failed", e.to_string(), None);
        }
    }

    for w in &warnings {
        log::warn!("roster import: {}", w);
    }
    ok(
        &req.id,
        json!({
            "inserted": inserted,
            "updated": updated,
            "skipped": skipped,
            "warnings": warnings,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(handle_students_list(state, req)),
        "roster.syncNames" => Some(handle_sync_names(state, req)),
        "roster.importSheet" => Some(handle_import_sheet(state, req)),
        _ => None,
    }
}
