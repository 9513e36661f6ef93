use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

/// Canonical lookup key for a student name: trimmed, upper-cased, internal
/// whitespace runs collapsed to single spaces. This is the sole dedup
/// mechanism across the scraper, spreadsheet imports, and manual entry.
pub fn canonical_key(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}

pub fn find_by_key(conn: &Connection, key: &str) -> anyhow::Result<Option<String>> {
    let id = conn
        .query_row("SELECT id FROM students WHERE canonical_key = ?", [key], |r| {
            r.get::<_, String>(0)
        })
        .optional()?;
    Ok(id)
}

/// Returns the id of the student this name resolves to, creating the row on
/// first sighting. The display name keeps the caller's casing; only the key
/// is normalized. Callers reject empty names before getting here.
pub fn resolve_or_create(conn: &Connection, raw_name: &str) -> anyhow::Result<String> {
    let key = canonical_key(raw_name);
    if let Some(id) = find_by_key(conn, &key)? {
        return Ok(id);
    }
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO students(id, display_name, canonical_key) VALUES(?, ?, ?)",
        (&id, raw_name.trim(), &key),
    )?;
    Ok(id)
}
