use chrono::Local;
use rusqlite::Connection;
use std::path::Path;
use uuid::Uuid;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("escola.sqlite3");
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;
    // Serialized writers + readers-don't-block-writers; the app layer does
    // no locking of its own.
    conn.pragma_update(None, "journal_mode", "WAL")?;

    create_schema(&conn)?;

    Ok(conn)
}

/// Idempotent structural setup. Safe to run on every process start.
pub fn create_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            display_name TEXT NOT NULL,
            canonical_key TEXT NOT NULL UNIQUE,
            guardian_name TEXT,
            guardian_phone TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            date TEXT NOT NULL,
            slot TEXT NOT NULL DEFAULT '',
            status TEXT NOT NULL,
            justification TEXT,
            staff_name TEXT,
            contact_made INTEGER NOT NULL DEFAULT 0,
            category TEXT,
            FOREIGN KEY(student_id) REFERENCES students(id),
            UNIQUE(student_id, date, slot)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_student ON attendance(student_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_date ON attendance(date)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS reminders(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            created_at TEXT NOT NULL,
            text TEXT NOT NULL,
            staff_name TEXT,
            done INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_reminders_student ON reminders(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS behavior_notes(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            date TEXT NOT NULL,
            text TEXT NOT NULL,
            kind TEXT NOT NULL,
            staff_name TEXT,
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_behavior_notes_student ON behavior_notes(student_id)",
        [],
    )?;

    Ok(())
}

const DEMO_STUDENTS: [(&str, &str, &str); 3] = [
    ("Alessandro Silva de Castro", "Responsável 1", "+5511999999999"),
    ("Ana Carolina Ferreira da Paz", "Responsável 2", "+5511888888888"),
    ("Danielly Pereira da Silva", "Responsável 3", "+5511777777777"),
];

/// Seeds a small fixed roster plus one day of calls so a fresh install has
/// something to show. Skipped entirely once real data exists; requested
/// explicitly by the UI's first-run bootstrap, not on every open.
pub fn seed_demo_data(conn: &Connection) -> anyhow::Result<()> {
    let students: i64 = conn.query_row("SELECT COUNT(*) FROM students", [], |r| r.get(0))?;
    if students == 0 {
        for (name, guardian, phone) in DEMO_STUDENTS {
            conn.execute(
                "INSERT OR IGNORE INTO students(id, display_name, canonical_key, guardian_name, guardian_phone)
                 VALUES(?, ?, ?, ?, ?)",
                (
                    Uuid::new_v4().to_string(),
                    name,
                    crate::identity::canonical_key(name),
                    guardian,
                    phone,
                ),
            )?;
        }
        log::info!("seeded {} demo students", DEMO_STUDENTS.len());
    }

    let mut seeded_ids: Vec<String> = Vec::new();
    for (name, _, _) in DEMO_STUDENTS {
        let key = crate::identity::canonical_key(name);
        if let Some(id) = crate::identity::find_by_key(conn, &key)? {
            seeded_ids.push(id);
        }
    }
    if seeded_ids.len() < 2 {
        return Ok(());
    }

    let calls: i64 = conn.query_row(
        "SELECT COUNT(*) FROM attendance WHERE student_id IN (?, ?)",
        (&seeded_ids[0], &seeded_ids[1]),
        |r| r.get(0),
    )?;
    if calls == 0 {
        let today = Local::now().date_naive().to_string();
        conn.execute(
            "INSERT INTO attendance(id, student_id, date, status, staff_name)
             VALUES(?, ?, ?, 'presente', 'Professor Teste')",
            (Uuid::new_v4().to_string(), &seeded_ids[0], &today),
        )?;
        conn.execute(
            "INSERT INTO attendance(id, student_id, date, status, staff_name)
             VALUES(?, ?, ?, 'faltou', 'Professor Teste')",
            (Uuid::new_v4().to_string(), &seeded_ids[1], &today),
        )?;
        log::info!("seeded demo attendance for {}", today);
    }

    Ok(())
}
