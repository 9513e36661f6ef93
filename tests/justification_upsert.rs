use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_chamadad");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn chamadad");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

// A justification filed before any call was taken must create the absence
// record itself; filing again for the same day updates it in place.
#[test]
fn justifying_without_a_call_creates_then_updates_one_record() {
    let workspace = temp_dir("chamadad-justify-upsert");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "config.setCategories",
        json!({ "categories": [
            { "name": "Saude", "keywords": ["médico", "hospital"] },
            { "name": "Transporte", "keywords": ["ônibus"] }
        ]}),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "roster.syncNames",
        json!({ "names": ["Ana Carolina"] }),
    );
    let students = request_ok(&mut stdin, &mut reader, "4", "students.list", json!({}));
    let student_id = students
        .get("students")
        .and_then(|v| v.as_array())
        .and_then(|arr| arr.first())
        .and_then(|s| s.get("id"))
        .and_then(|v| v.as_str())
        .expect("student id")
        .to_string();

    let first = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "attendance.justify",
        json!({
            "studentId": student_id,
            "date": "2024-03-04",
            "justification": "Foi ao médico",
            "staffName": "Carlos"
        }),
    );
    assert_eq!(first.get("created").and_then(|v| v.as_bool()), Some(true));
    assert_eq!(first.get("category").and_then(|v| v.as_str()), Some("Saude"));

    let second = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "attendance.justify",
        json!({
            "studentId": student_id,
            "date": "2024-03-04",
            "justification": "perdeu o ônibus",
            "staffName": "Marta",
            "contactMade": true
        }),
    );
    assert_eq!(second.get("created").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(
        second.get("category").and_then(|v| v.as_str()),
        Some("Transporte")
    );

    let calls = request_ok(&mut stdin, &mut reader, "7", "reports.allCalls", json!({}));
    let rows = calls
        .get("calls")
        .and_then(|v| v.as_array())
        .expect("calls array");
    assert_eq!(rows.len(), 1, "second justify must not duplicate the record");

    let row = &rows[0];
    assert_eq!(row.get("status").and_then(|v| v.as_str()), Some("faltou"));
    assert_eq!(
        row.get("justification").and_then(|v| v.as_str()),
        Some("perdeu o ônibus")
    );
    assert_eq!(row.get("staffName").and_then(|v| v.as_str()), Some("Marta"));
    assert_eq!(row.get("contactMade").and_then(|v| v.as_bool()), Some(true));
    assert_eq!(
        row.get("category").and_then(|v| v.as_str()),
        Some("Transporte")
    );
}

// Category text that matches nothing still classifies, to "Outros".
#[test]
fn unmatched_justification_lands_in_outros() {
    let workspace = temp_dir("chamadad-justify-outros");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "config.setCategories",
        json!({ "categories": [{ "name": "Saude", "keywords": ["médico"] }] }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "roster.syncNames",
        json!({ "names": ["Bruno Lima"] }),
    );
    let students = request_ok(&mut stdin, &mut reader, "4", "students.list", json!({}));
    let student_id = students
        .get("students")
        .and_then(|v| v.as_array())
        .and_then(|arr| arr.first())
        .and_then(|s| s.get("id"))
        .and_then(|v| v.as_str())
        .expect("student id")
        .to_string();

    let resp = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "attendance.justify",
        json!({
            "studentId": student_id,
            "date": "2024-03-04",
            "justification": "motivo desconhecido"
        }),
    );
    assert_eq!(resp.get("category").and_then(|v| v.as_str()), Some("Outros"));
}
