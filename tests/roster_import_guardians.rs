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

// Roster imports create identities and later files overwrite guardian info;
// the scraper may have seen the student first with different casing.
#[test]
fn roster_reimport_overwrites_guardians_without_duplicating() {
    let workspace = temp_dir("chamadad-roster-guardians");
    let first_sheet = workspace.join("alunos-v1.csv");
    let second_sheet = workspace.join("alunos-v2.csv");
    std::fs::write(
        &first_sheet,
        "NOME;RESPONSAVEL;TELEFONE\n\
         Ana Carolina;Marta Carolina;+5511999990000\n\
         Bruno Lima;Pedro Lima;+5511999991111\n",
    )
    .expect("write roster v1");
    std::fs::write(
        &second_sheet,
        "ALUNO;NOME DO RESPONSAVEL;TELEFONE RESPONSAVEL\n\
         ANA CAROLINA;Marta Carolina;+5511888880000\n",
    )
    .expect("write roster v2");

    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    // The scraper saw Ana first, without guardian data.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "roster.syncNames",
        json!({ "names": ["ana carolina"] }),
    );

    let first = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "roster.importSheet",
        json!({ "path": first_sheet.to_string_lossy() }),
    );
    assert_eq!(first.get("inserted").and_then(|v| v.as_u64()), Some(1));

    let second = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "roster.importSheet",
        json!({ "path": second_sheet.to_string_lossy() }),
    );
    assert_eq!(second.get("inserted").and_then(|v| v.as_u64()), Some(0));
    assert_eq!(second.get("updated").and_then(|v| v.as_u64()), Some(1));

    let students = request_ok(&mut stdin, &mut reader, "5", "students.list", json!({}));
    let rows = students
        .get("students")
        .and_then(|v| v.as_array())
        .expect("students array");
    assert_eq!(rows.len(), 2, "re-import must not create duplicates");

    let ana = rows
        .iter()
        .find(|s| {
            s.get("displayName")
                .and_then(|v| v.as_str())
                .map(|n| n.eq_ignore_ascii_case("ana carolina"))
                .unwrap_or(false)
        })
        .expect("Ana row");
    assert_eq!(
        ana.get("guardianPhone").and_then(|v| v.as_str()),
        Some("+5511888880000"),
        "later roster file wins on guardian fields"
    );
    assert_eq!(
        ana.get("guardianName").and_then(|v| v.as_str()),
        Some("Marta Carolina")
    );
}
