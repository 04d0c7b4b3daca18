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

fn spawn_daemon() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_schoolrecd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn schoolrecd");
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

fn error_code(value: &serde_json::Value) -> Option<&str> {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
}

#[test]
fn router_covers_every_entity_family() {
    let workspace = temp_dir("schoolrec-smoke");
    let (mut child, mut stdin, mut reader) = spawn_daemon();

    let health = request(&mut stdin, &mut reader, "1", "health", json!({}));
    assert_eq!(health["ok"], true);
    assert!(health["result"]["version"].is_string());

    // Entity methods refuse to run before a workspace is selected.
    let early = request(&mut stdin, &mut reader, "2", "students.list", json!({}));
    assert_eq!(error_code(&early), Some("no_workspace"));

    let selected = request(
        &mut stdin,
        &mut reader,
        "3",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    assert_eq!(selected["ok"], true);
    assert_eq!(selected["result"]["seeded"], false);

    let families = [
        "classTypes.list",
        "classes.list",
        "positions.list",
        "employees.list",
        "subjects.list",
        "schedules.list",
        "students.list",
    ];
    for (i, method) in families.iter().enumerate() {
        let resp = request(
            &mut stdin,
            &mut reader,
            &format!("list-{}", i),
            method,
            json!({}),
        );
        assert_eq!(resp["ok"], true, "{} failed: {}", method, resp);
        assert_eq!(resp["result"]["page"]["total"], 0);
        assert_eq!(resp["result"]["sort"]["current"], "no");
    }

    let unknown = request(&mut stdin, &mut reader, "zz", "classes.rename", json!({}));
    assert_eq!(error_code(&unknown), Some("not_implemented"));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn filters_sent_before_workspace_selection_are_not_retained() {
    let workspace = temp_dir("schoolrec-early-filter");
    let (mut child, mut stdin, mut reader) = spawn_daemon();

    let early = request(
        &mut stdin,
        &mut reader,
        "1",
        "students.list",
        json!({ "filter": { "subjectName": "Физика" }}),
    );
    assert_eq!(error_code(&early), Some("no_workspace"));

    request(
        &mut stdin,
        &mut reader,
        "2",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    // The rejected filter must not resurface on the first real list call.
    let listed = request(&mut stdin, &mut reader, "3", "students.list", json!({}));
    assert_eq!(listed["ok"], true);
    assert_eq!(listed["result"]["filter"], json!({}));

    drop(stdin);
    let _ = child.wait();
}
