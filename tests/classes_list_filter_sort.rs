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

fn spawn_daemon_paged(page_size: &str) -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_schoolrecd");
    let mut child = Command::new(exe)
        .env("SCHOOLRECD_PAGE_SIZE", page_size)
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
    let payload = json!({ "id": id, "method": method, "params": params });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
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
    assert_eq!(value["ok"], true, "{} failed: {}", method, value);
    value["result"].clone()
}

fn class_names(result: &serde_json::Value) -> Vec<String> {
    result["classes"]
        .as_array()
        .expect("classes array")
        .iter()
        .map(|c| c["name"].as_str().expect("class name").to_string())
        .collect()
}

fn seed_classes(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>) {
    for (i, (name, description)) in [
        ("Основной", "Общеобразовательный класс"),
        ("Профильный", "Класс с углублённым изучением предметов"),
    ]
    .iter()
    .enumerate()
    {
        request_ok(
            stdin,
            reader,
            &format!("ct{}", i),
            "classTypes.create",
            json!({ "classType": { "name": name, "description": description }}),
        );
    }
    for (i, (name, class_type_id, student_count, year_created)) in [
        ("9А", 1, 25, 2016),
        ("9Б", 1, 22, 2016),
        ("10А", 2, 20, 2015),
        ("11В", 2, 18, 2014),
    ]
    .iter()
    .enumerate()
    {
        request_ok(
            stdin,
            reader,
            &format!("c{}", i),
            "classes.create",
            json!({ "class": {
                "name": name,
                "classTeacher": "Смирнова",
                "classTypeId": class_type_id,
                "studentCount": student_count,
                "yearCreated": year_created
            }}),
        );
    }
}

#[test]
fn filters_narrow_the_class_list() {
    let workspace = temp_dir("schoolrec-classes-filter");
    let (mut child, mut stdin, mut reader) = spawn_daemon_paged("10");
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    seed_classes(&mut stdin, &mut reader);

    let by_name = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "classes.list",
        json!({ "filter": { "className": "9" }}),
    );
    assert_eq!(by_name["page"]["total"], 2);
    assert!(class_names(&by_name).iter().all(|n| n.contains('9')));

    let by_year = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "classes.list",
        json!({ "filter": { "yearCreated": "2015" }}),
    );
    assert_eq!(by_year["page"]["total"], 1);
    assert_eq!(class_names(&by_year), vec!["10А"]);

    let by_type = request_ok(
        &mut stdin,
        &mut reader,
        "12",
        "classes.list",
        json!({ "filter": { "classTypeName": "Профильный" }}),
    );
    assert_eq!(by_type["page"]["total"], 2);
    assert_eq!(
        by_type["classTypeNames"],
        json!(["Основной", "Профильный"])
    );

    let combined = request_ok(
        &mut stdin,
        &mut reader,
        "13",
        "classes.list",
        json!({ "filter": { "classTypeName": "Профильный", "studentCount": "18" }}),
    );
    assert_eq!(combined["page"]["total"], 1);
    assert_eq!(class_names(&combined), vec!["11В"]);

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn sort_orders_rows_and_reports_toggles() {
    let workspace = temp_dir("schoolrec-classes-sort");
    let (mut child, mut stdin, mut reader) = spawn_daemon_paged("10");
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    seed_classes(&mut stdin, &mut reader);

    let asc = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "classes.list",
        json!({ "sort": "classNameAsc" }),
    );
    let mut expected = class_names(&asc);
    expected.reverse();
    assert_eq!(asc["sort"]["current"], "classNameAsc");
    assert_eq!(asc["sort"]["classNameSort"], "classNameDesc");

    let desc = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "classes.list",
        json!({ "sort": "classNameDesc" }),
    );
    assert_eq!(class_names(&desc), expected);
    assert_eq!(desc["sort"]["classNameSort"], "classNameAsc");

    let by_year = request_ok(
        &mut stdin,
        &mut reader,
        "12",
        "classes.list",
        json!({ "sort": "yearCreatedAsc" }),
    );
    let years: Vec<i64> = by_year["classes"]
        .as_array()
        .expect("classes array")
        .iter()
        .map(|c| c["yearCreated"].as_i64().expect("year"))
        .collect();
    let mut sorted = years.clone();
    sorted.sort();
    assert_eq!(years, sorted);

    // A sort string the screen never produces falls back to insertion order.
    let unknown = request_ok(
        &mut stdin,
        &mut reader,
        "13",
        "classes.list",
        json!({ "sort": "salaryAsc" }),
    );
    assert_eq!(unknown["sort"]["current"], "no");
    assert_eq!(class_names(&unknown), vec!["9А", "9Б", "10А", "11В"]);

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn paging_splits_rows_by_configured_page_size() {
    let workspace = temp_dir("schoolrec-classes-page");
    let (mut child, mut stdin, mut reader) = spawn_daemon_paged("3");
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    seed_classes(&mut stdin, &mut reader);

    let first = request_ok(&mut stdin, &mut reader, "10", "classes.list", json!({}));
    assert_eq!(first["page"]["total"], 4);
    assert_eq!(first["page"]["pageSize"], 3);
    assert_eq!(first["page"]["totalPages"], 2);
    assert_eq!(first["page"]["page"], 1);
    assert_eq!(class_names(&first).len(), 3);

    let second = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "classes.list",
        json!({ "page": 2 }),
    );
    assert_eq!(second["page"]["page"], 2);
    assert_eq!(class_names(&second).len(), 1);

    // Page numbers below one clamp to the first page.
    let clamped = request_ok(
        &mut stdin,
        &mut reader,
        "12",
        "classes.list",
        json!({ "page": 0 }),
    );
    assert_eq!(clamped["page"]["page"], 1);
    assert_eq!(class_names(&clamped), class_names(&first));

    drop(stdin);
    let _ = child.wait();
}
