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

fn student_body(first_name: &str, dob: &str, class_id: serde_json::Value) -> serde_json::Value {
    json!({
        "firstName": first_name,
        "lastName": "Иванов",
        "middleName": "Петрович",
        "dateOfBirth": dob,
        "gender": "Мужской",
        "address": "ул. Школьная, д. 1",
        "fatherFirstName": "Пётр",
        "fatherLastName": "Иванов",
        "fatherMiddleName": "Сергеевич",
        "motherFirstName": "Елена",
        "motherLastName": "Иванова",
        "motherMiddleName": "Андреевна",
        "classId": class_id
    })
}

fn first_names(result: &serde_json::Value) -> Vec<String> {
    result["students"]
        .as_array()
        .expect("students array")
        .iter()
        .map(|s| s["firstName"].as_str().expect("first name").to_string())
        .collect()
}

/// Two classes, one of which teaches physics. Students relate to subjects
/// only through their class's schedules, so the subjectName filter has to
/// walk class -> schedules -> subject.
fn seed_school(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>) {
    request_ok(
        stdin,
        reader,
        "s1",
        "classTypes.create",
        json!({ "classType": { "name": "Старший", "description": "Старшие классы" }}),
    );
    for (i, name) in ["9А", "9Б"].iter().enumerate() {
        request_ok(
            stdin,
            reader,
            &format!("s-class-{}", i),
            "classes.create",
            json!({ "class": {
                "name": name,
                "classTeacher": "Смирнова",
                "classTypeId": 1,
                "studentCount": 20,
                "yearCreated": 2016
            }}),
        );
    }
    request_ok(
        stdin,
        reader,
        "s2",
        "positions.create",
        json!({ "position": { "name": "Учитель", "description": "Предметник", "salary": 50000 }}),
    );
    request_ok(
        stdin,
        reader,
        "s3",
        "employees.create",
        json!({ "employee": {
            "firstName": "Андрей",
            "lastName": "Ковалев",
            "middleName": "Андреевич",
            "positionId": 1
        }}),
    );
    for (i, name) in ["Физика", "История"].iter().enumerate() {
        request_ok(
            stdin,
            reader,
            &format!("s-subj-{}", i),
            "subjects.create",
            json!({ "subject": { "name": name, "employeeId": 1 }}),
        );
    }
    // Class 9А (id 1) has a physics lesson; 9Б (id 2) only history.
    for (i, (class_id, subject_id)) in [(1, 1), (2, 2)].iter().enumerate() {
        request_ok(
            stdin,
            reader,
            &format!("s-sched-{}", i),
            "schedules.create",
            json!({ "schedule": {
                "date": "2026-09-01",
                "dayOfWeek": "Вторник",
                "classId": class_id,
                "subjectId": subject_id,
                "startTime": "08:00",
                "endTime": "08:45"
            }}),
        );
    }
    for (i, (name, dob, class_id)) in [
        ("Иван", "2010-03-14", json!(1)),
        ("Дмитрий", "2010-03-14", json!(1)),
        ("Алексей", "2011-07-02", json!(2)),
        ("Сергей", "2011-07-02", json!(null)),
    ]
    .iter()
    .enumerate()
    {
        request_ok(
            stdin,
            reader,
            &format!("s-stud-{}", i),
            "students.create",
            json!({ "student": student_body(name, dob, class_id.clone()) }),
        );
    }
}

#[test]
fn subject_filter_walks_class_schedules() {
    let workspace = temp_dir("schoolrec-students-subject");
    let (mut child, mut stdin, mut reader) = spawn_daemon();
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    seed_school(&mut stdin, &mut reader);

    let physics = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "students.list",
        json!({ "filter": { "subjectName": "Физика" }}),
    );
    assert_eq!(physics["page"]["total"], 2);
    assert_eq!(first_names(&physics), vec!["Иван", "Дмитрий"]);
    assert!(physics["students"]
        .as_array()
        .expect("students array")
        .iter()
        .all(|s| s["className"] == "9А"));

    let history = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "students.list",
        json!({ "filter": { "subjectName": "История" }}),
    );
    assert_eq!(first_names(&history), vec!["Алексей"]);

    // A student with no class matches no subject at all.
    let nothing = request_ok(
        &mut stdin,
        &mut reader,
        "12",
        "students.list",
        json!({ "filter": { "subjectName": "Химия" }}),
    );
    assert_eq!(nothing["page"]["total"], 0);

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn date_of_birth_filters_by_exact_day() {
    let workspace = temp_dir("schoolrec-students-dob");
    let (mut child, mut stdin, mut reader) = spawn_daemon();
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    seed_school(&mut stdin, &mut reader);

    let matched = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "students.list",
        json!({ "filter": { "dateOfBirth": "2011-07-02" }}),
    );
    assert_eq!(matched["page"]["total"], 2);
    assert_eq!(first_names(&matched), vec!["Алексей", "Сергей"]);

    // Unparseable dates drop out of the filter instead of erroring.
    let garbled = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "students.list",
        json!({ "filter": { "dateOfBirth": "02.07.2011" }}),
    );
    assert_eq!(garbled["page"]["total"], 4);

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn list_without_filter_reuses_the_stored_one() {
    let workspace = temp_dir("schoolrec-students-session");
    let (mut child, mut stdin, mut reader) = spawn_daemon();
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    seed_school(&mut stdin, &mut reader);

    let filtered = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "students.list",
        json!({ "filter": { "subjectName": "Физика" }}),
    );
    assert_eq!(filtered["page"]["total"], 2);

    // A bare list call repeats the last submitted filter and echoes it back.
    let repeat = request_ok(&mut stdin, &mut reader, "11", "students.list", json!({}));
    assert_eq!(repeat["page"]["total"], 2);
    assert_eq!(repeat["filter"]["subjectName"], "Физика");

    // Each entity keeps its own entry: the classes list is unaffected.
    let classes = request_ok(&mut stdin, &mut reader, "12", "classes.list", json!({}));
    assert_eq!(classes["page"]["total"], 2);

    // An explicitly empty filter map replaces the stored one.
    let cleared = request_ok(
        &mut stdin,
        &mut reader,
        "13",
        "students.list",
        json!({ "filter": {} }),
    );
    assert_eq!(cleared["page"]["total"], 4);

    drop(stdin);
    let _ = child.wait();
}
