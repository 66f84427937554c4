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
    let exe = env!("CARGO_BIN_EXE_schoolbookd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn schoolbookd");
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

fn error_code(resp: &serde_json::Value) -> Option<&str> {
    resp.get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
}

fn result<'a>(resp: &'a serde_json::Value, method: &str) -> &'a serde_json::Value {
    assert_eq!(
        resp.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "{} failed: {}",
        method,
        resp
    );
    resp.get("result").expect("result")
}

/// Seed a workspace with an admin and one teacher, and return the
/// teacher's session token.
fn seed_teacher(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    workspace: &PathBuf,
) -> String {
    let _ = request(
        stdin,
        reader,
        "s1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request(
        stdin,
        reader,
        "s2",
        "setup.seedAdmin",
        json!({ "username": "head", "password": "letmein99", "name": "Head" }),
    );
    let resp = request(
        stdin,
        reader,
        "s3",
        "auth.login",
        json!({ "username": "head", "password": "letmein99" }),
    );
    let admin = resp
        .get("result")
        .and_then(|r| r.get("sessionToken"))
        .and_then(|v| v.as_str())
        .expect("admin token")
        .to_string();
    let _ = request(
        stdin,
        reader,
        "s4",
        "users.create",
        json!({
            "sessionToken": admin,
            "username": "t1",
            "password": "secret",
            "role": "teacher",
            "name": "Ms Jenny"
        }),
    );
    let resp = request(
        stdin,
        reader,
        "s5",
        "auth.login",
        json!({ "username": "t1", "password": "secret" }),
    );
    resp.get("result")
        .and_then(|r| r.get("sessionToken"))
        .and_then(|v| v.as_str())
        .expect("teacher token")
        .to_string()
}

#[test]
fn attendance_round_trip() {
    let workspace = temp_dir("schoolbook-attendance");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let teacher = seed_teacher(&mut stdin, &mut reader, &workspace);

    let resp = request(
        &mut stdin,
        &mut reader,
        "1",
        "attendance.record",
        json!({
            "sessionToken": teacher,
            "date": "2026-03-01",
            "entries": [
                { "student": "1023 - Ali Hassan", "status": "present" },
                { "student": "1024 - Sara Omar", "status": "Absent" },
                { "student": "1025 - Lina Saad", "status": "late" }
            ]
        }),
    );
    assert_eq!(
        result(&resp, "attendance.record").get("recorded"),
        Some(&json!(3))
    );

    // Bad status rejects the whole batch.
    let resp = request(
        &mut stdin,
        &mut reader,
        "2",
        "attendance.record",
        json!({
            "sessionToken": teacher,
            "date": "2026-03-01",
            "entries": [ { "student": "1023 - Ali Hassan", "status": "asleep" } ]
        }),
    );
    assert_eq!(error_code(&resp), Some("bad_params"));

    let resp = request(
        &mut stdin,
        &mut reader,
        "3",
        "attendance.record",
        json!({
            "sessionToken": teacher,
            "date": "03/01/2026",
            "entries": [ { "student": "1023 - Ali Hassan", "status": "present" } ]
        }),
    );
    assert_eq!(error_code(&resp), Some("bad_params"));

    let resp = request(
        &mut stdin,
        &mut reader,
        "4",
        "attendance.listForDate",
        json!({ "sessionToken": teacher, "date": "2026-03-01" }),
    );
    let entries = result(&resp, "attendance.listForDate")
        .get("entries")
        .and_then(|v| v.as_array())
        .expect("entries")
        .clone();
    assert_eq!(entries.len(), 3);
    assert_eq!(
        entries[0].get("Student_ID").and_then(|v| v.as_str()),
        Some("1023")
    );
    assert_eq!(
        entries[1].get("Status").and_then(|v| v.as_str()),
        Some("absent")
    );
    assert_eq!(
        entries[0].get("Recorded_By").and_then(|v| v.as_str()),
        Some("t1")
    );

    // Another day stays separate.
    let resp = request(
        &mut stdin,
        &mut reader,
        "5",
        "attendance.listForDate",
        json!({ "sessionToken": teacher, "date": "2026-03-02" }),
    );
    assert_eq!(
        result(&resp, "attendance.listForDate")
            .get("entries")
            .and_then(|v| v.as_array())
            .map(|a| a.len()),
        Some(0)
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn grades_and_homework_entry() {
    let workspace = temp_dir("schoolbook-grades");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let teacher = seed_teacher(&mut stdin, &mut reader, &workspace);

    let resp = request(
        &mut stdin,
        &mut reader,
        "1",
        "grades.enter",
        json!({
            "sessionToken": teacher,
            "subject": "Math",
            "term": "2",
            "entries": [
                { "student": "1023 - Ali Hassan", "score": 18.5, "outOf": 20 },
                { "student": "1024 - Sara Omar", "score": 20, "outOf": 20 }
            ]
        }),
    );
    assert_eq!(result(&resp, "grades.enter").get("entered"), Some(&json!(2)));

    // A score above outOf rejects the batch.
    let resp = request(
        &mut stdin,
        &mut reader,
        "2",
        "grades.enter",
        json!({
            "sessionToken": teacher,
            "subject": "Math",
            "entries": [ { "student": "1023 - Ali Hassan", "score": 25, "outOf": 20 } ]
        }),
    );
    assert_eq!(error_code(&resp), Some("bad_params"));

    let resp = request(
        &mut stdin,
        &mut reader,
        "3",
        "grades.listForStudent",
        json!({ "sessionToken": teacher, "studentId": "1023" }),
    );
    let grades = result(&resp, "grades.listForStudent")
        .get("grades")
        .and_then(|v| v.as_array())
        .expect("grades")
        .clone();
    assert_eq!(grades.len(), 1);
    assert_eq!(grades[0].get("Subject").and_then(|v| v.as_str()), Some("Math"));
    assert_eq!(grades[0].get("Term").and_then(|v| v.as_str()), Some("2"));
    assert_eq!(grades[0].get("Score").and_then(|v| v.as_f64()), Some(18.5));

    let resp = request(
        &mut stdin,
        &mut reader,
        "4",
        "homework.post",
        json!({
            "sessionToken": teacher,
            "className": "5-A",
            "subject": "Math",
            "title": "Fractions worksheet",
            "details": "Problems 1-10 on page 42.",
            "dueDate": "2026-03-05"
        }),
    );
    assert_eq!(
        result(&resp, "homework.post").get("posted"),
        Some(&json!(true))
    );

    // homework.list is an open read; filter by class.
    let resp = request(
        &mut stdin,
        &mut reader,
        "5",
        "homework.list",
        json!({ "className": "5-A" }),
    );
    let homework = result(&resp, "homework.list")
        .get("homework")
        .and_then(|v| v.as_array())
        .expect("homework")
        .clone();
    assert_eq!(homework.len(), 1);
    assert_eq!(
        homework[0].get("Title").and_then(|v| v.as_str()),
        Some("Fractions worksheet")
    );

    let resp = request(
        &mut stdin,
        &mut reader,
        "6",
        "homework.list",
        json!({ "className": "5-B" }),
    );
    assert_eq!(
        result(&resp, "homework.list")
            .get("homework")
            .and_then(|v| v.as_array())
            .map(|a| a.len()),
        Some(0)
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn behavior_log_round_trip() {
    let workspace = temp_dir("schoolbook-behavior");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let teacher = seed_teacher(&mut stdin, &mut reader, &workspace);

    let resp = request(
        &mut stdin,
        &mut reader,
        "1",
        "behavior.record",
        json!({
            "sessionToken": teacher,
            "student": "1023 - Ali Hassan",
            "category": "negative",
            "note": "talking during the exam"
        }),
    );
    assert_eq!(
        result(&resp, "behavior.record").get("recorded"),
        Some(&json!(true))
    );

    // The selector must carry both halves.
    let resp = request(
        &mut stdin,
        &mut reader,
        "2",
        "behavior.record",
        json!({ "sessionToken": teacher, "student": "1023", "note": "x" }),
    );
    assert_eq!(error_code(&resp), Some("bad_params"));

    let resp = request(
        &mut stdin,
        &mut reader,
        "3",
        "behavior.listForStudent",
        json!({ "sessionToken": teacher, "studentId": "1023" }),
    );
    let entries = result(&resp, "behavior.listForStudent")
        .get("entries")
        .and_then(|v| v.as_array())
        .expect("entries")
        .clone();
    assert_eq!(entries.len(), 1);
    assert_eq!(
        entries[0].get("Category").and_then(|v| v.as_str()),
        Some("negative")
    );
    assert_eq!(
        entries[0].get("Student_Name").and_then(|v| v.as_str()),
        Some("Ali Hassan")
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
