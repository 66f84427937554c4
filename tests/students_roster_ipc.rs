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

const ROSTER_CSV: &str = "\
#student_id, name, class_name, parent_contact
1023, Ali Hassan, 5-A, parent.hassan@example.com
1024, Sara Omar,  5-B, parent.omar@example.com
1025, Lina Saad,  5-A, parent.saad@example.com
";

#[test]
fn bulk_import_then_public_search() {
    let workspace = temp_dir("schoolbook-roster");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "2",
        "setup.seedAdmin",
        json!({ "username": "head", "password": "letmein99", "name": "Head" }),
    );
    let resp = request(
        &mut stdin,
        &mut reader,
        "3",
        "auth.login",
        json!({ "username": "head", "password": "letmein99" }),
    );
    let admin = resp
        .get("result")
        .and_then(|r| r.get("sessionToken"))
        .and_then(|v| v.as_str())
        .expect("admin token")
        .to_string();

    let resp = request(
        &mut stdin,
        &mut reader,
        "4",
        "students.importBulk",
        json!({ "sessionToken": admin, "csv": ROSTER_CSV }),
    );
    assert_eq!(
        resp.get("result").and_then(|r| r.get("imported")),
        Some(&json!(3))
    );

    // Re-importing the same file must be refused, naming the collisions.
    let resp = request(
        &mut stdin,
        &mut reader,
        "5",
        "students.importBulk",
        json!({ "sessionToken": admin, "csv": ROSTER_CSV }),
    );
    assert_eq!(error_code(&resp), Some("student_id_taken"));

    // Parent-portal search requires no session.
    let resp = request(
        &mut stdin,
        &mut reader,
        "6",
        "students.search",
        json!({ "studentId": "1024" }),
    );
    let result = resp.get("result").expect("search result");
    assert_eq!(result.get("found"), Some(&json!(true)));
    let students = result
        .get("students")
        .and_then(|v| v.as_array())
        .expect("students");
    assert_eq!(students.len(), 1);
    assert_eq!(
        students[0].get("Name").and_then(|v| v.as_str()),
        Some("Sara Omar")
    );

    // A miss is an empty result, not an error.
    let resp = request(
        &mut stdin,
        &mut reader,
        "7",
        "students.search",
        json!({ "studentId": "9999" }),
    );
    let result = resp.get("result").expect("search result");
    assert_eq!(result.get("found"), Some(&json!(false)));
    assert_eq!(
        result
            .get("students")
            .and_then(|v| v.as_array())
            .map(|a| a.len()),
        Some(0)
    );

    // The roster list carries the combined selector the entry forms use.
    let resp = request(
        &mut stdin,
        &mut reader,
        "8",
        "students.list",
        json!({ "sessionToken": admin }),
    );
    let students = resp
        .get("result")
        .and_then(|r| r.get("students"))
        .and_then(|v| v.as_array())
        .expect("students");
    assert_eq!(students.len(), 3);
    assert_eq!(
        students[0].get("selector").and_then(|v| v.as_str()),
        Some("1023 - Ali Hassan")
    );

    // A malformed CSV line is reported with its line number.
    let resp = request(
        &mut stdin,
        &mut reader,
        "9",
        "students.importBulk",
        json!({ "sessionToken": admin, "csv": "2000, , 5-C, p@example.com" }),
    );
    assert_eq!(error_code(&resp), Some("bad_csv"));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
