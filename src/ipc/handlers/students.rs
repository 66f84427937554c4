use serde_json::json;

use crate::auth::Capability;
use crate::ipc::error::ok;
use crate::ipc::helpers::{
    get_required_str, require_capability, require_session, require_store, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::roster::StudentRecord;
use crate::store::{self, field_str, RecordStore};

/// The parent-portal lookup. No session: anyone holding a student ID may
/// query it, exactly as the public search page allowed. A miss is an
/// empty list, never an error.
fn students_search(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?.trim().to_string();

    let store = require_store(state)?;
    let rows = store.fetch_all(store::STUDENTS)?;

    let matches: Vec<serde_json::Value> = rows
        .iter()
        .filter(|r| field_str(r, "Student_ID").as_deref() == Some(student_id.as_str()))
        .map(|r| serde_json::Value::Object(r.clone()))
        .collect();

    Ok(json!({ "students": matches, "found": !matches.is_empty() }))
}

fn students_list(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let session = require_session(state, params)?;
    require_capability(&session, Capability::ViewRoster)?;

    let store = require_store(state)?;
    let rows = store.fetch_all(store::STUDENTS)?;

    let students: Vec<serde_json::Value> = rows
        .iter()
        .map(|r| {
            json!({
                "studentId": field_str(r, "Student_ID"),
                "name": field_str(r, "Name"),
                "className": field_str(r, "Class_Name"),
                // The combined form the entry dropdowns use.
                "selector": match (field_str(r, "Student_ID"), field_str(r, "Name")) {
                    (Some(id), Some(name)) => Some(format!("{} - {}", id, name)),
                    _ => None,
                },
            })
        })
        .collect();

    Ok(json!({ "students": students }))
}

fn students_import_bulk(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let session = require_session(state, params)?;
    require_capability(&session, Capability::ImportStudents)?;

    let csv_text = get_required_str(params, "csv")?;
    let students = StudentRecord::vec_from_csv_reader(csv_text.as_bytes())
        .map_err(|e| HandlerErr::new("bad_csv", e))?;
    if students.is_empty() {
        return Err(HandlerErr::bad_params("csv contains no student rows"));
    }

    let store = require_store(state)?;
    let existing = store.fetch_all(store::STUDENTS)?;

    // Re-importing the same file must not double the roster.
    let mut duplicates = Vec::new();
    for s in &students {
        if existing
            .iter()
            .any(|r| field_str(r, "Student_ID").as_deref() == Some(s.student_id.as_str()))
        {
            duplicates.push(s.student_id.clone());
        }
    }
    if !duplicates.is_empty() {
        return Err(HandlerErr {
            code: "student_id_taken",
            message: "some student ids already exist".to_string(),
            details: Some(json!({ "studentIds": duplicates })),
        });
    }

    let records: Vec<store::Record> = students.iter().map(|s| s.to_record()).collect();
    let imported = store.append_rows(store::STUDENTS, &records)?;

    log::info!(
        "{} students imported by {}",
        imported,
        session.user.username
    );
    Ok(json!({ "imported": imported }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let run = |res: Result<serde_json::Value, HandlerErr>| match res {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    };

    match req.method.as_str() {
        "students.search" => Some(run(students_search(state, &req.params))),
        "students.list" => Some(run(students_list(state, &req.params))),
        "students.importBulk" => Some(run(students_import_bulk(state, &req.params))),
        _ => None,
    }
}
