use chrono::Utc;
use serde_json::json;

use crate::auth::Capability;
use crate::ipc::error::ok;
use crate::ipc::helpers::{
    get_optional_str, get_required_str, require_capability, require_session, require_store,
    HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::roster::split_student_selector;
use crate::store::{self, field_str, Record, RecordStore};

const MAX_ENTRIES: usize = 500;

fn read_number(entry: &serde_json::Value, key: &str, n: usize) -> Result<f64, HandlerErr> {
    entry
        .get(key)
        .and_then(|v| v.as_f64())
        .ok_or_else(|| HandlerErr::bad_params(format!("entry {}: missing numeric {}", n, key)))
}

fn grades_enter(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let session = require_session(state, params)?;
    require_capability(&session, Capability::EnterGrades)?;

    let subject = get_required_str(params, "subject")?.trim().to_string();
    if subject.is_empty() {
        return Err(HandlerErr::bad_params("subject must not be empty"));
    }
    let term = get_optional_str(params, "term").unwrap_or_else(|| "1".to_string());
    let entries = params
        .get("entries")
        .and_then(|v| v.as_array())
        .ok_or_else(|| HandlerErr::bad_params("missing entries"))?;
    if entries.is_empty() {
        return Err(HandlerErr::bad_params("entries must not be empty"));
    }
    if entries.len() > MAX_ENTRIES {
        return Err(HandlerErr::bad_params(format!(
            "at most {} entries per request",
            MAX_ENTRIES
        )));
    }

    let date = Utc::now().format("%Y-%m-%d").to_string();
    let mut rows: Vec<Record> = Vec::with_capacity(entries.len());
    for (n, entry) in entries.iter().enumerate() {
        let selector = get_required_str(entry, "student")
            .map_err(|_| HandlerErr::bad_params(format!("entry {}: missing student", n)))?;
        let (student_id, student_name) = split_student_selector(&selector).ok_or_else(|| {
            HandlerErr::bad_params(format!("entry {}: student must be \"ID - Name\"", n))
        })?;
        let score = read_number(entry, "score", n)?;
        let out_of = read_number(entry, "outOf", n)?;
        if out_of <= 0.0 {
            return Err(HandlerErr::bad_params(format!(
                "entry {}: outOf must be positive",
                n
            )));
        }
        if score < 0.0 || score > out_of {
            return Err(HandlerErr::bad_params(format!(
                "entry {}: score must be between 0 and outOf",
                n
            )));
        }

        let mut rec = Record::new();
        rec.insert("Date".to_string(), date.clone().into());
        rec.insert("Student_ID".to_string(), student_id.into());
        rec.insert("Student_Name".to_string(), student_name.into());
        rec.insert("Subject".to_string(), subject.clone().into());
        rec.insert("Term".to_string(), term.clone().into());
        rec.insert("Score".to_string(), score.into());
        rec.insert("Out_Of".to_string(), out_of.into());
        rec.insert(
            "Entered_By".to_string(),
            session.user.username.clone().into(),
        );
        rows.push(rec);
    }

    let store = require_store(state)?;
    let entered = store.append_rows(store::GRADES, &rows)?;

    Ok(json!({ "entered": entered, "subject": subject, "term": term }))
}

fn grades_list_for_student(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let session = require_session(state, params)?;
    require_capability(&session, Capability::EnterGrades)?;

    let student_id = get_required_str(params, "studentId")?.trim().to_string();

    let store = require_store(state)?;
    let rows = store.fetch_all(store::GRADES)?;

    let grades: Vec<serde_json::Value> = rows
        .iter()
        .filter(|r| field_str(r, "Student_ID").as_deref() == Some(student_id.as_str()))
        .map(|r| serde_json::Value::Object(r.clone()))
        .collect();

    Ok(json!({ "studentId": student_id, "grades": grades }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let run = |res: Result<serde_json::Value, HandlerErr>| match res {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    };

    match req.method.as_str() {
        "grades.enter" => Some(run(grades_enter(state, &req.params))),
        "grades.listForStudent" => Some(run(grades_list_for_student(state, &req.params))),
        _ => None,
    }
}
