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

const CATEGORIES: &[&str] = &["positive", "negative", "neutral"];

fn parse_category(raw: &str) -> Result<String, HandlerErr> {
    let c = raw.trim().to_ascii_lowercase();
    if CATEGORIES.contains(&c.as_str()) {
        return Ok(c);
    }
    Err(HandlerErr::bad_params(format!(
        "category must be one of {}",
        CATEGORIES.join(", ")
    )))
}

fn behavior_record(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let session = require_session(state, params)?;
    require_capability(&session, Capability::RecordBehavior)?;

    let selector = get_required_str(params, "student")?;
    let (student_id, student_name) = split_student_selector(&selector)
        .ok_or_else(|| HandlerErr::bad_params("student must be \"ID - Name\""))?;
    let category = parse_category(&get_optional_str(params, "category").unwrap_or_else(|| "neutral".to_string()))?;
    let note = get_required_str(params, "note")?.trim().to_string();
    if note.is_empty() {
        return Err(HandlerErr::bad_params("note must not be empty"));
    }

    let date = Utc::now().format("%Y-%m-%d").to_string();
    let mut rec = Record::new();
    rec.insert("Date".to_string(), date.into());
    rec.insert("Student_ID".to_string(), student_id.clone().into());
    rec.insert("Student_Name".to_string(), student_name.into());
    rec.insert("Category".to_string(), category.into());
    rec.insert("Note".to_string(), note.into());
    rec.insert(
        "Recorded_By".to_string(),
        session.user.username.clone().into(),
    );

    let store = require_store(state)?;
    store.append_row(store::BEHAVIOR, &rec)?;

    Ok(json!({ "studentId": student_id, "recorded": true }))
}

fn behavior_list_for_student(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let session = require_session(state, params)?;
    require_capability(&session, Capability::RecordBehavior)?;

    let student_id = get_required_str(params, "studentId")?.trim().to_string();

    let store = require_store(state)?;
    let rows = store.fetch_all(store::BEHAVIOR)?;

    let entries: Vec<serde_json::Value> = rows
        .iter()
        .filter(|r| field_str(r, "Student_ID").as_deref() == Some(student_id.as_str()))
        .map(|r| serde_json::Value::Object(r.clone()))
        .collect();

    Ok(json!({ "studentId": student_id, "entries": entries }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let run = |res: Result<serde_json::Value, HandlerErr>| match res {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    };

    match req.method.as_str() {
        "behavior.record" => Some(run(behavior_record(state, &req.params))),
        "behavior.listForStudent" => Some(run(behavior_list_for_student(state, &req.params))),
        _ => None,
    }
}
