use serde_json::json;

use crate::auth::Capability;
use crate::ipc::error::ok;
use crate::ipc::helpers::{
    get_required_str, parse_date, require_capability, require_session, require_store, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::roster::split_student_selector;
use crate::store::{self, field_str, Record, RecordStore};

const STATUSES: &[&str] = &["present", "absent", "late", "excused"];

fn parse_status(raw: &str) -> Result<String, HandlerErr> {
    let s = raw.trim().to_ascii_lowercase();
    if STATUSES.contains(&s.as_str()) {
        return Ok(s);
    }
    Err(HandlerErr::bad_params(format!(
        "status must be one of {}",
        STATUSES.join(", ")
    )))
}

/// One row per student, stamped with the date and the recorder. The whole
/// batch lands or none of it does.
fn attendance_record(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let session = require_session(state, params)?;
    require_capability(&session, Capability::RecordAttendance)?;

    let date = parse_date(&get_required_str(params, "date")?)?;
    let entries = params
        .get("entries")
        .and_then(|v| v.as_array())
        .ok_or_else(|| HandlerErr::bad_params("missing entries"))?;
    if entries.is_empty() {
        return Err(HandlerErr::bad_params("entries must not be empty"));
    }

    let mut rows: Vec<Record> = Vec::with_capacity(entries.len());
    for (n, entry) in entries.iter().enumerate() {
        let selector = get_required_str(entry, "student")
            .map_err(|_| HandlerErr::bad_params(format!("entry {}: missing student", n)))?;
        let (student_id, student_name) = split_student_selector(&selector).ok_or_else(|| {
            HandlerErr::bad_params(format!("entry {}: student must be \"ID - Name\"", n))
        })?;
        let status = parse_status(&get_required_str(entry, "status").map_err(|_| {
            HandlerErr::bad_params(format!("entry {}: missing status", n))
        })?)?;

        let mut rec = Record::new();
        rec.insert("Date".to_string(), date.clone().into());
        rec.insert("Student_ID".to_string(), student_id.into());
        rec.insert("Student_Name".to_string(), student_name.into());
        rec.insert("Status".to_string(), status.into());
        rec.insert(
            "Recorded_By".to_string(),
            session.user.username.clone().into(),
        );
        rows.push(rec);
    }

    let store = require_store(state)?;
    let recorded = store.append_rows(store::ATTENDANCE, &rows)?;

    Ok(json!({ "recorded": recorded, "date": date }))
}

fn attendance_list_for_date(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let session = require_session(state, params)?;
    require_capability(&session, Capability::RecordAttendance)?;

    let date = parse_date(&get_required_str(params, "date")?)?;

    let store = require_store(state)?;
    let rows = store.fetch_all(store::ATTENDANCE)?;

    let entries: Vec<serde_json::Value> = rows
        .iter()
        .filter(|r| field_str(r, "Date").as_deref() == Some(date.as_str()))
        .map(|r| serde_json::Value::Object(r.clone()))
        .collect();

    Ok(json!({ "date": date, "entries": entries }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let run = |res: Result<serde_json::Value, HandlerErr>| match res {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    };

    match req.method.as_str() {
        "attendance.record" => Some(run(attendance_record(state, &req.params))),
        "attendance.listForDate" => Some(run(attendance_list_for_date(state, &req.params))),
        _ => None,
    }
}
