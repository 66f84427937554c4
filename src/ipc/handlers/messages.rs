use chrono::Utc;
use serde_json::json;

use crate::auth::Capability;
use crate::ipc::error::ok;
use crate::ipc::helpers::{
    get_required_str, require_capability, require_session, require_store, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::store::{self, field_str, Record, RecordStore};

fn messages_send(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let session = require_session(state, params)?;
    require_capability(&session, Capability::SendMessages)?;

    let student_id = get_required_str(params, "studentId")?.trim().to_string();
    let body = get_required_str(params, "body")?.trim().to_string();
    if student_id.is_empty() || body.is_empty() {
        return Err(HandlerErr::bad_params(
            "studentId and body must not be empty",
        ));
    }

    let mut rec = Record::new();
    rec.insert("Sent_At".to_string(), Utc::now().to_rfc3339().into());
    rec.insert("Student_ID".to_string(), student_id.clone().into());
    rec.insert("Body".to_string(), body.into());
    rec.insert("Sender".to_string(), session.user.username.clone().into());

    let store = require_store(state)?;
    store.append_row(store::MESSAGES, &rec)?;

    Ok(json!({ "sent": true, "studentId": student_id }))
}

/// Parent-side read, keyed by the student ID alone, like the public
/// student search.
fn messages_list_for_student(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?.trim().to_string();

    let store = require_store(state)?;
    let rows = store.fetch_all(store::MESSAGES)?;

    let messages: Vec<serde_json::Value> = rows
        .iter()
        .filter(|r| field_str(r, "Student_ID").as_deref() == Some(student_id.as_str()))
        .map(|r| serde_json::Value::Object(r.clone()))
        .collect();

    Ok(json!({ "studentId": student_id, "messages": messages }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let run = |res: Result<serde_json::Value, HandlerErr>| match res {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    };

    match req.method.as_str() {
        "messages.send" => Some(run(messages_send(state, &req.params))),
        "messages.listForStudent" => Some(run(messages_list_for_student(state, &req.params))),
        _ => None,
    }
}
