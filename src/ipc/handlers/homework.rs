use chrono::Utc;
use serde_json::json;

use crate::auth::Capability;
use crate::ipc::error::ok;
use crate::ipc::helpers::{
    get_optional_str, get_required_str, parse_date, require_capability, require_session,
    require_store, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::store::{self, field_str, Record, RecordStore};

fn homework_post(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let session = require_session(state, params)?;
    require_capability(&session, Capability::PostHomework)?;

    let class_name = get_required_str(params, "className")?.trim().to_string();
    let subject = get_required_str(params, "subject")?.trim().to_string();
    let title = get_required_str(params, "title")?.trim().to_string();
    let details = get_required_str(params, "details")?;
    let due_date = parse_date(&get_required_str(params, "dueDate")?)?;
    if class_name.is_empty() || subject.is_empty() || title.is_empty() {
        return Err(HandlerErr::bad_params(
            "className, subject and title must not be empty",
        ));
    }

    let mut rec = Record::new();
    rec.insert("Posted_At".to_string(), Utc::now().to_rfc3339().into());
    rec.insert("Class_Name".to_string(), class_name.clone().into());
    rec.insert("Subject".to_string(), subject.into());
    rec.insert("Title".to_string(), title.into());
    rec.insert("Details".to_string(), details.into());
    rec.insert("Due_Date".to_string(), due_date.into());
    rec.insert("Posted_By".to_string(), session.user.username.clone().into());

    let store = require_store(state)?;
    store.append_row(store::HOMEWORK, &rec)?;

    Ok(json!({ "posted": true, "className": class_name }))
}

/// Open read: the hosting portal shows posted homework to parents too.
fn homework_list(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let class_name = get_optional_str(params, "className");

    let store = require_store(state)?;
    let rows = store.fetch_all(store::HOMEWORK)?;

    let homework: Vec<serde_json::Value> = rows
        .iter()
        .filter(|r| match &class_name {
            Some(c) => field_str(r, "Class_Name").as_deref() == Some(c.as_str()),
            None => true,
        })
        .map(|r| serde_json::Value::Object(r.clone()))
        .collect();

    Ok(json!({ "homework": homework }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let run = |res: Result<serde_json::Value, HandlerErr>| match res {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    };

    match req.method.as_str() {
        "homework.post" => Some(run(homework_post(state, &req.params))),
        "homework.list" => Some(run(homework_list(state, &req.params))),
        _ => None,
    }
}
