use chrono::Utc;
use serde_json::json;

use crate::auth::Capability;
use crate::ipc::error::ok;
use crate::ipc::helpers::{
    get_required_str, require_capability, require_session, require_store, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::store::{self, Record, RecordStore};

fn news_publish(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let session = require_session(state, params)?;
    require_capability(&session, Capability::PublishNews)?;

    let title = get_required_str(params, "title")?.trim().to_string();
    let body = get_required_str(params, "body")?.trim().to_string();
    if title.is_empty() || body.is_empty() {
        return Err(HandlerErr::bad_params("title and body must not be empty"));
    }

    let mut rec = Record::new();
    rec.insert("Published_At".to_string(), Utc::now().to_rfc3339().into());
    rec.insert("Title".to_string(), title.clone().into());
    rec.insert("Body".to_string(), body.into());
    rec.insert(
        "Published_By".to_string(),
        session.user.username.clone().into(),
    );

    let store = require_store(state)?;
    store.append_row(store::NEWS, &rec)?;

    log::info!("announcement {:?} published by {}", title, session.user.username);
    Ok(json!({ "published": true, "title": title }))
}

/// Announcements are public; no session required.
fn news_list(
    state: &mut AppState,
    _params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let store = require_store(state)?;
    let rows = store.fetch_all(store::NEWS)?;

    let news: Vec<serde_json::Value> = rows
        .iter()
        .map(|r| serde_json::Value::Object(r.clone()))
        .collect();

    Ok(json!({ "news": news }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let run = |res: Result<serde_json::Value, HandlerErr>| match res {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    };

    match req.method.as_str() {
        "news.publish" => Some(run(news_publish(state, &req.params))),
        "news.list" => Some(run(news_list(state, &req.params))),
        _ => None,
    }
}
