use serde_json::json;

use crate::auth::{self, Capability, Role, StaffRecord};
use crate::ipc::error::ok;
use crate::ipc::helpers::{
    get_required_str, require_capability, require_session, require_store, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::store::{self, field_str, RecordStore};

fn read_subjects(params: &serde_json::Value) -> Result<Vec<String>, HandlerErr> {
    let Some(v) = params.get("subjects") else {
        return Ok(Vec::new());
    };
    let Some(arr) = v.as_array() else {
        return Err(HandlerErr::bad_params("subjects must be an array of strings"));
    };
    arr.iter()
        .map(|s| {
            s.as_str()
                .map(|t| t.trim().to_string())
                .ok_or_else(|| HandlerErr::bad_params("subjects must be an array of strings"))
        })
        .collect()
}

fn users_create(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let session = require_session(state, params)?;
    require_capability(&session, Capability::ManageUsers)?;

    let username = get_required_str(params, "username")?.trim().to_string();
    let password = get_required_str(params, "password")?;
    let role: Role = get_required_str(params, "role")?
        .parse()
        .map_err(HandlerErr::bad_params)?;
    let name = get_required_str(params, "name")?.trim().to_string();
    let subjects = read_subjects(params)?;

    if username.is_empty() {
        return Err(HandlerErr::bad_params("username must not be empty"));
    }
    if password.is_empty() {
        return Err(HandlerErr::bad_params("password must not be empty"));
    }

    let store = require_store(state)?;
    let existing = store.fetch_all(store::USERS)?;

    // Duplicate usernames are rejected here, at write time. Login keeps
    // first-row-wins for any duplicates already present in the sheet.
    if existing
        .iter()
        .any(|r| field_str(r, "Username").as_deref() == Some(username.as_str()))
    {
        return Err(HandlerErr::new(
            "username_taken",
            format!("a user named {:?} already exists", username),
        ));
    }

    let password_hash = auth::hash_password(&password)
        .map_err(|e| HandlerErr::new("hash_failed", e.to_string()))?;
    let user = StaffRecord {
        username,
        password_hash,
        role,
        name,
        subjects,
    };
    store.append_row(store::USERS, &user.to_record())?;

    log::info!("user {} created by {}", user.username, session.user.username);
    Ok(json!({ "username": user.username, "role": user.role.to_string() }))
}

fn users_list(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let session = require_session(state, params)?;
    require_capability(&session, Capability::ManageUsers)?;

    let store = require_store(state)?;
    let rows = store.fetch_all(store::USERS)?;

    // Password hashes stay inside the store.
    let users: Vec<serde_json::Value> = rows
        .iter()
        .map(|r| {
            json!({
                "username": field_str(r, "Username"),
                "role": field_str(r, "Role"),
                "name": field_str(r, "Name"),
                "subjects": field_str(r, "Subjects").unwrap_or_default(),
            })
        })
        .collect();

    Ok(json!({ "users": users }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let run = |res: Result<serde_json::Value, HandlerErr>| match res {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    };

    match req.method.as_str() {
        "users.create" => Some(run(users_create(state, &req.params))),
        "users.list" => Some(run(users_list(state, &req.params))),
        _ => None,
    }
}
