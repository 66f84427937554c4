use serde_json::json;

use crate::auth::{self, Role, StaffRecord};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{get_required_str, require_store, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::store::{self, RecordStore};

fn handle_login(state: &mut AppState, req: &Request) -> serde_json::Value {
    let username = match get_required_str(&req.params, "username") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let password = match get_required_str(&req.params, "password") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    let records = {
        let store = match require_store(state) {
            Ok(s) => s,
            Err(e) => return e.response(&req.id),
        };
        match store.fetch_all(store::USERS) {
            Ok(r) => r,
            Err(e) => return HandlerErr::from(e).response(&req.id),
        }
    };

    match auth::authenticate(&username, &password, &records) {
        Ok(session) => {
            let user = session.user.clone();
            let started_at = session.started_at.to_rfc3339();
            let token = state.sessions.insert(session);
            ok(
                &req.id,
                json!({
                    "sessionToken": token,
                    "username": user.username,
                    "role": user.role.to_string(),
                    "name": user.name,
                    "loginAt": started_at,
                }),
            )
        }
        Err(e) => err(&req.id, e.code(), e.to_string(), None),
    }
}

fn handle_logout(state: &mut AppState, req: &Request) -> serde_json::Value {
    let token = match get_required_str(&req.params, "sessionToken") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    if state.sessions.logout(&token) {
        ok(&req.id, json!({ "loggedOut": true }))
    } else {
        err(&req.id, "no_session", "not logged in", None)
    }
}

// The old spreadsheet workflow pasted generated hashes straight into the
// Password column; the generator stays available as an open utility.
fn handle_hash_password(req: &Request) -> serde_json::Value {
    let password = match get_required_str(&req.params, "password") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    match auth::hash_password(&password) {
        Ok(hash) => ok(&req.id, json!({ "passwordHash": hash })),
        Err(e) => err(&req.id, "hash_failed", e.to_string(), None),
    }
}

fn seed_admin(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let username = get_required_str(params, "username")?;
    let password = get_required_str(params, "password")?;
    let name = get_required_str(params, "name")?;
    if username.trim().is_empty() || password.is_empty() {
        return Err(HandlerErr::bad_params(
            "username and password must not be empty",
        ));
    }

    let store = require_store(state)?;
    let existing = store.fetch_all(store::USERS)?;
    if !existing.is_empty() {
        return Err(HandlerErr::new(
            "already_initialized",
            "the Users sheet already has rows; use users.create",
        ));
    }

    let password_hash = auth::hash_password(&password)
        .map_err(|e| HandlerErr::new("hash_failed", e.to_string()))?;
    let admin = StaffRecord {
        username: username.trim().to_string(),
        password_hash,
        role: Role::Admin,
        name: name.trim().to_string(),
        subjects: Vec::new(),
    };
    store.append_row(store::USERS, &admin.to_record())?;

    log::info!("seeded first admin {}", admin.username);
    Ok(json!({ "username": admin.username, "role": admin.role.to_string() }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "auth.login" => Some(handle_login(state, req)),
        "auth.logout" => Some(handle_logout(state, req)),
        "auth.hashPassword" => Some(handle_hash_password(req)),
        "setup.seedAdmin" => Some(match seed_admin(state, &req.params) {
            Ok(v) => ok(&req.id, v),
            Err(e) => e.response(&req.id),
        }),
        _ => None,
    }
}
