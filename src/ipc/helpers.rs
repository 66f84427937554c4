use chrono::NaiveDate;

use crate::auth::{Capability, Session};
use crate::ipc::error::err;
use crate::ipc::types::AppState;
use crate::store::{SqliteStore, StoreError};

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> HandlerErr {
        HandlerErr {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_params(message: impl Into<String>) -> HandlerErr {
        HandlerErr::new("bad_params", message)
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<StoreError> for HandlerErr {
    fn from(e: StoreError) -> HandlerErr {
        HandlerErr::new("store_unavailable", e.to_string())
    }
}

pub fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn get_optional_str(params: &serde_json::Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .filter(|s| !s.trim().is_empty())
}

pub fn require_store<'a>(state: &'a AppState) -> Result<&'a SqliteStore, HandlerErr> {
    state
        .store
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

/// Look up the session named by `params.sessionToken`. Handlers get a
/// snapshot copy so the session map stays free for logout to mutate.
pub fn require_session(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<Session, HandlerErr> {
    let token = get_required_str(params, "sessionToken")?;
    state
        .sessions
        .get(&token)
        .cloned()
        .ok_or_else(|| HandlerErr::new("no_session", "not logged in"))
}

pub fn require_capability(session: &Session, cap: Capability) -> Result<(), HandlerErr> {
    if session.user.role.allows(cap) {
        return Ok(());
    }
    Err(HandlerErr::new(
        "forbidden",
        format!("role {} may not perform this operation", session.user.role),
    ))
}

/// Dates travel as `YYYY-MM-DD`; anything else is a caller error.
pub fn parse_date(raw: &str) -> Result<String, HandlerErr> {
    let d = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| HandlerErr::bad_params("date must be YYYY-MM-DD"))?;
    Ok(d.format("%Y-%m-%d").to_string())
}
