use crate::ipc::error::{created, ok, HandlerErr};
use crate::ipc::types::{AppState, Identity, Request};
use rusqlite::Connection;

pub fn db_conn<'a>(state: &'a AppState) -> Result<&'a Connection, HandlerErr> {
    state
        .db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

/// Required string param, trimmed; empty counts as missing.
pub fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    match params.get(key) {
        None | Some(serde_json::Value::Null) => {
            Err(HandlerErr::bad_params(format!("missing {}", key)))
        }
        Some(v) => {
            let Some(s) = v.as_str() else {
                return Err(HandlerErr::bad_params(format!("{} must be a string", key)));
            };
            let t = s.trim();
            if t.is_empty() {
                return Err(HandlerErr::bad_params(format!("{} must not be empty", key)));
            }
            Ok(t.to_string())
        }
    }
}

/// Optional string param, trimmed. Null and empty strings read as absent.
pub fn get_optional_str(params: &serde_json::Value, key: &str) -> Result<Option<String>, HandlerErr> {
    match params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => {
            let Some(s) = v.as_str() else {
                return Err(HandlerErr::bad_params(format!("{} must be a string", key)));
            };
            let t = s.trim();
            Ok((!t.is_empty()).then(|| t.to_string()))
        }
    }
}

/// Integer id param. Accepts a JSON number or a numeric string.
pub fn get_required_id(params: &serde_json::Value, key: &str) -> Result<i64, HandlerErr> {
    let v = params
        .get(key)
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))?;
    v.as_i64()
        .or_else(|| v.as_str().and_then(|s| s.trim().parse::<i64>().ok()))
        .ok_or_else(|| HandlerErr::bad_params(format!("{} must be an integer", key)))
}

pub fn require_identity(req: &Request) -> Result<&Identity, HandlerErr> {
    match req.identity.as_ref() {
        Some(who) if !who.username.trim().is_empty() => Ok(who),
        _ => Err(HandlerErr::new("unauthorized", "authentication required")),
    }
}

pub fn require_staff(req: &Request) -> Result<&Identity, HandlerErr> {
    let who = require_identity(req)?;
    if !who.staff {
        return Err(HandlerErr::new("forbidden", "staff access required"));
    }
    Ok(who)
}

pub fn respond(req: &Request, result: Result<serde_json::Value, HandlerErr>) -> serde_json::Value {
    finish(req, result, ok)
}

/// Like [`respond`], but success means a record was created (status 201).
pub fn respond_created(
    req: &Request,
    result: Result<serde_json::Value, HandlerErr>,
) -> serde_json::Value {
    finish(req, result, created)
}

fn finish(
    req: &Request,
    result: Result<serde_json::Value, HandlerErr>,
    success: fn(&str, serde_json::Value) -> serde_json::Value,
) -> serde_json::Value {
    match result {
        Ok(v) => success(&req.id, v),
        Err(e) => {
            if e.code.starts_with("db_") || e.code == "code_exhausted" {
                tracing::error!(id = %req.id, method = %req.method, code = e.code, message = %e.message, "request failed");
            } else {
                tracing::debug!(id = %req.id, method = %req.method, code = e.code, "request rejected");
            }
            e.response(&req.id)
        }
    }
}
