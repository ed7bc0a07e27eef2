use crate::codes;
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{
    db_conn, get_optional_str, get_required_id, get_required_str, require_identity,
    require_staff, respond, respond_created,
};
use crate::ipc::types::{AppState, Request};
use crate::registry::{self, ClassPatch, NewClass};
use crate::schedule;
use chrono::Utc;
use serde_json::json;

fn parse_new_class(params: &serde_json::Value) -> Result<NewClass, HandlerErr> {
    let subject = get_required_str(params, "subject")?;
    let classroom = get_required_str(params, "classroom")?;
    let date_raw = get_required_str(params, "date")?;
    let time_raw = get_required_str(params, "time")?;
    let description = get_optional_str(params, "description")?.unwrap_or_default();

    let date = schedule::parse_date(&date_raw).map_err(|e| HandlerErr::bad_params(e.to_string()))?;
    let time = schedule::parse_time(&time_raw).map_err(|e| HandlerErr::bad_params(e.to_string()))?;

    let remedial_code = match get_optional_str(params, "remedialCode")? {
        Some(raw) => {
            let code = codes::normalize(&raw);
            codes::validate(&code).map_err(HandlerErr::bad_params)?;
            Some(code)
        }
        None => None,
    };

    Ok(NewClass {
        subject,
        classroom,
        date,
        time,
        description,
        remedial_code,
    })
}

fn create_class(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let who = require_staff(req)?;
    let conn = db_conn(state)?;
    let new = parse_new_class(&req.params)?;

    let record = registry::create_class(conn, &new, state.settings.code_attempts)?;
    tracing::info!(
        class_id = record.id,
        code = %record.remedial_code,
        by = %who.username,
        "make-up class created"
    );

    let view = record.view(state.settings.tz(), Utc::now());
    Ok(json!({
        "message": "Make-up class created",
        "classId": view.id,
        "remedialCode": view.code,
        "status": view.status,
    }))
}

fn list_classes(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    require_staff(req)?;
    let conn = db_conn(state)?;
    let tz = state.settings.tz();
    let now = Utc::now();
    let classes: Vec<_> = registry::list_classes(conn)?
        .into_iter()
        .map(|c| c.view(tz, now))
        .collect();
    Ok(json!({ "classes": classes }))
}

fn patch_text(
    patch: &serde_json::Map<String, serde_json::Value>,
    key: &str,
    allow_empty: bool,
) -> Result<Option<String>, HandlerErr> {
    match patch.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => {
            let Some(s) = v.as_str() else {
                return Err(HandlerErr::bad_params(format!("patch.{} must be a string", key)));
            };
            let t = s.trim();
            if t.is_empty() && !allow_empty {
                return Err(HandlerErr::bad_params(format!(
                    "patch.{} must not be empty",
                    key
                )));
            }
            Ok(Some(t.to_string()))
        }
    }
}

fn parse_patch(params: &serde_json::Value) -> Result<ClassPatch, HandlerErr> {
    let Some(patch) = params.get("patch").and_then(|v| v.as_object()) else {
        return Err(HandlerErr::bad_params("missing patch"));
    };

    let date = match patch_text(patch, "date", false)? {
        Some(raw) => Some(
            schedule::parse_date(&raw).map_err(|e| HandlerErr::bad_params(e.to_string()))?,
        ),
        None => None,
    };
    let time = match patch_text(patch, "time", false)? {
        Some(raw) => Some(
            schedule::parse_time(&raw).map_err(|e| HandlerErr::bad_params(e.to_string()))?,
        ),
        None => None,
    };

    Ok(ClassPatch {
        subject: patch_text(patch, "subject", false)?,
        classroom: patch_text(patch, "classroom", false)?,
        date,
        time,
        description: patch_text(patch, "description", true)?,
    })
}

fn edit_class(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let who = require_staff(req)?;
    let conn = db_conn(state)?;
    let class_id = get_required_id(&req.params, "classId")?;
    let patch = parse_patch(&req.params)?;

    let record = registry::update_class(conn, class_id, &patch)?;
    tracing::info!(class_id, by = %who.username, "make-up class edited");
    Ok(json!({ "class": record.view(state.settings.tz(), Utc::now()) }))
}

fn delete_class(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let who = require_staff(req)?;
    let conn = db_conn(state)?;
    let class_id = get_required_id(&req.params, "classId")?;

    let removed = registry::delete_class(conn, class_id)?;
    tracing::info!(
        class_id,
        attendance_removed = removed,
        by = %who.username,
        "make-up class deleted"
    );
    Ok(json!({
        "deleted": true,
        "classId": class_id,
        "attendanceRemoved": removed,
    }))
}

fn class_status(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    require_identity(req)?;
    let conn = db_conn(state)?;
    let code = codes::normalize(&get_required_str(&req.params, "remedialCode")?);

    let Some(record) = registry::find_class_by_code(conn, &code)? else {
        return Err(HandlerErr::new("invalid_code", format!("invalid remedial code {}", code))
            .with_details(json!({ "code": code })));
    };
    let status = record.status(state.settings.tz(), Utc::now());
    Ok(json!({
        "code": record.remedial_code,
        "subject": record.subject,
        "date": record.date,
        "time": record.time,
        "status": status.as_str(),
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "faculty.createClass" => Some(respond_created(req, create_class(state, req))),
        "faculty.classes" => Some(respond(req, list_classes(state, req))),
        "faculty.editClass" => Some(respond(req, edit_class(state, req))),
        "faculty.deleteClass" => Some(respond(req, delete_class(state, req))),
        "classes.status" => Some(respond(req, class_status(state, req))),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_class_requires_core_fields() {
        let missing = json!({ "subject": "Math", "classroom": "101", "date": "2099-01-01" });
        let e = parse_new_class(&missing).unwrap_err();
        assert_eq!(e.code, "bad_params");
        assert_eq!(e.message, "missing time");
    }

    #[test]
    fn new_class_rejects_malformed_date_and_code() {
        let bad_date = json!({
            "subject": "Math", "classroom": "101", "date": "01-01-2099", "time": "10:00"
        });
        assert_eq!(parse_new_class(&bad_date).unwrap_err().code, "bad_params");

        let bad_code = json!({
            "subject": "Math", "classroom": "101", "date": "2099-01-01", "time": "10:00",
            "remedialCode": "not a code!"
        });
        assert_eq!(parse_new_class(&bad_code).unwrap_err().code, "bad_params");
    }

    #[test]
    fn supplied_code_is_normalized() {
        let p = json!({
            "subject": "Math", "classroom": "101", "date": "2099-01-01", "time": "10:00",
            "remedialCode": " math-7 "
        });
        let new = parse_new_class(&p).expect("parse");
        assert_eq!(new.remedial_code.as_deref(), Some("MATH-7"));
        assert_eq!(new.description, "");
    }

    #[test]
    fn patch_allows_clearing_description_but_not_subject() {
        let ok = parse_patch(&json!({ "patch": { "description": "" } })).expect("patch");
        assert_eq!(ok.description.as_deref(), Some(""));
        assert!(parse_patch(&json!({ "patch": { "subject": " " } })).is_err());
        assert!(parse_patch(&json!({})).is_err());
    }
}
