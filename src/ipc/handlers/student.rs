use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{
    db_conn, get_optional_str, get_required_str, require_identity, respond, respond_created,
};
use crate::ipc::types::{AppState, Identity, Request};
use crate::ledger::{self, MarkOptions, SqliteStore, StudentProfile};
use crate::schedule;
use crate::stats;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use rusqlite::Connection;
use serde::Serialize;
use serde_json::json;

/// Roll number the request acts on. Students always act as themselves and any
/// `rollNumber` param is ignored; staff must name the student with `rollNumber`.
fn target_roll(who: &Identity, params: &serde_json::Value) -> Result<String, HandlerErr> {
    if who.staff {
        return get_optional_str(params, "rollNumber")?.ok_or_else(|| {
            HandlerErr::bad_params("staff callers must pass rollNumber to act for a student")
        });
    }
    Ok(who.username.trim().to_string())
}

/// Profile used if the student row has to be created.
#[derive(Debug, Clone, PartialEq, Eq)]
struct TargetStudent {
    roll_number: String,
    name: String,
    email: Option<String>,
}

fn non_blank(v: Option<&str>) -> Option<String> {
    v.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// A student marking for themselves is described by their identity. Staff
/// marking on a student's behalf describe the student through params only.
fn target_student(who: &Identity, params: &serde_json::Value) -> Result<TargetStudent, HandlerErr> {
    let roll_number = target_roll(who, params)?;
    let (name, email) = if who.staff {
        (
            get_optional_str(params, "name")?,
            get_optional_str(params, "email")?,
        )
    } else {
        (non_blank(who.name.as_deref()), non_blank(who.email.as_deref()))
    };
    Ok(TargetStudent {
        name: name.unwrap_or_else(|| roll_number.clone()),
        email,
        roll_number,
    })
}

fn mark_attendance(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let who = require_identity(req)?;
    let conn = db_conn(state)?;
    let code = get_required_str(&req.params, "remedialCode")?;
    let target = target_student(who, &req.params)?;

    let profile = StudentProfile {
        roll_number: &target.roll_number,
        name: &target.name,
        email: target.email.as_deref(),
    };
    let opts = MarkOptions {
        reject_expired: state.settings.reject_expired,
        tz: state.settings.tz(),
        now: Utc::now(),
    };

    let store = SqliteStore::new(conn);
    let receipt = ledger::mark_attendance(&store, &code, &profile, opts)?;
    tracing::info!(
        roll_number = %receipt.student.roll_number,
        code = %receipt.class.code,
        by = %who.username,
        "attendance marked"
    );

    Ok(json!({
        "message": "Attendance marked",
        "code": receipt.class.code,
        "subject": receipt.class.subject,
        "markedAt": receipt.marked_at,
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HistoryRecord {
    code: String,
    subject: String,
    date: String,
    time: String,
    status: &'static str,
    marked_at: String,
}

fn history_for(
    conn: &Connection,
    roll_number: &str,
    tz: Tz,
    now: DateTime<Utc>,
) -> rusqlite::Result<Vec<HistoryRecord>> {
    let mut stmt = conn.prepare(
        "SELECT c.remedial_code, c.subject, c.date, c.time, a.marked_at
         FROM attendance a
         JOIN makeup_classes c ON c.id = a.class_id
         JOIN students s ON s.id = a.student_id
         WHERE s.roll_number = ?
         ORDER BY a.marked_at DESC, a.id DESC",
    )?;
    let rows = stmt.query_map([roll_number], |r| {
        let date: String = r.get(2)?;
        let time: String = r.get(3)?;
        let status = schedule::status_of_stored(&date, &time, tz, now).as_str();
        Ok(HistoryRecord {
            code: r.get(0)?,
            subject: r.get(1)?,
            date,
            time,
            status,
            marked_at: r.get(4)?,
        })
    })?;
    rows.collect()
}

fn history(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let who = require_identity(req)?;
    let conn = db_conn(state)?;
    let roll_number = target_roll(who, &req.params)?;
    let records = history_for(conn, &roll_number, state.settings.tz(), Utc::now())?;
    Ok(json!({ "rollNumber": roll_number, "records": records }))
}

fn metrics(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let who = require_identity(req)?;
    let conn = db_conn(state)?;
    let roll_number = target_roll(who, &req.params)?;
    let student_id = stats::student_id_by_roll(conn, &roll_number)?;
    let m = stats::student_metrics(conn, student_id, state.settings.tz(), Utc::now())?;
    serde_json::to_value(m).map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "student.markAttendance" => Some(respond_created(req, mark_attendance(state, req))),
        "student.history" => Some(respond(req, history(state, req))),
        "student.metrics" => Some(respond(req, metrics(state, req))),
        _ => None,
    }
}
