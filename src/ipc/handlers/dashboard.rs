use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{db_conn, require_staff, respond};
use crate::ipc::types::{AppState, Request};
use crate::stats;
use serde_json::json;

fn dashboard(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    require_staff(req)?;
    let conn = db_conn(state)?;
    let summary = stats::dashboard_summary(conn, state.settings.recent_activity_limit)?;
    serde_json::to_value(summary)
        .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))
}

fn analytics(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    require_staff(req)?;
    let conn = db_conn(state)?;
    let trend = stats::monthly_trend(conn, state.settings.tz())?;
    Ok(json!({ "trend": trend }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "dashboard.get" => Some(respond(req, dashboard(state, req))),
        "ai.analytics" => Some(respond(req, analytics(state, req))),
        _ => None,
    }
}
