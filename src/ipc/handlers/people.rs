use crate::db;
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{
    db_conn, get_optional_str, get_required_str, require_staff, respond, respond_created,
};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

/// Maps a unique-constraint failure on `table` to the matching conflict code.
fn conflict(e: rusqlite::Error, table: &str) -> HandlerErr {
    match db::unique_violation(&e) {
        Some(target) if target == format!("{table}.email") => {
            HandlerErr::new("email_taken", "email already registered")
        }
        Some(target) if target == format!("{table}.roll_number") => {
            HandlerErr::new("roll_number_taken", "roll number already registered")
        }
        _ => HandlerErr::new("db_insert_failed", e.to_string())
            .with_details(json!({ "table": table })),
    }
}

fn create_faculty(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let who = require_staff(req)?;
    let conn = db_conn(state)?;
    let name = get_required_str(&req.params, "name")?;
    let email = get_required_str(&req.params, "email")?;

    conn.execute(
        "INSERT INTO faculty(name, email) VALUES(?, ?)",
        (&name, &email),
    )
    .map_err(|e| conflict(e, "faculty"))?;
    let faculty_id = conn.last_insert_rowid();
    tracing::info!(faculty_id, by = %who.username, "faculty created");
    Ok(json!({ "facultyId": faculty_id }))
}

fn list_faculty(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    require_staff(req)?;
    let conn = db_conn(state)?;
    let mut stmt = conn.prepare("SELECT id, name, email FROM faculty ORDER BY name, id")?;
    let faculty = stmt
        .query_map([], |r| {
            Ok(json!({
                "id": r.get::<_, i64>(0)?,
                "name": r.get::<_, String>(1)?,
                "email": r.get::<_, String>(2)?,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "faculty": faculty }))
}

fn create_student(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let who = require_staff(req)?;
    let conn = db_conn(state)?;
    let name = get_required_str(&req.params, "name")?;
    let roll_number = get_required_str(&req.params, "rollNumber")?;
    let email = get_optional_str(&req.params, "email")?;

    conn.execute(
        "INSERT INTO students(name, roll_number, email) VALUES(?, ?, ?)",
        (&name, &roll_number, &email),
    )
    .map_err(|e| conflict(e, "students"))?;
    let student_id = conn.last_insert_rowid();
    tracing::info!(student_id, roll_number = %roll_number, by = %who.username, "student created");
    Ok(json!({ "studentId": student_id }))
}

fn list_students(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    require_staff(req)?;
    let conn = db_conn(state)?;
    let mut stmt = conn.prepare(
        "SELECT s.id, s.name, s.roll_number, s.email,
                (SELECT COUNT(*) FROM attendance a WHERE a.student_id = s.id)
         FROM students s
         ORDER BY s.roll_number",
    )?;
    let students = stmt
        .query_map([], |r| {
            Ok(json!({
                "id": r.get::<_, i64>(0)?,
                "name": r.get::<_, String>(1)?,
                "rollNumber": r.get::<_, String>(2)?,
                "email": r.get::<_, Option<String>>(3)?,
                "attended": r.get::<_, i64>(4)?,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "students": students }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "faculty.create" => Some(respond_created(req, create_faculty(state, req))),
        "faculty.list" => Some(respond(req, list_faculty(state, req))),
        "students.create" => Some(respond_created(req, create_student(state, req))),
        "students.list" => Some(respond(req, list_students(state, req))),
        _ => None,
    }
}
