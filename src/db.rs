use chrono::{SecondsFormat, Utc};
use rusqlite::{ffi, Connection, ErrorCode};
use std::path::Path;
use std::time::Duration;

pub const DB_FILE_NAME: &str = "makeup.sqlite3";

pub fn open_db(workspace: &Path, busy_timeout: Duration) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(busy_timeout)?;
    init_schema(&conn)?;
    Ok(conn)
}

#[cfg(test)]
pub fn open_in_memory() -> anyhow::Result<Connection> {
    let conn = Connection::open_in_memory()?;
    init_schema(&conn)?;
    Ok(conn)
}

fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS faculty(
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT NOT NULL UNIQUE
        )",
        [],
    )?;

    // email stays nullable: students created from a bare identity may not carry one.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            roll_number TEXT NOT NULL UNIQUE,
            email TEXT UNIQUE
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS makeup_classes(
            id INTEGER PRIMARY KEY,
            subject TEXT NOT NULL,
            classroom TEXT NOT NULL,
            date TEXT NOT NULL,
            time TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            remedial_code TEXT NOT NULL UNIQUE
                CHECK(length(remedial_code) BETWEEN 1 AND 12),
            created_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_makeup_classes_date ON makeup_classes(date, time)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance(
            id INTEGER PRIMARY KEY,
            student_id INTEGER NOT NULL,
            class_id INTEGER NOT NULL,
            marked_at TEXT NOT NULL,
            FOREIGN KEY(student_id) REFERENCES students(id) ON DELETE CASCADE,
            FOREIGN KEY(class_id) REFERENCES makeup_classes(id) ON DELETE CASCADE,
            UNIQUE(student_id, class_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_class ON attendance(class_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_marked_at ON attendance(marked_at)",
        [],
    )?;

    Ok(())
}

/// UTC timestamp in the format stored in `created_at` / `marked_at`.
pub fn now_stamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// The kind of statement a storage error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbOp {
    Query,
    Insert,
    Update,
    Delete,
    Tx,
    Commit,
}

impl DbOp {
    /// Wire error code for a failure of this kind.
    pub fn error_code(self) -> &'static str {
        match self {
            DbOp::Query => "db_query_failed",
            DbOp::Insert => "db_insert_failed",
            DbOp::Update => "db_update_failed",
            DbOp::Delete => "db_delete_failed",
            DbOp::Tx => "db_tx_failed",
            DbOp::Commit => "db_commit_failed",
        }
    }
}

/// If `e` is a UNIQUE or PRIMARY KEY violation, returns the constraint target
/// as SQLite reports it, e.g. `"students.email"` or
/// `"attendance.student_id, attendance.class_id"`.
pub fn unique_violation(e: &rusqlite::Error) -> Option<String> {
    let rusqlite::Error::SqliteFailure(inner, msg) = e else {
        return None;
    };
    if inner.code != ErrorCode::ConstraintViolation {
        return None;
    }
    if inner.extended_code != ffi::SQLITE_CONSTRAINT_UNIQUE
        && inner.extended_code != ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    {
        return None;
    }
    let target = msg
        .as_deref()
        .map(|m| m.trim_start_matches("UNIQUE constraint failed: "))
        .unwrap_or("")
        .to_string();
    Some(target)
}
