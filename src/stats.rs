use crate::schedule::{self, ClassStatus};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

/// Two-decimal rounding used for every reported rate.
pub fn round_2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// `part / whole * 100`, rounded to 2 decimals and clamped to `[0, 100]`.
/// A zero (or negative) denominator yields 0.
pub fn percentage(part: i64, whole: i64) -> f64 {
    if whole <= 0 || part <= 0 {
        return 0.0;
    }
    let raw = 100.0 * part as f64 / whole as f64;
    round_2(raw.clamp(0.0, 100.0))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub total_classes: i64,
    pub total_students: i64,
    pub total_attendance: i64,
    pub attendance_rate: f64,
    pub recent_activity: Vec<RecentActivity>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentActivity {
    pub student: String,
    pub roll_number: String,
    pub subject: String,
    pub code: String,
    pub marked_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthCount {
    pub month: String,
    pub attendance: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentMetrics {
    pub total_sessions: i64,
    pub attended_sessions: i64,
    pub attendance_rate: f64,
    pub pending_sessions: i64,
}

fn count(conn: &Connection, sql: &str) -> rusqlite::Result<i64> {
    conn.query_row(sql, [], |r| r.get(0))
}

pub fn dashboard_summary(conn: &Connection, recent_limit: usize) -> rusqlite::Result<DashboardSummary> {
    let total_classes = count(conn, "SELECT COUNT(*) FROM makeup_classes")?;
    let total_students = count(conn, "SELECT COUNT(*) FROM students")?;
    let total_attendance = count(conn, "SELECT COUNT(*) FROM attendance")?;
    Ok(DashboardSummary {
        total_classes,
        total_students,
        total_attendance,
        attendance_rate: percentage(total_attendance, total_classes),
        recent_activity: recent_activity(conn, recent_limit)?,
    })
}

pub fn recent_activity(conn: &Connection, limit: usize) -> rusqlite::Result<Vec<RecentActivity>> {
    let mut stmt = conn.prepare(
        "SELECT s.name, s.roll_number, c.subject, c.remedial_code, a.marked_at
         FROM attendance a
         JOIN students s ON s.id = a.student_id
         JOIN makeup_classes c ON c.id = a.class_id
         ORDER BY a.marked_at DESC, a.id DESC
         LIMIT ?",
    )?;
    let rows = stmt.query_map([limit as i64], |r| {
        Ok(RecentActivity {
            student: r.get(0)?,
            roll_number: r.get(1)?,
            subject: r.get(2)?,
            code: r.get(3)?,
            marked_at: r.get(4)?,
        })
    })?;
    rows.collect()
}

/// Attendance rows per calendar month of `marked_at`, read in `tz`, oldest first.
pub fn monthly_trend(conn: &Connection, tz: Tz) -> rusqlite::Result<Vec<MonthCount>> {
    let mut stmt = conn.prepare("SELECT marked_at FROM attendance")?;
    let stamps = stmt
        .query_map([], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    let mut by_month: BTreeMap<String, i64> = BTreeMap::new();
    for stamp in stamps {
        let month = match DateTime::parse_from_rfc3339(&stamp) {
            Ok(dt) => dt.with_timezone(&tz).format("%Y-%m").to_string(),
            // Fall back to the stored prefix rather than dropping the row.
            Err(_) => stamp.chars().take(7).collect(),
        };
        *by_month.entry(month).or_insert(0) += 1;
    }

    Ok(by_month
        .into_iter()
        .map(|(month, attendance)| MonthCount { month, attendance })
        .collect())
}

/// Metrics for one student. `student_id` is `None` for a caller who has
/// never marked attendance (and so has no student row yet).
pub fn student_metrics(
    conn: &Connection,
    student_id: Option<i64>,
    tz: Tz,
    now: DateTime<Utc>,
) -> rusqlite::Result<StudentMetrics> {
    let attended: HashSet<i64> = match student_id {
        Some(sid) => {
            let mut stmt = conn.prepare("SELECT class_id FROM attendance WHERE student_id = ?")?;
            let ids = stmt.query_map([sid], |r| r.get::<_, i64>(0))?;
            ids.collect::<Result<HashSet<_>, _>>()?
        }
        None => HashSet::new(),
    };

    let mut stmt = conn.prepare("SELECT id, date, time FROM makeup_classes")?;
    let classes = stmt
        .query_map([], |r| {
            Ok((
                r.get::<_, i64>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let total_sessions = classes.len() as i64;
    let attended_sessions = attended.len() as i64;
    let pending_sessions = classes
        .iter()
        .filter(|(id, _, _)| !attended.contains(id))
        .filter(|(_, date, time)| {
            schedule::status_of_stored(date, time, tz, now) == ClassStatus::Active
        })
        .count() as i64;

    Ok(StudentMetrics {
        total_sessions,
        attended_sessions,
        attendance_rate: percentage(attended_sessions, total_sessions),
        pending_sessions,
    })
}

pub fn student_id_by_roll(conn: &Connection, roll_number: &str) -> rusqlite::Result<Option<i64>> {
    conn.query_row(
        "SELECT id FROM students WHERE roll_number = ?",
        [roll_number],
        |r| r.get(0),
    )
    .optional()
}
