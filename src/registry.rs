use crate::codes;
use crate::db::{self, DbOp};
use crate::schedule::{self, ClassStatus};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use rusqlite::{Connection, OptionalExtension, Row};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone)]
pub struct NewClass {
    pub subject: String,
    pub classroom: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub description: String,
    /// Caller-chosen code, already normalized and validated.
    pub remedial_code: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ClassPatch {
    pub subject: Option<String>,
    pub classroom: Option<String>,
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
    pub description: Option<String>,
}

impl ClassPatch {
    pub fn is_empty(&self) -> bool {
        self.subject.is_none()
            && self.classroom.is_none()
            && self.date.is_none()
            && self.time.is_none()
            && self.description.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassRecord {
    pub id: i64,
    pub subject: String,
    pub classroom: String,
    pub date: String,
    pub time: String,
    pub description: String,
    pub remedial_code: String,
    pub created_at: String,
    pub students: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassView {
    pub id: i64,
    pub subject: String,
    pub classroom: String,
    pub date: String,
    pub time: String,
    pub description: String,
    pub code: String,
    pub students: i64,
    pub status: &'static str,
    pub created_at: String,
}

impl ClassRecord {
    pub fn status(&self, tz: Tz, now: DateTime<Utc>) -> ClassStatus {
        schedule::status_of_stored(&self.date, &self.time, tz, now)
    }

    pub fn view(self, tz: Tz, now: DateTime<Utc>) -> ClassView {
        let status = self.status(tz, now).as_str();
        ClassView {
            id: self.id,
            subject: self.subject,
            classroom: self.classroom,
            date: self.date,
            time: self.time,
            description: self.description,
            code: self.remedial_code,
            students: self.students,
            status,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug)]
pub enum RegistryError {
    NotFound(i64),
    CodeTaken(String),
    CodeExhausted(usize),
    Storage(DbOp, rusqlite::Error),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::NotFound(id) => write!(f, "class {} not found", id),
            RegistryError::CodeTaken(code) => write!(f, "remedial code {} is already in use", code),
            RegistryError::CodeExhausted(n) => {
                write!(f, "no unique remedial code after {} attempts", n)
            }
            RegistryError::Storage(_, e) => write!(f, "storage error: {}", e),
        }
    }
}

impl std::error::Error for RegistryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RegistryError::Storage(_, e) => Some(e),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for RegistryError {
    fn from(e: rusqlite::Error) -> Self {
        RegistryError::Storage(DbOp::Query, e)
    }
}

fn failed(op: DbOp) -> impl FnOnce(rusqlite::Error) -> RegistryError {
    move |e| RegistryError::Storage(op, e)
}

const CLASS_COLUMNS: &str = "c.id, c.subject, c.classroom, c.date, c.time, c.description,
    c.remedial_code, c.created_at,
    (SELECT COUNT(*) FROM attendance a WHERE a.class_id = c.id) AS students";

fn class_from_row(r: &Row<'_>) -> rusqlite::Result<ClassRecord> {
    Ok(ClassRecord {
        id: r.get(0)?,
        subject: r.get(1)?,
        classroom: r.get(2)?,
        date: r.get(3)?,
        time: r.get(4)?,
        description: r.get(5)?,
        remedial_code: r.get(6)?,
        created_at: r.get(7)?,
        students: r.get(8)?,
    })
}

pub fn create_class(
    conn: &Connection,
    new: &NewClass,
    attempts: usize,
) -> Result<ClassRecord, RegistryError> {
    create_class_with(conn, new, attempts, codes::generate)
}

/// Inserts the class, drawing codes from `generate` until one is free.
///
/// A caller-supplied code is tried once; a clash is `CodeTaken`.
pub fn create_class_with<F>(
    conn: &Connection,
    new: &NewClass,
    attempts: usize,
    mut generate: F,
) -> Result<ClassRecord, RegistryError>
where
    F: FnMut() -> String,
{
    let date = new.date.format(schedule::DATE_FORMAT).to_string();
    let time = new.time.format(schedule::TIME_FORMAT).to_string();
    let created_at = db::now_stamp();

    let tries = if new.remedial_code.is_some() {
        1
    } else {
        attempts.max(1)
    };
    for attempt in 1..=tries {
        let code = match &new.remedial_code {
            Some(c) => c.clone(),
            None => generate(),
        };
        let res = conn.execute(
            "INSERT INTO makeup_classes(subject, classroom, date, time, description, remedial_code, created_at)
             VALUES(?, ?, ?, ?, ?, ?, ?)",
            (
                &new.subject,
                &new.classroom,
                &date,
                &time,
                &new.description,
                &code,
                &created_at,
            ),
        );
        match res {
            Ok(_) => {
                let id = conn.last_insert_rowid();
                return find_class(conn, id)?.ok_or(RegistryError::NotFound(id));
            }
            Err(e) if db::unique_violation(&e).is_some() => {
                if new.remedial_code.is_some() {
                    return Err(RegistryError::CodeTaken(code));
                }
                tracing::warn!(attempt, code = %code, "remedial code collision, regenerating");
            }
            Err(e) => return Err(RegistryError::Storage(DbOp::Insert, e)),
        }
    }
    Err(RegistryError::CodeExhausted(tries))
}

pub fn find_class(conn: &Connection, id: i64) -> rusqlite::Result<Option<ClassRecord>> {
    let sql = format!("SELECT {} FROM makeup_classes c WHERE c.id = ?", CLASS_COLUMNS);
    conn.query_row(&sql, [id], class_from_row).optional()
}

pub fn find_class_by_code(conn: &Connection, code: &str) -> rusqlite::Result<Option<ClassRecord>> {
    let sql = format!(
        "SELECT {} FROM makeup_classes c WHERE c.remedial_code = ?",
        CLASS_COLUMNS
    );
    conn.query_row(&sql, [code], class_from_row).optional()
}

/// Every class, soonest first.
pub fn list_classes(conn: &Connection) -> rusqlite::Result<Vec<ClassRecord>> {
    let sql = format!(
        "SELECT {} FROM makeup_classes c ORDER BY c.date, c.time, c.id",
        CLASS_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], class_from_row)?;
    rows.collect()
}

pub fn update_class(
    conn: &Connection,
    id: i64,
    patch: &ClassPatch,
) -> Result<ClassRecord, RegistryError> {
    let Some(current) = find_class(conn, id)? else {
        return Err(RegistryError::NotFound(id));
    };
    if patch.is_empty() {
        return Ok(current);
    }

    let subject = patch.subject.clone().unwrap_or(current.subject);
    let classroom = patch.classroom.clone().unwrap_or(current.classroom);
    let date = patch
        .date
        .map(|d| d.format(schedule::DATE_FORMAT).to_string())
        .unwrap_or(current.date);
    let time = patch
        .time
        .map(|t| t.format(schedule::TIME_FORMAT).to_string())
        .unwrap_or(current.time);
    let description = patch.description.clone().unwrap_or(current.description);

    conn.execute(
        "UPDATE makeup_classes
         SET subject = ?, classroom = ?, date = ?, time = ?, description = ?
         WHERE id = ?",
        (&subject, &classroom, &date, &time, &description, id),
    )
    .map_err(failed(DbOp::Update))?;
    find_class(conn, id)?.ok_or(RegistryError::NotFound(id))
}

/// Deletes the class and its attendance rows. Returns the number of
/// attendance rows removed.
pub fn delete_class(conn: &Connection, id: i64) -> Result<usize, RegistryError> {
    let tx = conn.unchecked_transaction().map_err(failed(DbOp::Tx))?;
    let exists: Option<i64> = tx
        .query_row("SELECT 1 FROM makeup_classes WHERE id = ?", [id], |r| r.get(0))
        .optional()?;
    if exists.is_none() {
        return Err(RegistryError::NotFound(id));
    }
    // Explicit even though the foreign key cascades, so the count is known.
    let removed = tx
        .execute("DELETE FROM attendance WHERE class_id = ?", [id])
        .map_err(failed(DbOp::Delete))?;
    tx.execute("DELETE FROM makeup_classes WHERE id = ?", [id])
        .map_err(failed(DbOp::Delete))?;
    tx.commit().map_err(failed(DbOp::Commit))?;
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn math(code: Option<&str>) -> NewClass {
        NewClass {
            subject: "Math".into(),
            classroom: "101".into(),
            date: schedule::parse_date("2099-01-01").unwrap(),
            time: schedule::parse_time("10:00").unwrap(),
            description: String::new(),
            remedial_code: code.map(str::to_string),
        }
    }

    #[test]
    fn created_class_gets_a_generated_code() {
        let conn = db::open_in_memory().expect("db");
        let c = create_class(&conn, &math(None), 5).expect("create");
        assert_eq!(c.remedial_code.len(), codes::GENERATED_LEN);
        assert_eq!(c.date, "2099-01-01");
        assert_eq!(c.time, "10:00");
        assert_eq!(c.students, 0);
        assert_eq!(c.status(Tz::UTC, Utc::now()), ClassStatus::Active);
    }

    #[test]
    fn generated_collision_is_retried() {
        let conn = db::open_in_memory().expect("db");
        create_class(&conn, &math(Some("DUPE0001")), 5).expect("first");

        let mut queue = vec!["FRESH001".to_string(), "DUPE0001".to_string()];
        let c = create_class_with(&conn, &math(None), 5, || queue.pop().unwrap_or_default())
            .expect("retry");
        assert_eq!(c.remedial_code, "FRESH001");
    }

    #[test]
    fn endless_collisions_give_up() {
        let conn = db::open_in_memory().expect("db");
        create_class(&conn, &math(Some("DUPE0001")), 5).expect("first");
        let res = create_class_with(&conn, &math(None), 3, || "DUPE0001".to_string());
        assert!(matches!(res, Err(RegistryError::CodeExhausted(3))));
        assert_eq!(list_classes(&conn).expect("list").len(), 1);
    }

    #[test]
    fn supplied_code_clash_is_not_retried() {
        let conn = db::open_in_memory().expect("db");
        create_class(&conn, &math(Some("MATH-1")), 5).expect("first");
        let res = create_class(&conn, &math(Some("MATH-1")), 5);
        assert!(matches!(res, Err(RegistryError::CodeTaken(ref c)) if c == "MATH-1"));
    }

    #[test]
    fn codes_are_unique_across_many_classes() {
        let conn = db::open_in_memory().expect("db");
        for _ in 0..50 {
            create_class(&conn, &math(None), 5).expect("create");
        }
        let distinct: i64 = conn
            .query_row(
                "SELECT COUNT(DISTINCT remedial_code) FROM makeup_classes WHERE remedial_code <> ''",
                [],
                |r| r.get(0),
            )
            .expect("count");
        assert_eq!(distinct, 50);
    }

    #[test]
    fn update_applies_only_patched_fields() {
        let conn = db::open_in_memory().expect("db");
        let c = create_class(&conn, &math(None), 5).expect("create");
        let patch = ClassPatch {
            classroom: Some("B-12".into()),
            time: Some(schedule::parse_time("14:30").unwrap()),
            ..ClassPatch::default()
        };
        let u = update_class(&conn, c.id, &patch).expect("update");
        assert_eq!(u.subject, "Math");
        assert_eq!(u.classroom, "B-12");
        assert_eq!(u.time, "14:30");
        assert_eq!(u.remedial_code, c.remedial_code);

        assert!(matches!(
            update_class(&conn, 999, &patch),
            Err(RegistryError::NotFound(999))
        ));
    }

    #[test]
    fn delete_reports_removed_attendance() {
        let conn = db::open_in_memory().expect("db");
        let c = create_class(&conn, &math(None), 5).expect("create");
        conn.execute(
            "INSERT INTO students(id, name, roll_number) VALUES(1, 'A', 'R1')",
            [],
        )
        .expect("student");
        conn.execute(
            "INSERT INTO attendance(student_id, class_id, marked_at) VALUES(1, ?, '2026-10-16T10:00:00Z')",
            [c.id],
        )
        .expect("attendance");

        assert_eq!(delete_class(&conn, c.id).expect("delete"), 1);
        assert!(find_class(&conn, c.id).expect("find").is_none());
        assert!(matches!(
            delete_class(&conn, c.id),
            Err(RegistryError::NotFound(_))
        ));
    }

    #[test]
    fn failed_writes_report_the_statement_kind() {
        let conn = db::open_in_memory().expect("db");
        let c = create_class(&conn, &math(None), 5).expect("create");
        conn.execute_batch(
            "CREATE TRIGGER freeze_update BEFORE UPDATE ON makeup_classes
               BEGIN SELECT RAISE(ABORT, 'frozen'); END;
             CREATE TRIGGER freeze_delete BEFORE DELETE ON makeup_classes
               BEGIN SELECT RAISE(ABORT, 'frozen'); END;",
        )
        .expect("triggers");

        let patch = ClassPatch {
            subject: Some("Physics".into()),
            ..ClassPatch::default()
        };
        assert!(matches!(
            update_class(&conn, c.id, &patch),
            Err(RegistryError::Storage(DbOp::Update, _))
        ));
        assert!(matches!(
            delete_class(&conn, c.id),
            Err(RegistryError::Storage(DbOp::Delete, _))
        ));
        assert!(find_class(&conn, c.id).expect("find").is_some());
    }
}
