//! The attendance ledger: one row per (student, make-up class) pair.
//!
//! Marking goes through [`AttendanceStore`] so that the conflict signal comes
//! from the storage layer's unique constraint, never from a prior lookup.

use crate::codes;
use crate::db::{self, DbOp};
use crate::schedule::{self, ClassStatus};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use rusqlite::{Connection, OptionalExtension};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassRef {
    pub id: i64,
    pub code: String,
    pub subject: String,
    pub date: String,
    pub time: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentRef {
    pub id: i64,
    pub roll_number: String,
    pub name: String,
}

/// What is known about the student when marking. Only `roll_number` is used
/// to find an existing row; the rest seeds a newly created one.
#[derive(Debug, Clone, Copy)]
pub struct StudentProfile<'a> {
    pub roll_number: &'a str,
    pub name: &'a str,
    pub email: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted { marked_at: String },
    AlreadyMarked,
}

#[derive(Debug)]
pub enum LedgerError {
    UnknownCode(String),
    AlreadyMarked { roll_number: String, code: String },
    ClassExpired(String),
    EmailTaken(String),
    Storage(DbOp, rusqlite::Error),
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerError::UnknownCode(code) => write!(f, "invalid remedial code {}", code),
            LedgerError::AlreadyMarked { roll_number, code } => write!(
                f,
                "attendance already marked for {} in {}",
                roll_number, code
            ),
            LedgerError::ClassExpired(code) => write!(f, "class {} has expired", code),
            LedgerError::EmailTaken(email) => {
                write!(f, "email {} belongs to another student", email)
            }
            LedgerError::Storage(_, e) => write!(f, "storage error: {}", e),
        }
    }
}

impl std::error::Error for LedgerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LedgerError::Storage(_, e) => Some(e),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for LedgerError {
    fn from(e: rusqlite::Error) -> Self {
        LedgerError::Storage(DbOp::Query, e)
    }
}

pub trait AttendanceStore {
    fn find_class_by_code(&self, code: &str) -> Result<Option<ClassRef>, LedgerError>;

    fn find_or_create_student(&self, profile: &StudentProfile<'_>) -> Result<StudentRef, LedgerError>;

    /// Inserts the pair unless it is already recorded. The unique constraint
    /// decides; callers must not pre-check.
    fn insert_attendance_if_absent(
        &self,
        student_id: i64,
        class_id: i64,
    ) -> Result<InsertOutcome, LedgerError>;
}

pub struct SqliteStore<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }
}

impl AttendanceStore for SqliteStore<'_> {
    fn find_class_by_code(&self, code: &str) -> Result<Option<ClassRef>, LedgerError> {
        let found = self
            .conn
            .query_row(
                "SELECT id, remedial_code, subject, date, time
                 FROM makeup_classes
                 WHERE remedial_code = ?",
                [code],
                |r| {
                    Ok(ClassRef {
                        id: r.get(0)?,
                        code: r.get(1)?,
                        subject: r.get(2)?,
                        date: r.get(3)?,
                        time: r.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(found)
    }

    fn find_or_create_student(&self, profile: &StudentProfile<'_>) -> Result<StudentRef, LedgerError> {
        if let Some(found) = student_by_roll(self.conn, profile.roll_number)? {
            return Ok(found);
        }

        let inserted = self.conn.execute(
            "INSERT INTO students(name, roll_number, email) VALUES(?, ?, ?)",
            (profile.name, profile.roll_number, profile.email),
        );
        match inserted {
            Ok(_) => {
                tracing::info!(roll_number = profile.roll_number, "created student");
            }
            Err(e) => match db::unique_violation(&e) {
                // Lost a race with another writer creating the same student.
                Some(target) if target.contains("roll_number") => {}
                Some(target) if target.contains("email") => {
                    return Err(LedgerError::EmailTaken(
                        profile.email.unwrap_or_default().to_string(),
                    ));
                }
                _ => return Err(LedgerError::Storage(DbOp::Insert, e)),
            },
        }

        student_by_roll(self.conn, profile.roll_number)?
            .ok_or(LedgerError::Storage(DbOp::Query, rusqlite::Error::QueryReturnedNoRows))
    }

    fn insert_attendance_if_absent(
        &self,
        student_id: i64,
        class_id: i64,
    ) -> Result<InsertOutcome, LedgerError> {
        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(|e| LedgerError::Storage(DbOp::Tx, e))?;
        let marked_at = db::now_stamp();
        let res = tx.execute(
            "INSERT INTO attendance(student_id, class_id, marked_at) VALUES(?, ?, ?)",
            (student_id, class_id, &marked_at),
        );
        match res {
            Ok(_) => {
                tx.commit()
                    .map_err(|e| LedgerError::Storage(DbOp::Commit, e))?;
                Ok(InsertOutcome::Inserted { marked_at })
            }
            Err(e) if db::unique_violation(&e).is_some() => {
                tx.rollback().map_err(|e| LedgerError::Storage(DbOp::Tx, e))?;
                Ok(InsertOutcome::AlreadyMarked)
            }
            Err(e) => Err(LedgerError::Storage(DbOp::Insert, e)),
        }
    }
}

fn student_by_roll(conn: &Connection, roll_number: &str) -> rusqlite::Result<Option<StudentRef>> {
    conn.query_row(
        "SELECT id, roll_number, name FROM students WHERE roll_number = ?",
        [roll_number],
        |r| {
            Ok(StudentRef {
                id: r.get(0)?,
                roll_number: r.get(1)?,
                name: r.get(2)?,
            })
        },
    )
    .optional()
}

#[derive(Debug, Clone, Copy)]
pub struct MarkOptions {
    pub reject_expired: bool,
    pub tz: Tz,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkReceipt {
    pub class: ClassRef,
    pub student: StudentRef,
    pub marked_at: String,
}

pub fn mark_attendance<S: AttendanceStore>(
    store: &S,
    raw_code: &str,
    profile: &StudentProfile<'_>,
    opts: MarkOptions,
) -> Result<MarkReceipt, LedgerError> {
    let code = codes::normalize(raw_code);
    let class = store
        .find_class_by_code(&code)?
        .ok_or_else(|| LedgerError::UnknownCode(code.clone()))?;

    if opts.reject_expired
        && schedule::status_of_stored(&class.date, &class.time, opts.tz, opts.now)
            == ClassStatus::Expired
    {
        return Err(LedgerError::ClassExpired(class.code));
    }

    let student = store.find_or_create_student(profile)?;
    match store.insert_attendance_if_absent(student.id, class.id)? {
        InsertOutcome::Inserted { marked_at } => Ok(MarkReceipt {
            class,
            student,
            marked_at,
        }),
        InsertOutcome::AlreadyMarked => Err(LedgerError::AlreadyMarked {
            roll_number: student.roll_number,
            code: class.code,
        }),
    }
}
