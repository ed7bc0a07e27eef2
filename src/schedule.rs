use chrono::{
    DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike, Utc,
};
use chrono_tz::Tz;
use std::fmt;

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIME_FORMAT: &str = "%H:%M";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassStatus {
    Active,
    Expired,
}

impl ClassStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ClassStatus::Active => "Active",
            ClassStatus::Expired => "Expired",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    BadDate(String),
    BadTime(String),
    BadTimeZone(String),
}

impl fmt::Display for ScheduleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleError::BadDate(v) => write!(f, "date must be YYYY-MM-DD, got {:?}", v),
            ScheduleError::BadTime(v) => write!(f, "time must be HH:MM, got {:?}", v),
            ScheduleError::BadTimeZone(v) => write!(f, "unknown time zone {:?}", v),
        }
    }
}

impl std::error::Error for ScheduleError {}

pub fn parse_date(raw: &str) -> Result<NaiveDate, ScheduleError> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT)
        .map_err(|_| ScheduleError::BadDate(raw.to_string()))
}

/// Accepts `HH:MM` and `HH:MM:SS`; seconds are dropped.
pub fn parse_time(raw: &str) -> Result<NaiveTime, ScheduleError> {
    let t = raw.trim();
    let parsed = NaiveTime::parse_from_str(t, TIME_FORMAT)
        .or_else(|_| NaiveTime::parse_from_str(t, "%H:%M:%S"))
        .map_err(|_| ScheduleError::BadTime(raw.to_string()))?;
    Ok(parsed.with_second(0).unwrap_or(parsed))
}

pub fn parse_time_zone(name: &str) -> Result<Tz, ScheduleError> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| ScheduleError::BadTimeZone(name.to_string()))
}

/// The instant a class starts, reading its date and time as wall-clock time in `tz`.
///
/// Ambiguous local times (DST fall-back) take the earlier instant. Local times
/// inside a DST gap move forward to the first minute that exists.
pub fn class_instant(date: NaiveDate, time: NaiveTime, tz: Tz) -> DateTime<Utc> {
    let local = NaiveDateTime::new(date, time);
    match tz.from_local_datetime(&local) {
        LocalResult::Single(dt) => dt.with_timezone(&Utc),
        LocalResult::Ambiguous(earlier, _) => earlier.with_timezone(&Utc),
        LocalResult::None => first_valid_after(local, tz),
    }
}

fn first_valid_after(local: NaiveDateTime, tz: Tz) -> DateTime<Utc> {
    for minutes in 1..=(24 * 60) {
        let candidate = local + Duration::minutes(minutes);
        if let Some(dt) = tz.from_local_datetime(&candidate).earliest() {
            return dt.with_timezone(&Utc);
        }
    }
    Utc.from_utc_datetime(&local)
}

/// A class is expired once its start instant is reached.
pub fn derive_status(class_at: DateTime<Utc>, now: DateTime<Utc>) -> ClassStatus {
    if class_at <= now {
        ClassStatus::Expired
    } else {
        ClassStatus::Active
    }
}

pub fn status_of(date: NaiveDate, time: NaiveTime, tz: Tz, now: DateTime<Utc>) -> ClassStatus {
    derive_status(class_instant(date, time, tz), now)
}

/// Status from the stored text columns. Rows that fail to parse count as expired.
pub fn status_of_stored(date: &str, time: &str, tz: Tz, now: DateTime<Utc>) -> ClassStatus {
    match (parse_date(date), parse_time(time)) {
        (Ok(d), Ok(t)) => status_of(d, t, tz, now),
        _ => ClassStatus::Expired,
    }
}
