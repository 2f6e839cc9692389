use chrono::{
    DateTime, FixedOffset, Local, LocalResult, NaiveDate, NaiveDateTime, Offset, TimeDelta,
    Timelike, Utc,
};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::error::{ModelError, Result};
use crate::time::duration::{CalendarDelta, CalendarDeltaSpec};

/// Timezone-aware instant used throughout the model
pub type Timestamp = DateTime<FixedOffset>;

/// Resolves a naive wall-clock time against the system local timezone.
///
/// Ambiguous wall times (clock rolled back) take the earlier offset;
/// skipped wall times (clock jumped forward) resolve through the offset
/// in force after the transition.
pub fn make_aware(naive: NaiveDateTime) -> Timestamp {
    match naive.and_local_timezone(Local) {
        LocalResult::Single(dt) => dt.fixed_offset(),
        LocalResult::Ambiguous(earlier, _) => earlier.fixed_offset(),
        LocalResult::None => {
            let offset = match (naive + TimeDelta::days(1)).and_local_timezone(Local) {
                LocalResult::Single(dt) => *dt.offset(),
                LocalResult::Ambiguous(dt, _) => *dt.offset(),
                LocalResult::None => Utc.fix(),
            };
            at_offset(naive, offset)
        }
    }
}

/// Reinterprets a wall-clock reading as an instant at the given offset.
pub(crate) fn at_offset(wall: NaiveDateTime, offset: FixedOffset) -> Timestamp {
    DateTime::from_naive_utc_and_offset(wall - offset, offset)
}

/// Parses RFC 3339, a naive `YYYY-MM-DDTHH:MM:SS`, or a bare date read
/// as local midnight; naive readings are normalized through
/// [`make_aware`].
pub fn parse_timestamp(raw: &str) -> Result<Timestamp> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt);
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(make_aware(naive));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(make_aware(naive));
        }
    }
    Err(ModelError::TimestampParse(raw.to_owned()))
}

pub(crate) fn now_local() -> Timestamp {
    Local::now().fixed_offset()
}

/// Current local time truncated to whole seconds.
pub(crate) fn now_second_resolution() -> Timestamp {
    let now = now_local();
    now.with_nanosecond(0).unwrap_or(now)
}

pub(crate) fn is_leap_year(year: i32) -> bool {
    year % 4 == 0 && (year % 100 != 0 || year % 400 == 0)
}

pub(crate) fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if is_leap_year(year) => 29,
        _ => 28,
    }
}

/// A point on the calendar, at date or instant granularity
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Moment {
    Date(NaiveDate),
    Instant(Timestamp),
}

impl Moment {
    /// Parses a bare `YYYY-MM-DD` date, falling back to an instant.
    pub fn parse(raw: &str) -> Result<Moment> {
        if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            return Ok(Moment::Date(date));
        }
        parse_timestamp(raw)
            .map(Moment::Instant)
            .map_err(|_| ModelError::MomentParse(raw.to_owned()))
    }

    /// The calendar date, truncating instants.
    pub fn date(&self) -> NaiveDate {
        match self {
            Moment::Date(date) => *date,
            Moment::Instant(ts) => ts.date_naive(),
        }
    }

    pub fn instant(&self) -> Option<Timestamp> {
        match self {
            Moment::Date(_) => None,
            Moment::Instant(ts) => Some(*ts),
        }
    }

    // Instants compare exactly against each other; any comparison with a
    // date-only side happens at date granularity.
    pub(crate) fn is_after(&self, other: &Moment) -> bool {
        match (self, other) {
            (Moment::Instant(a), Moment::Instant(b)) => a > b,
            _ => self.date() > other.date(),
        }
    }

    pub(crate) fn is_before(&self, other: &Moment) -> bool {
        match (self, other) {
            (Moment::Instant(a), Moment::Instant(b)) => a < b,
            _ => self.date() < other.date(),
        }
    }
}

impl fmt::Display for Moment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Moment::Date(date) => write!(f, "{}", date.format("%Y-%m-%d")),
            Moment::Instant(ts) => write!(f, "{}", ts.to_rfc3339()),
        }
    }
}

impl Serialize for Moment {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Moment {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Moment::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// A template's timing field: an absolute point, or an offset applied at
/// materialization time
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TemplateMoment {
    At(Moment),
    Offset(CalendarDelta),
}

impl Serialize for TemplateMoment {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            TemplateMoment::At(moment) => moment.serialize(serializer),
            TemplateMoment::Offset(delta) => delta.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for TemplateMoment {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Wire {
            Text(String),
            Fields(CalendarDeltaSpec),
        }

        match Wire::deserialize(deserializer)? {
            Wire::Text(raw) => {
                if let Ok(moment) = Moment::parse(&raw) {
                    return Ok(TemplateMoment::At(moment));
                }
                CalendarDelta::parse(&raw)
                    .map(TemplateMoment::Offset)
                    .map_err(serde::de::Error::custom)
            }
            Wire::Fields(spec) => CalendarDelta::try_from(spec)
                .map(TemplateMoment::Offset)
                .map_err(serde::de::Error::custom),
        }
    }
}

pub(crate) fn year_length(year: i32) -> u32 {
    if is_leap_year(year) { 366 } else { 365 }
}
