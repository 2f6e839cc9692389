use std::fmt;

use chrono::{Datelike, NaiveTime, Timelike};
use serde::de::{self, Deserializer, Visitor};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ModelError, Result};
use crate::recur::iter::{RuleIter, gcd, mod_distance};
use crate::recur::{Occurrences, OccurrenceQuery};
use crate::serde_util::{aware_opt, one_or_many};
use crate::time::moment::now_second_resolution;
use crate::time::{Timestamp, Weekday, WeekdayOffset};

/// Recurrence stepping unit, coarsest to finest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Frequency {
    Yearly,
    Monthly,
    Weekly,
    Daily,
    Hourly,
    Minutely,
    Secondly,
}

impl Frequency {
    pub const ALL: [Frequency; 7] = [
        Frequency::Yearly,
        Frequency::Monthly,
        Frequency::Weekly,
        Frequency::Daily,
        Frequency::Hourly,
        Frequency::Minutely,
        Frequency::Secondly,
    ];

    /// Canonical upper-case name.
    pub fn name(self) -> &'static str {
        match self {
            Frequency::Yearly => "YEARLY",
            Frequency::Monthly => "MONTHLY",
            Frequency::Weekly => "WEEKLY",
            Frequency::Daily => "DAILY",
            Frequency::Hourly => "HOURLY",
            Frequency::Minutely => "MINUTELY",
            Frequency::Secondly => "SECONDLY",
        }
    }

    /// Numeric code, 0 for yearly through 6 for secondly.
    pub fn number(self) -> u32 {
        self as u32
    }

    pub fn from_number(value: i64) -> Result<Self> {
        usize::try_from(value)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
            .ok_or(ModelError::FrequencyParse(value.to_string()))
    }

    pub fn from_name(raw: &str) -> Result<Self> {
        match raw.to_ascii_uppercase().as_str() {
            "YEARLY" => Ok(Frequency::Yearly),
            "MONTHLY" => Ok(Frequency::Monthly),
            "WEEKLY" => Ok(Frequency::Weekly),
            "DAILY" => Ok(Frequency::Daily),
            "HOURLY" => Ok(Frequency::Hourly),
            "MINUTELY" => Ok(Frequency::Minutely),
            "SECONDLY" => Ok(Frequency::Secondly),
            _ => Err(ModelError::FrequencyParse(raw.to_owned())),
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for Frequency {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

struct FrequencyVisitor;

impl Visitor<'_> for FrequencyVisitor {
    type Value = Frequency;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a frequency name or its numeric code")
    }

    fn visit_str<E: de::Error>(self, value: &str) -> std::result::Result<Frequency, E> {
        Frequency::from_name(value).map_err(E::custom)
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> std::result::Result<Frequency, E> {
        Frequency::from_number(value).map_err(E::custom)
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> std::result::Result<Frequency, E> {
        self.visit_i64(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl<'de> Deserialize<'de> for Frequency {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_any(FrequencyVisitor)
    }
}

fn default_interval() -> u32 {
    1
}

fn is_default_interval(interval: &u32) -> bool {
    *interval == 1
}

/// Declared recurrence fields as they travel on the wire.
///
/// Every `by*` filter accepts a bare value or a list. Validation happens
/// when the spec is turned into a [`RecurrenceRule`]; the spec itself is
/// kept verbatim so serialization reproduces what was declared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleSpec {
    pub freq: Frequency,
    #[serde(default = "default_interval", skip_serializing_if = "is_default_interval")]
    pub interval: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    #[serde(default, with = "aware_opt", skip_serializing_if = "Option::is_none")]
    pub dtstart: Option<Timestamp>,
    #[serde(default, with = "aware_opt", skip_serializing_if = "Option::is_none")]
    pub until: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wkst: Option<Weekday>,
    #[serde(default, with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub bysetpos: Vec<i32>,
    #[serde(default, with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub bymonth: Vec<i32>,
    #[serde(default, with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub bymonthday: Vec<i32>,
    #[serde(default, with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub byyearday: Vec<i32>,
    #[serde(default, with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub byeaster: Vec<i32>,
    #[serde(default, with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub byweekno: Vec<i32>,
    #[serde(default, with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub byweekday: Vec<WeekdayOffset>,
    #[serde(default, with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub byhour: Vec<i32>,
    #[serde(default, with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub byminute: Vec<i32>,
    #[serde(default, with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub bysecond: Vec<i32>,
}

impl Default for RuleSpec {
    fn default() -> Self {
        RuleSpec {
            freq: Frequency::Yearly,
            interval: 1,
            count: None,
            dtstart: None,
            until: None,
            wkst: None,
            bysetpos: Vec::new(),
            bymonth: Vec::new(),
            bymonthday: Vec::new(),
            byyearday: Vec::new(),
            byeaster: Vec::new(),
            byweekno: Vec::new(),
            byweekday: Vec::new(),
            byhour: Vec::new(),
            byminute: Vec::new(),
            bysecond: Vec::new(),
        }
    }
}

/// Iteration-ready form of a rule after validation and normalization.
///
/// Filters are sorted and deduplicated; filters the declared fields left
/// open are derived from the start instant the way RFC 5545 implies, so
/// the iterator never has to special-case an absent filter dimension.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Prepared {
    pub(crate) freq: Frequency,
    pub(crate) interval: i64,
    pub(crate) dtstart: Timestamp,
    pub(crate) wkst: u32,
    pub(crate) count: Option<u32>,
    pub(crate) until: Option<Timestamp>,
    pub(crate) bysetpos: Vec<i32>,
    pub(crate) bymonth: Vec<u32>,
    pub(crate) bymonthday: Vec<u32>,
    pub(crate) bynmonthday: Vec<i32>,
    pub(crate) byyearday: Vec<i32>,
    pub(crate) byweekno: Vec<i32>,
    pub(crate) byweekday: Vec<u32>,
    pub(crate) bynweekday: Vec<(u32, i32)>,
    pub(crate) byeaster: Vec<i32>,
    pub(crate) byhour: Vec<u32>,
    pub(crate) byminute: Vec<u32>,
    pub(crate) bysecond: Vec<u32>,
    pub(crate) timeset: Vec<NaiveTime>,
}

/// Validated single recurrence pattern.
///
/// Holds the declared [`RuleSpec`] for serialization alongside the
/// prepared form the iterator runs on. Construct with [`RecurrenceRule::new`]
/// or deserialize directly; both paths reject invalid field combinations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RuleSpec", into = "RuleSpec")]
pub struct RecurrenceRule {
    spec: RuleSpec,
    prepared: Prepared,
}

impl RecurrenceRule {
    pub fn new(spec: RuleSpec) -> Result<Self> {
        Self::try_from(spec)
    }

    /// The declared fields, exactly as given.
    pub fn spec(&self) -> &RuleSpec {
        &self.spec
    }

    pub fn freq(&self) -> Frequency {
        self.spec.freq
    }

    pub fn interval(&self) -> u32 {
        self.spec.interval
    }

    pub fn count(&self) -> Option<u32> {
        self.spec.count
    }

    pub fn until(&self) -> Option<Timestamp> {
        self.spec.until
    }

    /// The resolved start instant, second resolution.
    pub fn dtstart(&self) -> Timestamp {
        self.prepared.dtstart
    }

    pub(crate) fn prepared(&self) -> &Prepared {
        &self.prepared
    }
}

impl TryFrom<RuleSpec> for RecurrenceRule {
    type Error = ModelError;

    fn try_from(spec: RuleSpec) -> Result<Self> {
        let prepared = prepare(&spec)?;
        debug!(
            "prepared {} rule starting {}",
            prepared.freq,
            prepared.dtstart.to_rfc3339()
        );
        Ok(RecurrenceRule { spec, prepared })
    }
}

impl From<RecurrenceRule> for RuleSpec {
    fn from(rule: RecurrenceRule) -> RuleSpec {
        rule.spec
    }
}

impl OccurrenceQuery for RecurrenceRule {
    fn occurrences(&self) -> Occurrences<'_> {
        Box::new(RuleIter::new(&self.prepared))
    }

    fn is_bounded(&self) -> bool {
        self.spec.count.is_some() || self.spec.until.is_some()
    }
}

/// Validates one filter list, returning it sorted and deduplicated.
fn checked_filter(
    field: &'static str,
    values: &[i32],
    min: i32,
    max: i32,
    forbid_zero: bool,
) -> Result<Vec<i32>> {
    let mut out: Vec<i32> = Vec::with_capacity(values.len());
    for &value in values {
        if forbid_zero && value == 0 {
            return Err(ModelError::ForbiddenZero { field });
        }
        if value < min || value > max {
            return Err(ModelError::OutOfRange {
                field,
                value: value.into(),
            });
        }
        if !out.contains(&value) {
            out.push(value);
        }
    }
    out.sort_unstable();
    Ok(out)
}

fn to_unsigned(values: Vec<i32>) -> Vec<u32> {
    values.into_iter().map(|v| v as u32).collect()
}

/// Keeps only the values the interval stepping can land on, starting
/// from `start` and wrapping at `base`.
fn reachable_values(start: u32, values: &[u32], base: i64, interval: i64) -> Vec<u32> {
    let g = gcd(interval, base);
    values
        .iter()
        .copied()
        .filter(|v| g == 1 || (i64::from(*v) - i64::from(start)).rem_euclid(g) == 0)
        .collect()
}

/// Proves a minutely rule can ever land on a permitted hour.
fn verify_minutely(dtstart: Timestamp, interval: i64, byhour: &[u32], byminute: &[u32]) -> Result<()> {
    if byhour.is_empty() {
        return Ok(());
    }
    let mut hour = i64::from(dtstart.hour());
    let mut minute = i64::from(dtstart.minute());
    let repetitions = 1440 / gcd(interval, 1440);
    for _ in 0..repetitions {
        let (carried_hours, next_minute) = if byminute.is_empty() {
            ((minute + interval).div_euclid(60), (minute + interval).rem_euclid(60))
        } else {
            match mod_distance(minute, byminute, 60, interval) {
                Some(step) => step,
                None => break,
            }
        };
        minute = next_minute;
        hour = (hour + carried_hours).rem_euclid(24);
        if byhour.contains(&(hour as u32)) {
            return Ok(());
        }
    }
    Err(ModelError::UnsatisfiableRule { field: "byhour" })
}

/// Proves a secondly rule can ever land on a permitted hour and minute.
fn verify_secondly(
    dtstart: Timestamp,
    interval: i64,
    byhour: &[u32],
    byminute: &[u32],
    bysecond: &[u32],
) -> Result<()> {
    if byhour.is_empty() && byminute.is_empty() {
        return Ok(());
    }
    let mut hour = i64::from(dtstart.hour());
    let mut minute = i64::from(dtstart.minute());
    let mut second = i64::from(dtstart.second());
    let repetitions = 86400 / gcd(interval, 86400);
    for _ in 0..repetitions {
        let (carried_minutes, next_second) = if bysecond.is_empty() {
            ((second + interval).div_euclid(60), (second + interval).rem_euclid(60))
        } else {
            match mod_distance(second, bysecond, 60, interval) {
                Some(step) => step,
                None => break,
            }
        };
        second = next_second;
        let total_minutes = minute + carried_minutes;
        minute = total_minutes.rem_euclid(60);
        hour = (hour + total_minutes.div_euclid(60)).rem_euclid(24);
        if (byhour.is_empty() || byhour.contains(&(hour as u32)))
            && (byminute.is_empty() || byminute.contains(&(minute as u32)))
        {
            return Ok(());
        }
    }
    Err(ModelError::UnsatisfiableRule {
        field: "byhour/byminute",
    })
}

fn prepare(spec: &RuleSpec) -> Result<Prepared> {
    if spec.interval < 1 {
        return Err(ModelError::OutOfRange {
            field: "interval",
            value: spec.interval.into(),
        });
    }
    if let Some(count) = spec.count {
        if count < 1 {
            return Err(ModelError::OutOfRange {
                field: "count",
                value: count.into(),
            });
        }
        if spec.until.is_some() {
            return Err(ModelError::CountAndUntil);
        }
    }

    let dtstart = spec.dtstart.unwrap_or_else(now_second_resolution);
    let dtstart = dtstart.with_nanosecond(0).unwrap_or(dtstart);
    let interval = i64::from(spec.interval);
    let wkst = spec.wkst.unwrap_or(Weekday::Monday).number();

    let bysetpos = checked_filter("bysetpos", &spec.bysetpos, -366, 366, true)?;
    let mut bymonth = to_unsigned(checked_filter("bymonth", &spec.bymonth, 1, 12, false)?);
    let byyearday = checked_filter("byyearday", &spec.byyearday, -366, 366, true)?;
    let byweekno = checked_filter("byweekno", &spec.byweekno, -53, 53, true)?;
    let mut byeaster = spec.byeaster.clone();
    byeaster.sort_unstable();
    byeaster.dedup();

    let mut bymonthday_declared = checked_filter("bymonthday", &spec.bymonthday, -31, 31, true)?;
    let mut byweekday_declared = spec.byweekday.clone();

    // A rule with no day-dimension filter repeats on the day pattern of
    // its start instant.
    let no_day_filters = spec.byweekno.is_empty()
        && spec.byyearday.is_empty()
        && spec.bymonthday.is_empty()
        && spec.byweekday.is_empty()
        && spec.byeaster.is_empty();
    if no_day_filters {
        match spec.freq {
            Frequency::Yearly => {
                if bymonth.is_empty() {
                    bymonth = vec![dtstart.month()];
                }
                bymonthday_declared = vec![dtstart.day() as i32];
            }
            Frequency::Monthly => {
                bymonthday_declared = vec![dtstart.day() as i32];
            }
            Frequency::Weekly => {
                byweekday_declared = vec![WeekdayOffset::every(dtstart.weekday().into())];
            }
            _ => {}
        }
    }

    let mut bymonthday: Vec<u32> = bymonthday_declared
        .iter()
        .filter(|v| **v > 0)
        .map(|v| *v as u32)
        .collect();
    let mut bynmonthday: Vec<i32> = bymonthday_declared
        .iter()
        .filter(|v| **v < 0)
        .copied()
        .collect();
    bymonthday.sort_unstable();
    bynmonthday.sort_unstable();

    // Ordinal weekdays only make sense within a year or month; for finer
    // frequencies the ordinal degrades to the plain weekday.
    let mut byweekday: Vec<u32> = Vec::new();
    let mut bynweekday: Vec<(u32, i32)> = Vec::new();
    for offset in &byweekday_declared {
        if offset.n != 0 && offset.n.unsigned_abs() > 53 {
            return Err(ModelError::OutOfRange {
                field: "byweekday ordinal",
                value: offset.n.into(),
            });
        }
        if offset.n == 0 || spec.freq > Frequency::Monthly {
            let day = offset.weekday.number();
            if !byweekday.contains(&day) {
                byweekday.push(day);
            }
        } else {
            let pair = (offset.weekday.number(), offset.n);
            if !bynweekday.contains(&pair) {
                bynweekday.push(pair);
            }
        }
    }
    byweekday.sort_unstable();
    bynweekday.sort_unstable();

    let byhour = {
        let declared = to_unsigned(checked_filter("byhour", &spec.byhour, 0, 23, false)?);
        if declared.is_empty() {
            if spec.freq < Frequency::Hourly {
                vec![dtstart.hour()]
            } else {
                Vec::new()
            }
        } else if spec.freq == Frequency::Hourly {
            let reachable = reachable_values(dtstart.hour(), &declared, 24, interval);
            if reachable.is_empty() {
                return Err(ModelError::UnsatisfiableRule { field: "byhour" });
            }
            reachable
        } else {
            declared
        }
    };
    let byminute = {
        let declared = to_unsigned(checked_filter("byminute", &spec.byminute, 0, 59, false)?);
        if declared.is_empty() {
            if spec.freq < Frequency::Minutely {
                vec![dtstart.minute()]
            } else {
                Vec::new()
            }
        } else if spec.freq == Frequency::Minutely {
            let reachable = reachable_values(dtstart.minute(), &declared, 60, interval);
            if reachable.is_empty() {
                return Err(ModelError::UnsatisfiableRule { field: "byminute" });
            }
            reachable
        } else {
            declared
        }
    };
    let bysecond = {
        let declared = to_unsigned(checked_filter("bysecond", &spec.bysecond, 0, 59, false)?);
        if declared.is_empty() {
            if spec.freq < Frequency::Secondly {
                vec![dtstart.second()]
            } else {
                Vec::new()
            }
        } else if spec.freq == Frequency::Secondly {
            let reachable = reachable_values(dtstart.second(), &declared, 60, interval);
            if reachable.is_empty() {
                return Err(ModelError::UnsatisfiableRule { field: "bysecond" });
            }
            reachable
        } else {
            declared
        }
    };

    match spec.freq {
        Frequency::Minutely => verify_minutely(dtstart, interval, &byhour, &byminute)?,
        Frequency::Secondly => verify_secondly(dtstart, interval, &byhour, &byminute, &bysecond)?,
        _ => {}
    }

    // For daily and coarser rules the times within a day never change,
    // so the full cross product is computed once.
    let timeset = if spec.freq < Frequency::Hourly {
        let mut times = Vec::with_capacity(byhour.len() * byminute.len() * bysecond.len());
        for &hour in &byhour {
            for &minute in &byminute {
                for &second in &bysecond {
                    if let Some(time) = NaiveTime::from_hms_opt(hour, minute, second) {
                        times.push(time);
                    }
                }
            }
        }
        times.sort_unstable();
        times
    } else {
        Vec::new()
    };

    Ok(Prepared {
        freq: spec.freq,
        interval,
        dtstart,
        wkst,
        count: spec.count,
        until: spec.until,
        bysetpos,
        bymonth,
        bymonthday,
        bynmonthday,
        byyearday,
        byweekno,
        byweekday,
        bynweekday,
        byeaster,
        byhour,
        byminute,
        bysecond,
        timeset,
    })
}
