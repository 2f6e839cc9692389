use chrono::{Datelike, NaiveDate, NaiveDateTime, TimeDelta, Timelike};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{ModelError, Result};
use crate::time::moment::{Timestamp, at_offset, days_in_month, is_leap_year};
use crate::time::weekday::WeekdayOffset;

// Restricted ISO-8601-like duration grammar, week form exclusive of the rest.
static DURATION_GRAMMAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        ^P(?:
            (?:(?P<years>[+-]?\d+)Y)?
            (?:(?P<months>[+-]?\d+)M)?
            (?:(?P<days>[+-]?\d+)D)?
            (?:T
                (?:(?P<hours>[+-]?\d+)H)?
                (?:(?P<minutes>[+-]?\d+)M)?
                (?:(?P<seconds>[+-]?\d+)S)?
            )?
            |(?P<weeks>\d+)W
        )$",
    )
    .unwrap()
});

/// Calendar-aware offset: relative year/month/day/time fields plus
/// absolute field overrides applied when the offset is added to a point
/// in time.
///
/// Values are normalized at construction (seconds into minutes, minutes
/// into hours, hours into days, months into years; days never roll into
/// months) and immutable afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CalendarDelta {
    years: i32,
    months: i32,
    days: i32,
    hours: i32,
    minutes: i32,
    seconds: i32,
    leapdays: i32,
    year: Option<i32>,
    month: Option<u32>,
    day: Option<u32>,
    weekday: Option<WeekdayOffset>,
    hour: Option<u32>,
    minute: Option<u32>,
    second: Option<u32>,
}

/// Construction and wire form of [`CalendarDelta`].
///
/// `weeks` folds into `days`; `yearday`/`nlyearday` fold into absolute
/// `month`/`day`. None of the three is ever stored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct CalendarDeltaSpec {
    #[serde(skip_serializing_if = "is_zero")]
    pub years: i32,
    #[serde(skip_serializing_if = "is_zero")]
    pub months: i32,
    #[serde(skip_serializing_if = "is_zero")]
    pub weeks: i32,
    #[serde(skip_serializing_if = "is_zero")]
    pub days: i32,
    #[serde(skip_serializing_if = "is_zero")]
    pub hours: i32,
    #[serde(skip_serializing_if = "is_zero")]
    pub minutes: i32,
    #[serde(skip_serializing_if = "is_zero")]
    pub seconds: i32,
    #[serde(skip_serializing_if = "is_zero")]
    pub leapdays: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub yearday: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nlyearday: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub month: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub day: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weekday: Option<WeekdayOffset>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hour: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minute: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub second: Option<i32>,
}

fn is_zero(n: &i32) -> bool {
    *n == 0
}

fn range_checked(
    field: &'static str,
    value: Option<i32>,
    min: i32,
    max: i32,
) -> Result<Option<i32>> {
    match value {
        Some(v) if !(min..=max).contains(&v) => Err(ModelError::OutOfRange {
            field,
            value: v.into(),
        }),
        other => Ok(other),
    }
}

fn narrow(field: &'static str, value: i64) -> Result<i32> {
    i32::try_from(value).map_err(|_| ModelError::OutOfRange { field, value })
}

impl TryFrom<CalendarDeltaSpec> for CalendarDelta {
    type Error = ModelError;

    fn try_from(spec: CalendarDeltaSpec) -> Result<Self> {
        let year = range_checked("year", spec.year, -9999, 9999)?;
        let mut month = range_checked("month", spec.month, 1, 12)?.map(|v| v as u32);
        let mut day = range_checked("day", spec.day, 1, 31)?.map(|v| v as u32);
        let hour = range_checked("hour", spec.hour, 0, 23)?.map(|v| v as u32);
        let minute = range_checked("minute", spec.minute, 0, 59)?.map(|v| v as u32);
        let second = range_checked("second", spec.second, 0, 59)?.map(|v| v as u32);

        let mut leapdays = spec.leapdays;
        // nlyearday wins over yearday and skips the leap adjustment.
        let yday = match (spec.nlyearday, spec.yearday) {
            (Some(n), _) => Some(n),
            (None, Some(y)) => {
                if y > 59 {
                    leapdays = -1;
                }
                Some(y)
            }
            (None, None) => None,
        };
        if let Some(yday) = yday {
            const MONTH_END_YDAY: [i32; 12] =
                [31, 59, 90, 120, 151, 181, 212, 243, 273, 304, 334, 366];
            if !(1..=366).contains(&yday) {
                return Err(ModelError::OutOfRange {
                    field: "yearday",
                    value: yday.into(),
                });
            }
            let idx = MONTH_END_YDAY
                .iter()
                .position(|end| yday <= *end)
                .unwrap_or(11);
            month = Some(idx as u32 + 1);
            day = Some(if idx == 0 { yday } else { yday - MONTH_END_YDAY[idx - 1] } as u32);
        }

        let mut seconds = i64::from(spec.seconds);
        let mut minutes = i64::from(spec.minutes);
        let mut hours = i64::from(spec.hours);
        let mut days = i64::from(spec.days) + i64::from(spec.weeks) * 7;
        let mut rel_months = i64::from(spec.months);
        let mut rel_years = i64::from(spec.years);
        minutes += seconds / 60;
        seconds %= 60;
        hours += minutes / 60;
        minutes %= 60;
        days += hours / 24;
        hours %= 24;
        rel_years += rel_months / 12;
        rel_months %= 12;

        Ok(CalendarDelta {
            years: narrow("years", rel_years)?,
            months: rel_months as i32,
            days: narrow("days", days)?,
            hours: hours as i32,
            minutes: minutes as i32,
            seconds: seconds as i32,
            leapdays,
            year,
            month,
            day,
            weekday: spec.weekday,
            hour,
            minute,
            second,
        })
    }
}

impl CalendarDelta {
    /// Parses the compact grammar `P[nY][nM][nD][T[nH][nM][nS]]` | `nW`.
    pub fn parse(text: &str) -> Result<Self> {
        let caps = DURATION_GRAMMAR
            .captures(text)
            .ok_or_else(|| ModelError::DurationParse(text.to_owned()))?;
        let group = |name: &str| -> Result<i32> {
            match caps.name(name) {
                Some(m) => m
                    .as_str()
                    .parse()
                    .map_err(|_| ModelError::DurationParse(text.to_owned())),
                None => Ok(0),
            }
        };
        CalendarDelta::try_from(CalendarDeltaSpec {
            years: group("years")?,
            months: group("months")?,
            days: group("days")?,
            hours: group("hours")?,
            minutes: group("minutes")?,
            seconds: group("seconds")?,
            weeks: group("weeks")?,
            ..CalendarDeltaSpec::default()
        })
    }

    /// Renders back into the compact grammar; the zero offset renders as
    /// `PT0S`. Fails for values the grammar cannot express (leapdays or
    /// any absolute override).
    pub fn to_text(&self) -> Result<String> {
        if self.leapdays != 0 {
            return Err(ModelError::UnrenderableDelta { field: "leapdays" });
        }
        if let Some(field) = self.override_field() {
            return Err(ModelError::UnrenderableDelta { field });
        }

        let mut out = String::from("P");
        for (value, unit) in [(self.years, 'Y'), (self.months, 'M'), (self.days, 'D')] {
            if value != 0 {
                out.push_str(&value.to_string());
                out.push(unit);
            }
        }
        let mut time = String::new();
        for (value, unit) in [(self.hours, 'H'), (self.minutes, 'M'), (self.seconds, 'S')] {
            if value != 0 {
                time.push_str(&value.to_string());
                time.push(unit);
            }
        }
        if !time.is_empty() {
            out.push('T');
            out.push_str(&time);
        } else if out.len() == 1 {
            return Ok("PT0S".to_owned());
        }
        Ok(out)
    }

    /// Converts to a fixed elapsed time. Fails when the offset depends on
    /// its anchor (years, months, leapdays, or any absolute override).
    pub fn to_elapsed(&self) -> Result<TimeDelta> {
        for (field, value) in [
            ("years", self.years),
            ("months", self.months),
            ("leapdays", self.leapdays),
        ] {
            if value != 0 {
                return Err(ModelError::InexactDelta { field });
            }
        }
        if let Some(field) = self.override_field() {
            return Err(ModelError::InexactDelta { field });
        }
        Ok(TimeDelta::days(i64::from(self.days))
            + TimeDelta::hours(i64::from(self.hours))
            + TimeDelta::minutes(i64::from(self.minutes))
            + TimeDelta::seconds(i64::from(self.seconds)))
    }

    /// Adds the offset to an instant, keeping its UTC offset.
    ///
    /// Relative years/months apply first (with day-of-month clamped to
    /// the target month), then absolute overrides, then the exact
    /// day/time shift, then the weekday jump.
    pub fn shift(&self, ts: Timestamp) -> Result<Timestamp> {
        let offset = *ts.offset();
        let wall = ts.naive_local();
        let date = self.replace_and_carry(wall.date())?;

        let mut time = wall.time();
        if let Some(h) = self.hour {
            time = time.with_hour(h).ok_or(ModelError::ShiftOverflow)?;
        }
        if let Some(m) = self.minute {
            time = time.with_minute(m).ok_or(ModelError::ShiftOverflow)?;
        }
        if let Some(s) = self.second {
            time = time.with_second(s).ok_or(ModelError::ShiftOverflow)?;
        }

        let shifted = NaiveDateTime::new(date, time)
            .checked_add_signed(TimeDelta::days(self.day_shift_for(date)))
            .and_then(|dt| dt.checked_add_signed(TimeDelta::hours(i64::from(self.hours))))
            .and_then(|dt| dt.checked_add_signed(TimeDelta::minutes(i64::from(self.minutes))))
            .and_then(|dt| dt.checked_add_signed(TimeDelta::seconds(i64::from(self.seconds))))
            .ok_or(ModelError::ShiftOverflow)?;
        let shifted = match self.weekday {
            Some(wd) => shifted
                .checked_add_signed(TimeDelta::days(wd.jump_days(shifted.weekday())))
                .ok_or(ModelError::ShiftOverflow)?,
            None => shifted,
        };
        Ok(at_offset(shifted, offset))
    }

    /// Adds the offset to a plain date; sub-day fields contribute whole
    /// days only. Fails when a time-of-day override is set.
    pub fn shift_date(&self, date: NaiveDate) -> Result<NaiveDate> {
        for (field, set) in [
            ("hour", self.hour.is_some()),
            ("minute", self.minute.is_some()),
            ("second", self.second.is_some()),
        ] {
            if set {
                return Err(ModelError::DateOnlyDelta { field });
            }
        }

        let base = self.replace_and_carry(date)?;
        let sub_day =
            i64::from(self.hours) * 3600 + i64::from(self.minutes) * 60 + i64::from(self.seconds);
        let days = self.day_shift_for(base) + sub_day.div_euclid(86400);
        let shifted = base
            .checked_add_signed(TimeDelta::days(days))
            .ok_or(ModelError::ShiftOverflow)?;
        match self.weekday {
            Some(wd) => shifted
                .checked_add_signed(TimeDelta::days(wd.jump_days(shifted.weekday())))
                .ok_or(ModelError::ShiftOverflow),
            None => Ok(shifted),
        }
    }

    // Absolute year/month/day replacement plus the relative year/month
    // walk, clamping the day to the length of the landing month.
    fn replace_and_carry(&self, base: NaiveDate) -> Result<NaiveDate> {
        let mut year = i64::from(self.year.unwrap_or(base.year())) + i64::from(self.years);
        let mut month = i64::from(self.month.unwrap_or(base.month()));
        if self.months != 0 {
            month += i64::from(self.months);
            if month > 12 {
                year += 1;
                month -= 12;
            } else if month < 1 {
                year -= 1;
                month += 12;
            }
        }
        let year = i32::try_from(year).map_err(|_| ModelError::ShiftOverflow)?;
        let month = month as u32;
        let day = days_in_month(year, month).min(self.day.unwrap_or(base.day()));
        NaiveDate::from_ymd_opt(year, month, day).ok_or(ModelError::ShiftOverflow)
    }

    // Leapdays only bite past February of a leap year.
    fn day_shift_for(&self, anchored: NaiveDate) -> i64 {
        let mut days = i64::from(self.days);
        if self.leapdays != 0 && anchored.month() > 2 && is_leap_year(anchored.year()) {
            days += i64::from(self.leapdays);
        }
        days
    }

    fn override_field(&self) -> Option<&'static str> {
        if self.year.is_some() {
            Some("year")
        } else if self.month.is_some() {
            Some("month")
        } else if self.day.is_some() {
            Some("day")
        } else if self.weekday.is_some() {
            Some("weekday")
        } else if self.hour.is_some() {
            Some("hour")
        } else if self.minute.is_some() {
            Some("minute")
        } else if self.second.is_some() {
            Some("second")
        } else {
            None
        }
    }

    fn to_spec(self) -> CalendarDeltaSpec {
        CalendarDeltaSpec {
            years: self.years,
            months: self.months,
            weeks: 0,
            days: self.days,
            hours: self.hours,
            minutes: self.minutes,
            seconds: self.seconds,
            leapdays: self.leapdays,
            yearday: None,
            nlyearday: None,
            year: self.year,
            month: self.month.map(|v| v as i32),
            day: self.day.map(|v| v as i32),
            weekday: self.weekday,
            hour: self.hour.map(|v| v as i32),
            minute: self.minute.map(|v| v as i32),
            second: self.second.map(|v| v as i32),
        }
    }

    pub fn years(&self) -> i32 {
        self.years
    }

    pub fn months(&self) -> i32 {
        self.months
    }

    pub fn days(&self) -> i32 {
        self.days
    }

    pub fn hours(&self) -> i32 {
        self.hours
    }

    pub fn minutes(&self) -> i32 {
        self.minutes
    }

    pub fn seconds(&self) -> i32 {
        self.seconds
    }

    pub fn leapdays(&self) -> i32 {
        self.leapdays
    }

    pub fn year(&self) -> Option<i32> {
        self.year
    }

    pub fn month(&self) -> Option<u32> {
        self.month
    }

    pub fn day(&self) -> Option<u32> {
        self.day
    }

    pub fn weekday(&self) -> Option<WeekdayOffset> {
        self.weekday
    }

    pub fn hour(&self) -> Option<u32> {
        self.hour
    }

    pub fn minute(&self) -> Option<u32> {
        self.minute
    }

    pub fn second(&self) -> Option<u32> {
        self.second
    }
}

impl Serialize for CalendarDelta {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self.to_text() {
            Ok(text) => serializer.serialize_str(&text),
            Err(_) => self.to_spec().serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for CalendarDelta {
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
            Wire::Text(text) => CalendarDelta::parse(&text),
            Wire::Fields(spec) => CalendarDelta::try_from(spec),
        }
        .map_err(serde::de::Error::custom)
    }
}
