use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use std::fmt;

use crate::error::{ModelError, Result};

/// Day of the week, Monday-first to match the calendar arithmetic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Weekday {
    Monday = 0,
    Tuesday = 1,
    Wednesday = 2,
    Thursday = 3,
    Friday = 4,
    Saturday = 5,
    Sunday = 6,
}

impl Weekday {
    pub const ALL: [Weekday; 7] = [
        Weekday::Monday,
        Weekday::Tuesday,
        Weekday::Wednesday,
        Weekday::Thursday,
        Weekday::Friday,
        Weekday::Saturday,
        Weekday::Sunday,
    ];

    /// Two-letter code used on the wire
    pub fn code(&self) -> &'static str {
        match self {
            Weekday::Monday => "MO",
            Weekday::Tuesday => "TU",
            Weekday::Wednesday => "WE",
            Weekday::Thursday => "TH",
            Weekday::Friday => "FR",
            Weekday::Saturday => "SA",
            Weekday::Sunday => "SU",
        }
    }

    /// Days since Monday, 0..=6
    pub fn number(&self) -> u32 {
        *self as u32
    }

    pub fn from_number(n: i64) -> Result<Weekday> {
        usize::try_from(n)
            .ok()
            .and_then(|i| Weekday::ALL.get(i).copied())
            .ok_or(ModelError::WeekdayParse(n.to_string()))
    }

    pub fn from_code(code: &str) -> Result<Weekday> {
        match code.to_ascii_uppercase().as_str() {
            "MO" => Ok(Weekday::Monday),
            "TU" => Ok(Weekday::Tuesday),
            "WE" => Ok(Weekday::Wednesday),
            "TH" => Ok(Weekday::Thursday),
            "FR" => Ok(Weekday::Friday),
            "SA" => Ok(Weekday::Saturday),
            "SU" => Ok(Weekday::Sunday),
            _ => Err(ModelError::WeekdayParse(code.to_owned())),
        }
    }
}

impl fmt::Display for Weekday {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl From<chrono::Weekday> for Weekday {
    fn from(wd: chrono::Weekday) -> Self {
        Weekday::ALL[wd.num_days_from_monday() as usize]
    }
}

impl From<Weekday> for chrono::Weekday {
    fn from(wd: Weekday) -> Self {
        match wd {
            Weekday::Monday => chrono::Weekday::Mon,
            Weekday::Tuesday => chrono::Weekday::Tue,
            Weekday::Wednesday => chrono::Weekday::Wed,
            Weekday::Thursday => chrono::Weekday::Thu,
            Weekday::Friday => chrono::Weekday::Fri,
            Weekday::Saturday => chrono::Weekday::Sat,
            Weekday::Sunday => chrono::Weekday::Sun,
        }
    }
}

impl Serialize for Weekday {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.code())
    }
}

impl<'de> Deserialize<'de> for Weekday {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct WeekdayVisitor;

        impl de::Visitor<'_> for WeekdayVisitor {
            type Value = Weekday;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a weekday code like \"MO\" or a number 0..=6")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Weekday, E> {
                Weekday::from_code(v).map_err(E::custom)
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<Weekday, E> {
                Weekday::from_number(v).map_err(E::custom)
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<Weekday, E> {
                self.visit_i64(i64::try_from(v).unwrap_or(-1))
            }
        }

        deserializer.deserialize_any(WeekdayVisitor)
    }
}

/// A weekday qualified by an occurrence ordinal.
///
/// An `n` of 0 means every such weekday; positive selects the nth within
/// the enclosing span, negative counts from the end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WeekdayOffset {
    pub weekday: Weekday,
    pub n: i32,
}

impl WeekdayOffset {
    pub fn every(weekday: Weekday) -> Self {
        WeekdayOffset { weekday, n: 0 }
    }

    pub fn nth(weekday: Weekday, n: i32) -> Self {
        WeekdayOffset { weekday, n }
    }

    /// Day shift from `current` to the nth matching weekday, a zero
    /// ordinal counting as the first.
    pub(crate) fn jump_days(&self, current: chrono::Weekday) -> i64 {
        let nth = if self.n == 0 { 1 } else { self.n };
        let current = current.num_days_from_monday() as i64;
        let target = self.weekday.number() as i64;
        let whole_weeks = (nth.unsigned_abs() as i64 - 1) * 7;
        if nth > 0 {
            whole_weeks + (7 - current + target).rem_euclid(7)
        } else {
            -(whole_weeks + (current - target).rem_euclid(7))
        }
    }
}

impl From<Weekday> for WeekdayOffset {
    fn from(weekday: Weekday) -> Self {
        WeekdayOffset::every(weekday)
    }
}

impl fmt::Display for WeekdayOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.n == 0 {
            write!(f, "{}", self.weekday)
        } else {
            write!(f, "{}({:+})", self.weekday, self.n)
        }
    }
}

impl Serialize for WeekdayOffset {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeMap;

        if self.n == 0 {
            self.weekday.serialize(serializer)
        } else {
            let mut map = serializer.serialize_map(Some(1))?;
            map.serialize_entry(self.weekday.code(), &self.n)?;
            map.end()
        }
    }
}

impl<'de> Deserialize<'de> for WeekdayOffset {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct OffsetVisitor;

        impl<'de> de::Visitor<'de> for OffsetVisitor {
            type Value = WeekdayOffset;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a weekday code, a weekday number, or a {code: ordinal} map")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<WeekdayOffset, E> {
                Weekday::from_code(v)
                    .map(WeekdayOffset::from)
                    .map_err(E::custom)
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<WeekdayOffset, E> {
                Weekday::from_number(v)
                    .map(WeekdayOffset::from)
                    .map_err(E::custom)
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<WeekdayOffset, E> {
                self.visit_i64(i64::try_from(v).unwrap_or(-1))
            }

            fn visit_map<A: de::MapAccess<'de>>(
                self,
                mut map: A,
            ) -> std::result::Result<WeekdayOffset, A::Error> {
                let mut entries: Vec<(String, i32)> = Vec::new();
                while let Some(entry) = map.next_entry()? {
                    entries.push(entry);
                }
                let [(code, n)] = entries.as_slice() else {
                    return Err(de::Error::custom(ModelError::WeekdayMapEntries {
                        len: entries.len(),
                    }));
                };
                if *n == 0 {
                    return Err(de::Error::custom(ModelError::ForbiddenZero {
                        field: "weekday ordinal",
                    }));
                }
                let weekday = Weekday::from_code(code).map_err(de::Error::custom)?;
                Ok(WeekdayOffset::nth(weekday, *n))
            }
        }

        deserializer.deserialize_any(OffsetVisitor)
    }
}
