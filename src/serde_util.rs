//! Shared (de)serialization helpers for the compact wire forms.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::time::{Timestamp, parse_timestamp};

/// Accepts a bare value or a list of values; serializes a one-element
/// list back to the bare value.
pub mod one_or_many {
    use super::*;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany<T> {
        One(T),
        Many(Vec<T>),
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Vec<T>, D::Error>
    where
        T: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        Ok(match OneOrMany::deserialize(deserializer)? {
            OneOrMany::One(value) => vec![value],
            OneOrMany::Many(values) => values,
        })
    }

    pub fn serialize<T, S>(values: &[T], serializer: S) -> Result<S::Ok, S::Error>
    where
        T: Serialize,
        S: Serializer,
    {
        match values {
            [single] => single.serialize(serializer),
            _ => values.serialize(serializer),
        }
    }
}

/// Timestamp field that accepts RFC 3339 or a naive local datetime.
pub mod aware {
    use super::*;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Timestamp, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse_timestamp(&raw).map_err(serde::de::Error::custom)
    }

    pub fn serialize<S>(value: &Timestamp, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_rfc3339())
    }
}

/// Optional variant of [`aware`].
pub mod aware_opt {
    use super::*;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Timestamp>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        raw.map(|s| parse_timestamp(&s).map_err(serde::de::Error::custom))
            .transpose()
    }

    pub fn serialize<S>(value: &Option<Timestamp>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(ts) => aware::serialize(ts, serializer),
            None => serializer.serialize_none(),
        }
    }
}

/// Singleton-or-list of timestamps, each in either datetime form.
pub mod aware_list {
    use super::*;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<Timestamp>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Vec<String> = one_or_many::deserialize(deserializer)?;
        raw.iter()
            .map(|s| parse_timestamp(s).map_err(serde::de::Error::custom))
            .collect()
    }

    pub fn serialize<S>(values: &[Timestamp], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let rendered: Vec<String> = values.iter().map(|ts| ts.to_rfc3339()).collect();
        one_or_many::serialize(&rendered, serializer)
    }
}
