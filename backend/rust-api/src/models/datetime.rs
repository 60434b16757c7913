//! Serde converters between `chrono::DateTime<Utc>` and BSON datetimes, so
//! documents store native BSON dates while the Rust side works with chrono.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use mongodb::bson;
use serde::de::Error;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

fn from_bson<E: serde::de::Error>(value: bson::DateTime) -> Result<DateTime<Utc>, E> {
    DateTime::from_timestamp_millis(value.timestamp_millis())
        .ok_or_else(|| E::custom("BSON datetime out of range"))
}

pub fn to_bson(date: &DateTime<Utc>) -> bson::DateTime {
    bson::DateTime::from_millis(date.timestamp_millis())
}

const INVALID_DATE: &str = "Valid due date is required";

/// Accepts RFC 3339, a zone-less `YYYY-MM-DDTHH:MM[:SS]` (read as UTC) or a bare date
pub fn parse_flexible(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Deserializes request timestamps through [`parse_flexible`]
pub mod flexible {
    use super::*;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse_flexible(&raw).ok_or_else(|| D::Error::custom(INVALID_DATE))
    }
}

pub mod flexible_option {
    use super::*;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<String>::deserialize(deserializer)? {
            Some(raw) => parse_flexible(&raw)
                .map(Some)
                .ok_or_else(|| D::Error::custom(INVALID_DATE)),
            None => Ok(None),
        }
    }
}

pub mod bson_datetime_as_chrono {
    use super::*;

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        to_bson(date).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = bson::DateTime::deserialize(deserializer)?;
        from_bson(value)
    }
}

pub mod bson_datetime_as_chrono_option {
    use super::*;

    pub fn serialize<S>(date: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match date {
            Some(d) => serializer.serialize_some(&to_bson(d)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value: Option<bson::DateTime> = Option::deserialize(deserializer)?;
        value.map(from_bson).transpose()
    }
}
