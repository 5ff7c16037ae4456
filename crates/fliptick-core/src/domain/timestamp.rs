use std::fmt::{Display, Formatter};
use std::time::Duration;

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::format_description::well_known::Rfc3339;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};

use crate::ValidationError;

const SQL_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
const API_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");

/// Timestamp guaranteed to be UTC.
///
/// The upstream price API emits zone-less timestamps (`2026-03-01T12:00:00`)
/// and the store round-trips SQL timestamps (`2026-03-01 12:00:00`); both are
/// interpreted as UTC. Serialization is always RFC3339.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UtcDateTime(OffsetDateTime);

impl UtcDateTime {
    pub fn now() -> Self {
        Self(OffsetDateTime::now_utc())
    }

    /// Parse an RFC3339 timestamp; any offset is normalized to UTC.
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let parsed = OffsetDateTime::parse(input, &Rfc3339).map_err(|_| {
            ValidationError::InvalidTimestamp {
                value: input.to_owned(),
            }
        })?;

        Ok(Self(parsed.to_offset(UtcOffset::UTC)))
    }

    /// Parse RFC3339, the API's zone-less format, or the SQL timestamp
    /// format. Fractional seconds are ignored.
    pub fn parse_lenient(input: &str) -> Result<Self, ValidationError> {
        let trimmed = input.trim();
        if let Ok(parsed) = OffsetDateTime::parse(trimmed, &Rfc3339) {
            return Ok(Self(parsed.to_offset(UtcOffset::UTC)));
        }

        let bare = trimmed.split('.').next().unwrap_or(trimmed);
        for format in [API_FORMAT, SQL_FORMAT] {
            if let Ok(parsed) = PrimitiveDateTime::parse(bare, format) {
                return Ok(Self(parsed.assume_utc()));
            }
        }

        Err(ValidationError::InvalidTimestamp {
            value: input.to_owned(),
        })
    }

    /// The moment `duration` before this one.
    pub fn minus(self, duration: Duration) -> Self {
        Self(self.0 - duration)
    }

    pub fn into_inner(self) -> OffsetDateTime {
        self.0
    }

    pub fn format_rfc3339(self) -> String {
        self.0
            .format(&Rfc3339)
            .expect("UtcDateTime must be RFC3339 formattable")
    }

    /// Format as a SQL timestamp (`YYYY-MM-DD HH:MM:SS`) for the store.
    pub fn format_sql(self) -> String {
        self.0
            .format(SQL_FORMAT)
            .expect("UtcDateTime must be SQL formattable")
    }
}

impl Display for UtcDateTime {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.format_rfc3339())
    }
}

impl Serialize for UtcDateTime {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.format_rfc3339())
    }
}

impl<'de> Deserialize<'de> for UtcDateTime {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Self::parse_lenient(&value).map_err(D::Error::custom)
    }
}
