//! Shared domain types: severities, event kinds, incident status, and the
//! log/incident records that cross the store boundary.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Returned when a textual enum value is not one of the known variants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognized {kind} '{value}' (expected one of: {expected})")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
    pub expected: &'static str,
}

/// Implements `as_str`, `Display`, `FromStr` and the SQLite conversions for a
/// closed, text-backed enum.
macro_rules! text_enum {
    ($ty:ident, $label:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($text => Ok(Self::$variant),)+
                    _ => Err(ParseEnumError {
                        kind: $label,
                        value: s.to_owned(),
                        expected: concat!($($text, " "),+),
                    }),
                }
            }
        }

        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e| FromSqlError::Other(Box::new(e)))
            }
        }
    };
}

/// Severity shared by events, anomalies and incidents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

text_enum!(Severity, "severity", {
    Low => "low",
    Medium => "medium",
    High => "high",
});

/// Kind of authentication/access action an event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    LoginSuccess,
    LoginFailed,
    AccessDenied,
    DataBreach,
    UnauthorizedAccess,
}

text_enum!(EventKind, "event kind", {
    LoginSuccess => "login_success",
    LoginFailed => "login_failed",
    AccessDenied => "access_denied",
    DataBreach => "data_breach",
    UnauthorizedAccess => "unauthorized_access",
});

impl EventKind {
    pub const ALL: [EventKind; 5] = [
        EventKind::LoginSuccess,
        EventKind::LoginFailed,
        EventKind::AccessDenied,
        EventKind::DataBreach,
        EventKind::UnauthorizedAccess,
    ];

    /// Severity an event of this kind is recorded with when the caller does
    /// not say otherwise.
    pub fn default_severity(&self) -> Severity {
        match self {
            Self::LoginSuccess => Severity::Low,
            Self::LoginFailed | Self::AccessDenied => Severity::Medium,
            Self::DataBreach | Self::UnauthorizedAccess => Severity::High,
        }
    }
}

/// Lifecycle state of an incident.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentStatus {
    #[default]
    Open,
    Investigating,
    Resolved,
}

text_enum!(IncidentStatus, "incident status", {
    Open => "open",
    Investigating => "investigating",
    Resolved => "resolved",
});

/// A recorded security event. Immutable apart from `message`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub source_address: String,
    pub subject: Option<String>,
    pub kind: EventKind,
    pub message: Option<String>,
    pub severity: Severity,
}

/// Input for inserting an event.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewEvent {
    /// Defaults to the insertion time.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    pub source_address: String,
    #[serde(default)]
    pub subject: Option<String>,
    pub kind: EventKind,
    #[serde(default)]
    pub message: Option<String>,
    pub severity: Severity,
}

impl NewEvent {
    pub fn new(source_address: impl Into<String>, kind: EventKind) -> Self {
        Self {
            timestamp: None,
            source_address: source_address.into(),
            subject: None,
            kind,
            message: None,
            severity: kind.default_severity(),
        }
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// Optional, AND-combined criteria for browsing events.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct EventFilter {
    pub source_address: Option<String>,
    pub subject: Option<String>,
    pub kind: Option<EventKind>,
    pub severity: Option<Severity>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

/// A tracked incident, either operator-reported or auto-created.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Incident {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub severity: Severity,
    pub status: IncidentStatus,
    pub log_id: Option<i64>,
    pub reporter: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Input for creating an incident. New incidents always start `open`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewIncident {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub severity: Severity,
    #[serde(default)]
    pub reporter: Option<String>,
    #[serde(default)]
    pub log_id: Option<i64>,
}

/// Optional, AND-combined criteria for browsing incidents.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct IncidentFilter {
    pub status: Option<IncidentStatus>,
    pub severity: Option<Severity>,
    /// Matched against title and description.
    pub keyword: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

/// Storage/wire form of a timestamp. Fixed width, so text order is time order.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Human form of a timestamp used in incident text and tables.
pub fn display_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Parse an operator-supplied time bound: `YYYY-MM-DD HH:MM:SS`,
/// `YYYY-MM-DD`, or RFC 3339. A bare date used as an upper bound means the
/// end of that day.
pub fn parse_time_bound(input: &str, upper: bool) -> Result<DateTime<Utc>, chrono::ParseError> {
    let input = input.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(input, "%Y-%m-%d %H:%M:%S") {
        return Ok(Utc.from_utc_datetime(&naive));
    }
    let date = NaiveDate::parse_from_str(input, "%Y-%m-%d")?;
    let naive = if upper {
        date.and_hms_micro_opt(23, 59, 59, 999_999)
    } else {
        date.and_hms_opt(0, 0, 0)
    };
    // Both times are always valid for a parsed date.
    Ok(Utc.from_utc_datetime(&naive.unwrap_or_default()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_text_forms() {
        assert_eq!("LOGIN_FAILED".parse::<EventKind>().unwrap(), EventKind::LoginFailed);
        assert_eq!(EventKind::UnauthorizedAccess.to_string(), "unauthorized_access");
        assert_eq!(" high ".parse::<Severity>().unwrap(), Severity::High);
        assert_eq!(IncidentStatus::default(), IncidentStatus::Open);
    }

    #[test]
    fn test_unknown_values_are_rejected() {
        let err = "critical".parse::<Severity>().unwrap_err();
        assert_eq!(err.value, "critical");
        assert!(err.to_string().contains("low medium high"));
        assert!("port_scan".parse::<EventKind>().is_err());
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
    }

    #[test]
    fn test_timestamp_text_sorts_chronologically() {
        let a = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let b = a + chrono::Duration::microseconds(1);
        let c = a + chrono::Duration::seconds(1);
        assert_eq!(format_timestamp(&a), "2026-01-02T03:04:05.000000Z");
        assert!(format_timestamp(&a) < format_timestamp(&b));
        assert!(format_timestamp(&b) < format_timestamp(&c));
    }

    #[test]
    fn test_parse_time_bound() {
        let start = parse_time_bound("2026-03-01", false).unwrap();
        let end = parse_time_bound("2026-03-01", true).unwrap();
        assert_eq!(display_timestamp(&start), "2026-03-01 00:00:00");
        assert_eq!(display_timestamp(&end), "2026-03-01 23:59:59");
        let exact = parse_time_bound("2026-03-01 12:30:00", true).unwrap();
        assert_eq!(display_timestamp(&exact), "2026-03-01 12:30:00");
        assert!(parse_time_bound("yesterday", false).is_err());
    }
}
