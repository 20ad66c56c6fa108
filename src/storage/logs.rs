//! The `logs` table: security events.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, OptionalExtension, Row};

use super::{SqliteStore, StoreError};
use crate::detect::window::{GroupBy, GroupKey, Measure, Selector, WindowGroup, WindowQuery};
use crate::detect::EventSource;
use crate::model::{format_timestamp, Event, EventFilter, NewEvent};

const EVENT_COLUMNS: &str = "id, event_time, source_address, subject, kind, message, severity";

/// Read a stored timestamp column.
pub(crate) fn timestamp_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<Event> {
    Ok(Event {
        id: row.get(0)?,
        timestamp: timestamp_at(row, 1)?,
        source_address: row.get(2)?,
        subject: row.get(3)?,
        kind: row.get(4)?,
        message: row.get(5)?,
        severity: row.get(6)?,
    })
}

impl SqliteStore {
    pub fn insert_event(&self, event: &NewEvent) -> Result<i64, StoreError> {
        let timestamp = event.timestamp.unwrap_or_else(Utc::now);
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO logs (event_time, source_address, subject, kind, message, severity)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    format_timestamp(&timestamp),
                    event.source_address,
                    event.subject,
                    event.kind,
                    event.message,
                    event.severity,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_event(&self, id: i64) -> Result<Option<Event>, StoreError> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {EVENT_COLUMNS} FROM logs WHERE id = ?1"),
                [id],
                event_from_row,
            )
            .optional()
        })
    }

    /// Most recent events first.
    pub fn list_events(&self, limit: usize) -> Result<Vec<Event>, StoreError> {
        self.search_events(&EventFilter {
            limit: Some(limit),
            ..EventFilter::default()
        })
    }

    pub fn search_events(&self, filter: &EventFilter) -> Result<Vec<Event>, StoreError> {
        let mut clauses: Vec<&str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(addr) = &filter.source_address {
            clauses.push("source_address = ?");
            values.push(Value::Text(addr.clone()));
        }
        if let Some(subject) = &filter.subject {
            clauses.push("subject = ?");
            values.push(Value::Text(subject.clone()));
        }
        if let Some(kind) = filter.kind {
            clauses.push("kind = ?");
            values.push(Value::Text(kind.as_str().to_owned()));
        }
        if let Some(severity) = filter.severity {
            clauses.push("severity = ?");
            values.push(Value::Text(severity.as_str().to_owned()));
        }
        if let Some(start) = &filter.start {
            clauses.push("event_time >= ?");
            values.push(Value::Text(format_timestamp(start)));
        }
        if let Some(end) = &filter.end {
            clauses.push("event_time <= ?");
            values.push(Value::Text(format_timestamp(end)));
        }

        let mut sql = format!("SELECT {EVENT_COLUMNS} FROM logs");
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY event_time DESC, id DESC");
        if let Some(limit) = filter.limit {
            sql.push_str(" LIMIT ?");
            values.push(Value::Integer(limit as i64));
        }

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(values.iter()), event_from_row)?;
            rows.collect()
        })
    }

    /// Replace an event's message. The message is the only mutable field.
    pub fn update_event_message(&self, id: i64, message: &str) -> Result<bool, StoreError> {
        self.with_conn(|conn| {
            conn.execute("UPDATE logs SET message = ?1 WHERE id = ?2", params![message, id])
                .map(|changed| changed > 0)
        })
    }

    pub fn delete_event(&self, id: i64) -> Result<bool, StoreError> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM logs WHERE id = ?1", [id])
                .map(|changed| changed > 0)
        })
    }

    pub fn count_events(&self) -> Result<u64, StoreError> {
        let count: i64 =
            self.with_conn(|conn| conn.query_row("SELECT COUNT(*) FROM logs", [], |r| r.get(0)))?;
        Ok(count as u64)
    }
}

/// Build the grouped `SELECT` for a window query, or `None` when nothing can
/// match. Columns: key, measure, total, first, last, distinct subjects (JSON).
fn window_sql(query: &WindowQuery) -> Option<(String, Vec<Value>)> {
    let key = match query.group_by {
        GroupBy::SourceAddress => "source_address",
        GroupBy::EventKind => "kind",
        GroupBy::Nothing => "NULL",
    };
    let measure = match query.measure {
        Measure::Events => "COUNT(*)",
        Measure::DistinctSubjects => "COUNT(DISTINCT subject)",
    };

    let mut sql = format!(
        "SELECT {key}, {measure}, COUNT(*), MIN(event_time), MAX(event_time),
                json_group_array(DISTINCT subject)
         FROM logs
         WHERE event_time > ?"
    );
    let mut values = vec![Value::Text(format_timestamp(&query.since))];

    match &query.selector {
        Selector::Kinds(kinds) => {
            if kinds.is_empty() {
                return None;
            }
            let marks = vec!["?"; kinds.len()].join(", ");
            sql.push_str(&format!(" AND kind IN ({marks})"));
            values.extend(kinds.iter().map(|k| Value::Text(k.as_str().to_owned())));
        }
        Selector::Severity(severity) => {
            sql.push_str(" AND severity = ?");
            values.push(Value::Text(severity.as_str().to_owned()));
        }
    }
    if query.require_subject {
        sql.push_str(" AND subject IS NOT NULL");
    }

    if query.group_by != GroupBy::Nothing {
        sql.push_str(&format!(" GROUP BY {key}"));
    }
    // An ungrouped aggregate over zero rows still yields one row.
    sql.push_str(&format!(" HAVING COUNT(*) > 0 AND {measure} >= ?"));
    values.push(Value::Integer(i64::try_from(query.min_count).unwrap_or(i64::MAX)));
    sql.push_str(&format!(" ORDER BY {measure} DESC"));
    if query.group_by != GroupBy::Nothing {
        sql.push_str(&format!(", {key} ASC"));
    }

    Some((sql, values))
}

fn subjects_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<BTreeSet<String>> {
    let text: String = row.get(idx)?;
    let subjects: Vec<Option<String>> = serde_json::from_str(&text).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(subjects.into_iter().flatten().collect())
}

impl EventSource for SqliteStore {
    fn query_window(&self, query: &WindowQuery) -> Result<Vec<WindowGroup>, StoreError> {
        let Some((sql, values)) = window_sql(query) else {
            return Ok(Vec::new());
        };
        let group_by = query.group_by;

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let groups = stmt.query_map(params_from_iter(values.iter()), |row| {
                let key = match group_by {
                    GroupBy::SourceAddress => GroupKey::Address(row.get(0)?),
                    GroupBy::EventKind => GroupKey::Kind(row.get(0)?),
                    GroupBy::Nothing => GroupKey::All,
                };
                Ok(WindowGroup {
                    key,
                    count: row.get::<_, i64>(1)? as u64,
                    total: row.get::<_, i64>(2)? as u64,
                    first_seen: timestamp_at(row, 3)?,
                    last_seen: timestamp_at(row, 4)?,
                    subjects: subjects_at(row, 5)?,
                })
            })?;
            groups.collect::<rusqlite::Result<Vec<_>>>()
        })
    }
}
