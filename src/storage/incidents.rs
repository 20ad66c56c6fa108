//! The `incidents` table.

use chrono::Utc;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, OptionalExtension, Row};

use super::logs::timestamp_at;
use super::{SqliteStore, StoreError};
use crate::detect::IncidentSink;
use crate::model::{
    format_timestamp, Incident, IncidentFilter, IncidentStatus, NewIncident, Severity,
};

const INCIDENT_COLUMNS: &str =
    "id, title, description, severity, status, log_id, reporter, created_at";

fn incident_from_row(row: &Row<'_>) -> rusqlite::Result<Incident> {
    Ok(Incident {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        severity: row.get(3)?,
        status: row.get(4)?,
        log_id: row.get(5)?,
        reporter: row.get(6)?,
        created_at: timestamp_at(row, 7)?,
    })
}

impl SqliteStore {
    pub fn insert_incident(&self, incident: &NewIncident) -> Result<i64, StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO incidents (title, description, severity, status, log_id, reporter, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    incident.title,
                    incident.description,
                    incident.severity,
                    IncidentStatus::Open,
                    incident.log_id,
                    incident.reporter,
                    format_timestamp(&Utc::now()),
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_incident(&self, id: i64) -> Result<Option<Incident>, StoreError> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {INCIDENT_COLUMNS} FROM incidents WHERE id = ?1"),
                [id],
                incident_from_row,
            )
            .optional()
        })
    }

    /// Newest first.
    pub fn list_incidents(&self) -> Result<Vec<Incident>, StoreError> {
        self.search_incidents(&IncidentFilter::default())
    }

    pub fn search_incidents(&self, filter: &IncidentFilter) -> Result<Vec<Incident>, StoreError> {
        let mut clauses: Vec<&str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(status) = filter.status {
            clauses.push("status = ?");
            values.push(Value::Text(status.as_str().to_owned()));
        }
        if let Some(severity) = filter.severity {
            clauses.push("severity = ?");
            values.push(Value::Text(severity.as_str().to_owned()));
        }
        if let Some(keyword) = &filter.keyword {
            clauses.push("(title LIKE ? OR description LIKE ?)");
            let pattern = format!("%{keyword}%");
            values.push(Value::Text(pattern.clone()));
            values.push(Value::Text(pattern));
        }
        if let Some(start) = &filter.start {
            clauses.push("created_at >= ?");
            values.push(Value::Text(format_timestamp(start)));
        }
        if let Some(end) = &filter.end {
            clauses.push("created_at <= ?");
            values.push(Value::Text(format_timestamp(end)));
        }

        let mut sql = format!("SELECT {INCIDENT_COLUMNS} FROM incidents");
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY created_at DESC, id DESC");

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(values.iter()), incident_from_row)?;
            rows.collect()
        })
    }

    pub fn update_incident_status(&self, id: i64, status: IncidentStatus) -> Result<bool, StoreError> {
        self.with_conn(|conn| {
            conn.execute("UPDATE incidents SET status = ?1 WHERE id = ?2", params![status, id])
                .map(|changed| changed > 0)
        })
    }

    pub fn update_incident_severity(&self, id: i64, severity: Severity) -> Result<bool, StoreError> {
        self.with_conn(|conn| {
            conn.execute("UPDATE incidents SET severity = ?1 WHERE id = ?2", params![severity, id])
                .map(|changed| changed > 0)
        })
    }

    pub fn delete_incident(&self, id: i64) -> Result<bool, StoreError> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM incidents WHERE id = ?1", [id])
                .map(|changed| changed > 0)
        })
    }

    pub fn count_incidents(&self) -> Result<u64, StoreError> {
        let count: i64 = self
            .with_conn(|conn| conn.query_row("SELECT COUNT(*) FROM incidents", [], |r| r.get(0)))?;
        Ok(count as u64)
    }
}

impl IncidentSink for SqliteStore {
    fn create_incident(&self, incident: &NewIncident) -> Result<i64, StoreError> {
        self.insert_incident(incident)
    }
}
