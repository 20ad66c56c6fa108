//! Weekly activity summary.

use std::collections::BTreeMap;
use std::fmt::Write;

use chrono::{Days, NaiveDate, TimeZone, Utc};
use serde::Serialize;

use crate::model::{format_timestamp, EventKind};
use crate::storage::{SqliteStore, StoreError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailySummary {
    pub date: NaiveDate,
    pub total_logs: u64,
    pub failed_logins: u64,
    pub incidents: u64,
}

/// Per-day counts for the seven days ending on `today` (UTC), oldest first.
/// Days without any logged event are omitted.
pub fn weekly_summary(store: &SqliteStore, today: NaiveDate) -> Result<Vec<DailySummary>, StoreError> {
    let first = today - Days::new(6);
    let end = today + Days::new(1);
    let lower = format_timestamp(&Utc.from_utc_datetime(&first.and_hms_opt(0, 0, 0).unwrap_or_default()));
    let upper = format_timestamp(&Utc.from_utc_datetime(&end.and_hms_opt(0, 0, 0).unwrap_or_default()));

    let (logs, incidents) = store.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT substr(event_time, 1, 10) AS day,
                    COUNT(*),
                    SUM(CASE WHEN kind = ?3 THEN 1 ELSE 0 END)
             FROM logs
             WHERE event_time >= ?1 AND event_time < ?2
             GROUP BY day",
        )?;
        let logs = stmt
            .query_map(rusqlite::params![lower, upper, EventKind::LoginFailed], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?, row.get::<_, i64>(2)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut stmt = conn.prepare(
            "SELECT substr(created_at, 1, 10) AS day, COUNT(*)
             FROM incidents
             WHERE created_at >= ?1 AND created_at < ?2
             GROUP BY day",
        )?;
        let incidents = stmt
            .query_map(rusqlite::params![lower, upper], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok((logs, incidents))
    })?;

    let incidents: BTreeMap<String, i64> = incidents.into_iter().collect();
    let mut days: Vec<DailySummary> = logs
        .into_iter()
        .filter_map(|(day, total, failed)| {
            let date = NaiveDate::parse_from_str(&day, "%Y-%m-%d").ok()?;
            Some(DailySummary {
                date,
                total_logs: total as u64,
                failed_logins: failed as u64,
                incidents: incidents.get(&day).copied().unwrap_or(0) as u64,
            })
        })
        .collect();
    days.sort_by_key(|d| d.date);
    Ok(days)
}

pub fn render_weekly(days: &[DailySummary]) -> String {
    let mut out = String::new();
    if days.is_empty() {
        out.push_str("No logs found\n");
        return out;
    }

    let line = "=".repeat(70);
    let _ = writeln!(out, "{line}");
    let _ = writeln!(out, "WEEKLY SECURITY LOG SUMMARY");
    let _ = writeln!(out, "{line}");
    let _ = writeln!(out, "{:<12} {:<12} {:<15} {:<12}", "Date", "Total Logs", "Failed Logins", "Incidents");
    let _ = writeln!(out, "{}", "-".repeat(70));
    for d in days {
        let _ = writeln!(
            out,
            "{:<12} {:<12} {:<15} {:<12}",
            d.date.format("%Y-%m-%d").to_string(),
            d.total_logs,
            d.failed_logins,
            d.incidents
        );
    }
    let _ = writeln!(out, "{line}");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NewEvent, NewIncident, Severity};
    use chrono::Duration;

    #[test]
    fn test_weekly_summary_buckets_by_day() {
        let store = SqliteStore::in_memory().unwrap();
        let now = Utc::now();
        let today = now.date_naive();

        store.insert_event(&NewEvent::new("10.0.0.1", EventKind::LoginFailed).at(now)).unwrap();
        store.insert_event(&NewEvent::new("10.0.0.1", EventKind::LoginSuccess).at(now)).unwrap();
        store
            .insert_event(&NewEvent::new("10.0.0.1", EventKind::LoginFailed).at(now - Duration::days(2)))
            .unwrap();
        store
            .insert_event(&NewEvent::new("10.0.0.1", EventKind::LoginFailed).at(now - Duration::days(9)))
            .unwrap();
        store
            .insert_incident(&NewIncident {
                title: "Test".into(),
                description: None,
                severity: Severity::Low,
                reporter: None,
                log_id: None,
            })
            .unwrap();

        let days = weekly_summary(&store, today).unwrap();
        assert_eq!(days.len(), 2);
        let last = days.last().unwrap();
        assert_eq!(last.date, today);
        assert_eq!(last.total_logs, 2);
        assert_eq!(last.failed_logins, 1);
        assert_eq!(last.incidents, 1);
        assert_eq!(days[0].failed_logins, 1);
        assert_eq!(days[0].incidents, 0);

        let table = render_weekly(&days);
        assert!(table.contains("WEEKLY SECURITY LOG SUMMARY"));
        assert!(table.contains(&today.format("%Y-%m-%d").to_string()));
    }

    #[test]
    fn test_render_empty_week() {
        assert_eq!(render_weekly(&[]), "No logs found\n");
    }
}
