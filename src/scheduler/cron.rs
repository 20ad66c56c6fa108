use std::str::FromStr;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, Utc};
use cron::Schedule as CronSchedule;

/// When background scans fire.
#[derive(Debug, Clone)]
pub struct ScanScheduler {
    expr: String,
    schedule: CronSchedule,
}

impl ScanScheduler {
    /// Parse a cron expression (seconds field first, e.g. `0 */15 * * * *`).
    pub fn parse(expr: &str) -> Result<Self> {
        let schedule = CronSchedule::from_str(expr)
            .map_err(|e| anyhow!("Invalid cron expression '{}': {}", expr, e))?;
        Ok(Self {
            expr: expr.to_owned(),
            schedule,
        })
    }

    pub fn expr(&self) -> &str {
        &self.expr
    }

    pub fn next_after(&self, after: &DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(after).next()
    }

    /// Fire times in the next `hours` hours. This is strictly a dry-run
    /// preview.
    pub fn preview(&self, from: &DateTime<Utc>, hours: u64) -> Result<Vec<DateTime<Utc>>> {
        let end = i64::try_from(hours)
            .ok()
            .and_then(Duration::try_hours)
            .and_then(|span| from.checked_add_signed(span))
            .ok_or_else(|| anyhow!("Preview horizon of {} hours is out of range", hours))?;
        Ok(self
            .schedule
            .after(from)
            .take_while(|t| *t <= end)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_rejects_invalid_expression() {
        assert!(ScanScheduler::parse("every five minutes").is_err());
    }

    #[test]
    fn test_preview_quarter_hourly() {
        let scheduler = ScanScheduler::parse("0 */15 * * * *").unwrap();
        let from = Utc.with_ymd_and_hms(2026, 10, 19, 10, 1, 0).unwrap();

        let runs = scheduler.preview(&from, 1).unwrap();
        assert_eq!(runs.len(), 4);
        assert_eq!(runs[0], Utc.with_ymd_and_hms(2026, 10, 19, 10, 15, 0).unwrap());
        assert_eq!(scheduler.next_after(&from), Some(runs[0]));
    }

    #[test]
    fn test_preview_rejects_huge_horizon() {
        let scheduler = ScanScheduler::parse("0 */15 * * * *").unwrap();
        let from = Utc.with_ymd_and_hms(2026, 10, 19, 10, 1, 0).unwrap();

        assert!(scheduler.preview(&from, i64::MAX as u64).is_err());
        assert!(scheduler.preview(&from, u64::MAX).is_err());
        assert_eq!(scheduler.preview(&from, 0).unwrap().len(), 0);
    }
}
