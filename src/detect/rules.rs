//! The four windowed detection rules.
//!
//! Each rule anchors its window at the wall clock when it is called, issues a
//! single aggregation against the event source, and turns every group that
//! reaches the threshold into an [`Anomaly`], highest count first.

use chrono::{DateTime, Duration, Utc};

use super::window::{GroupBy, GroupKey, Measure, Selector, WindowQuery};
use super::{Anomaly, DetectError, EventSource};
use crate::model::{EventKind, Severity};

/// Brute-force groups at or above this many failures are `high`.
pub const BRUTE_FORCE_HIGH_AT: u64 = 10;

fn window_start(window: Duration, threshold: u64) -> Result<DateTime<Utc>, DetectError> {
    if window <= Duration::zero() {
        return Err(DetectError::InvalidParameters(format!(
            "window must be positive, got {window}"
        )));
    }
    if threshold == 0 {
        return Err(DetectError::InvalidParameters("threshold must be at least 1".into()));
    }
    Utc::now()
        .checked_sub_signed(window)
        .ok_or_else(|| DetectError::InvalidParameters(format!("window {window} is out of range")))
}

/// Failed logins grouped by source address.
pub fn detect_brute_force_attacks(
    source: &dyn EventSource,
    window: Duration,
    threshold: u64,
) -> Result<Vec<Anomaly>, DetectError> {
    let since = window_start(window, threshold)?;
    let query = WindowQuery::new(Selector::Kinds(vec![EventKind::LoginFailed]), since)
        .group_by(GroupBy::SourceAddress)
        .min_count(threshold);

    let anomalies = source
        .query_window(&query)?
        .into_iter()
        .filter_map(|g| match g.key {
            GroupKey::Address(source_address) => Some(Anomaly::BruteForce {
                source_address,
                failed_attempts: g.count,
                first_seen: g.first_seen,
                last_seen: g.last_seen,
                targets: g.subjects,
                severity: if g.count >= BRUTE_FORCE_HIGH_AT {
                    Severity::High
                } else {
                    Severity::Medium
                },
            }),
            _ => None,
        })
        .collect();
    Ok(anomalies)
}

/// Failed logins against many distinct subjects from one source address.
/// Attempts without a subject are ignored.
pub fn detect_account_compromise_attempts(
    source: &dyn EventSource,
    window: Duration,
    threshold: u64,
) -> Result<Vec<Anomaly>, DetectError> {
    let since = window_start(window, threshold)?;
    let query = WindowQuery::new(Selector::Kinds(vec![EventKind::LoginFailed]), since)
        .require_subject()
        .group_by(GroupBy::SourceAddress)
        .measure(Measure::DistinctSubjects)
        .min_count(threshold);

    let anomalies = source
        .query_window(&query)?
        .into_iter()
        .filter_map(|g| match g.key {
            GroupKey::Address(source_address) => Some(Anomaly::AccountCompromise {
                source_address,
                unique_subjects: g.count,
                total_attempts: g.total,
                first_seen: g.first_seen,
                last_seen: g.last_seen,
                severity: Severity::High,
            }),
            _ => None,
        })
        .collect();
    Ok(anomalies)
}

/// Total login volume, successes and failures together. Yields at most one
/// anomaly per call.
pub fn detect_login_spikes(
    source: &dyn EventSource,
    window: Duration,
    threshold: u64,
) -> Result<Vec<Anomaly>, DetectError> {
    let since = window_start(window, threshold)?;
    let query = WindowQuery::new(
        Selector::Kinds(vec![EventKind::LoginSuccess, EventKind::LoginFailed]),
        since,
    )
    .min_count(threshold);

    let anomalies = source
        .query_window(&query)?
        .into_iter()
        .take(1)
        .map(|g| Anomaly::LoginSpike {
            login_count: g.count,
            window_start: g.first_seen,
            window_end: g.last_seen,
            window_minutes: window.num_minutes(),
            severity: Severity::Medium,
        })
        .collect();
    Ok(anomalies)
}

/// High-severity events of the same kind.
pub fn detect_high_severity_events(
    source: &dyn EventSource,
    window: Duration,
    threshold: u64,
) -> Result<Vec<Anomaly>, DetectError> {
    let since = window_start(window, threshold)?;
    let query = WindowQuery::new(Selector::Severity(Severity::High), since)
        .group_by(GroupBy::EventKind)
        .min_count(threshold);

    let anomalies = source
        .query_window(&query)?
        .into_iter()
        .filter_map(|g| match g.key {
            GroupKey::Kind(event_kind) => Some(Anomaly::HighSeverityCluster {
                event_kind,
                event_count: g.count,
                first_seen: g.first_seen,
                last_seen: g.last_seen,
                severity: Severity::High,
            }),
            _ => None,
        })
        .collect();
    Ok(anomalies)
}
