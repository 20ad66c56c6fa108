use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::{EventKind, Severity};

/// The detection rules, in the order a scan runs them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    BruteForce,
    AccountCompromise,
    LoginSpike,
    HighSeverityCluster,
}

impl Rule {
    pub const ALL: [Rule; 4] = [
        Rule::BruteForce,
        Rule::AccountCompromise,
        Rule::LoginSpike,
        Rule::HighSeverityCluster,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Rule::BruteForce => "brute_force",
            Rule::AccountCompromise => "account_compromise",
            Rule::LoginSpike => "login_spike",
            Rule::HighSeverityCluster => "high_severity_cluster",
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A finding from one detection rule, summarizing a qualifying group of
/// events. Recomputed on every scan and never stored; only the incident
/// projected from it is.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Anomaly {
    BruteForce {
        source_address: String,
        failed_attempts: u64,
        first_seen: DateTime<Utc>,
        last_seen: DateTime<Utc>,
        targets: BTreeSet<String>,
        severity: Severity,
    },
    AccountCompromise {
        source_address: String,
        unique_subjects: u64,
        total_attempts: u64,
        first_seen: DateTime<Utc>,
        last_seen: DateTime<Utc>,
        severity: Severity,
    },
    LoginSpike {
        login_count: u64,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        window_minutes: i64,
        severity: Severity,
    },
    HighSeverityCluster {
        event_kind: EventKind,
        event_count: u64,
        first_seen: DateTime<Utc>,
        last_seen: DateTime<Utc>,
        severity: Severity,
    },
}

impl Anomaly {
    pub fn rule(&self) -> Rule {
        match self {
            Anomaly::BruteForce { .. } => Rule::BruteForce,
            Anomaly::AccountCompromise { .. } => Rule::AccountCompromise,
            Anomaly::LoginSpike { .. } => Rule::LoginSpike,
            Anomaly::HighSeverityCluster { .. } => Rule::HighSeverityCluster,
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Anomaly::BruteForce { severity, .. }
            | Anomaly::AccountCompromise { severity, .. }
            | Anomaly::LoginSpike { severity, .. }
            | Anomaly::HighSeverityCluster { severity, .. } => *severity,
        }
    }

    /// The primary count the producing rule thresholds and sorts on.
    pub fn count(&self) -> u64 {
        match self {
            Anomaly::BruteForce { failed_attempts, .. } => *failed_attempts,
            Anomaly::AccountCompromise { unique_subjects, .. } => *unique_subjects,
            Anomaly::LoginSpike { login_count, .. } => *login_count,
            Anomaly::HighSeverityCluster { event_count, .. } => *event_count,
        }
    }
}
