use tracing::{debug, warn};

use super::{Anomaly, IncidentSink};
use crate::model::{display_timestamp, NewIncident};

/// Reporter recorded on incidents opened by a detection scan.
pub const AUTO_REPORTER: &str = "anomaly_detection_system";

impl Anomaly {
    pub fn title(&self) -> String {
        match self {
            Anomaly::BruteForce { source_address, .. } => {
                format!("Brute Force Attack from {source_address}")
            }
            Anomaly::AccountCompromise { source_address, .. } => {
                format!("Account Compromise Attempt from {source_address}")
            }
            Anomaly::LoginSpike { .. } => "Unexpected Login Activity Spike Detected".to_owned(),
            Anomaly::HighSeverityCluster { event_kind, .. } => {
                format!("Multiple High Severity {event_kind} Events")
            }
        }
    }

    pub fn description(&self) -> String {
        match self {
            Anomaly::BruteForce {
                source_address,
                failed_attempts,
                first_seen,
                last_seen,
                targets,
                ..
            } => {
                let targets = if targets.is_empty() {
                    "none recorded".to_owned()
                } else {
                    targets.iter().cloned().collect::<Vec<_>>().join(", ")
                };
                format!(
                    "IP {source_address} made {failed_attempts} failed login attempts. \
                     Targets: {targets}. Period: {} to {}.",
                    display_timestamp(first_seen),
                    display_timestamp(last_seen),
                )
            }
            Anomaly::AccountCompromise {
                source_address,
                unique_subjects,
                total_attempts,
                first_seen,
                last_seen,
                ..
            } => format!(
                "IP {source_address} attempted to access {unique_subjects} unique accounts. \
                 Total attempts: {total_attempts}. Period: {} to {}.",
                display_timestamp(first_seen),
                display_timestamp(last_seen),
            ),
            Anomaly::LoginSpike {
                login_count,
                window_start,
                window_end,
                window_minutes,
                ..
            } => format!(
                "{login_count} login events detected in the last {window_minutes} minutes \
                 ({} to {}), well above normal activity.",
                display_timestamp(window_start),
                display_timestamp(window_end),
            ),
            Anomaly::HighSeverityCluster {
                event_kind,
                event_count,
                first_seen,
                last_seen,
                ..
            } => format!(
                "{event_count} high severity {event_kind} events detected. \
                 First occurrence: {}, last occurrence: {}.",
                display_timestamp(first_seen),
                display_timestamp(last_seen),
            ),
        }
    }

    /// The incident this anomaly opens.
    pub fn to_incident(&self) -> NewIncident {
        NewIncident {
            title: self.title(),
            description: Some(self.description()),
            severity: self.severity(),
            reporter: Some(AUTO_REPORTER.to_owned()),
            log_id: None,
        }
    }
}

/// Open one incident per anomaly and return how many writes succeeded.
///
/// Nothing is written when `auto_create` is false. There is no check against
/// incidents opened by earlier scans. A failed write is logged and skipped.
pub fn create_incidents_from_anomalies(
    sink: &dyn IncidentSink,
    anomalies: &[Anomaly],
    auto_create: bool,
) -> usize {
    if !auto_create {
        return 0;
    }

    let mut created = 0;
    for anomaly in anomalies {
        let incident = anomaly.to_incident();
        match sink.create_incident(&incident) {
            Ok(id) => {
                debug!(id, rule = %anomaly.rule(), title = %incident.title, "incident opened");
                created += 1;
            }
            Err(e) => {
                warn!(rule = %anomaly.rule(), title = %incident.title, error = %e, "failed to open incident");
            }
        }
    }
    created
}
