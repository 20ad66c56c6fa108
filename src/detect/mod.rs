//! Anomaly detection over the event log and incident materialization.

pub mod anomaly;
pub mod engine;
pub mod incident;
pub mod report;
pub mod rules;
pub mod window;

use thiserror::Error;

use crate::model::NewIncident;
use crate::storage::StoreError;
use self::window::{WindowGroup, WindowQuery};

pub use self::anomaly::{Anomaly, Rule};
pub use self::engine::{run_all_detections, run_detections, AnomalyEngine, RuleReport, ScanSummary};
pub use self::incident::{create_incidents_from_anomalies, AUTO_REPORTER};
pub use self::rules::{
    detect_account_compromise_attempts, detect_brute_force_attacks, detect_high_severity_events,
    detect_login_spikes,
};

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("invalid rule parameters: {0}")]
    InvalidParameters(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Read side: the windowed aggregation every rule is built on.
pub trait EventSource {
    fn query_window(&self, query: &WindowQuery) -> Result<Vec<WindowGroup>, StoreError>;
}

/// Write side: persist one incident and return its new id.
pub trait IncidentSink {
    fn create_incident(&self, incident: &NewIncident) -> Result<i64, StoreError>;
}

impl<T: EventSource + ?Sized> EventSource for &T {
    fn query_window(&self, query: &WindowQuery) -> Result<Vec<WindowGroup>, StoreError> {
        (**self).query_window(query)
    }
}

impl<T: IncidentSink + ?Sized> IncidentSink for &T {
    fn create_incident(&self, incident: &NewIncident) -> Result<i64, StoreError> {
        (**self).create_incident(incident)
    }
}
