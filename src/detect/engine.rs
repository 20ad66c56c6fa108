use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use super::incident::create_incidents_from_anomalies;
use super::rules::{
    detect_account_compromise_attempts, detect_brute_force_attacks, detect_high_severity_events,
    detect_login_spikes,
};
use super::{Anomaly, DetectError, EventSource, IncidentSink, Rule};

/// Window and threshold for one rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSettings {
    pub window_minutes: i64,
    pub threshold: u64,
}

impl RuleSettings {
    pub const fn new(window_minutes: i64, threshold: u64) -> Self {
        Self { window_minutes, threshold }
    }

    pub fn window(&self) -> Result<Duration, DetectError> {
        Duration::try_minutes(self.window_minutes).ok_or_else(|| {
            DetectError::InvalidParameters(format!(
                "window of {} minutes is out of range",
                self.window_minutes
            ))
        })
    }
}

/// One rule's settings as written in the config file; missing fields keep
/// that rule's default.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RuleOverrides {
    window_minutes: Option<i64>,
    threshold: Option<u64>,
}

impl RuleOverrides {
    fn apply(self, default: RuleSettings) -> RuleSettings {
        RuleSettings {
            window_minutes: self.window_minutes.unwrap_or(default.window_minutes),
            threshold: self.threshold.unwrap_or(default.threshold),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DetectionOverrides {
    brute_force: RuleOverrides,
    account_compromise: RuleOverrides,
    login_spike: RuleOverrides,
    high_severity_cluster: RuleOverrides,
    auto_create_incidents: Option<bool>,
}

impl From<DetectionOverrides> for DetectionConfig {
    fn from(raw: DetectionOverrides) -> Self {
        let base = DetectionConfig::default();
        Self {
            brute_force: raw.brute_force.apply(base.brute_force),
            account_compromise: raw.account_compromise.apply(base.account_compromise),
            login_spike: raw.login_spike.apply(base.login_spike),
            high_severity_cluster: raw.high_severity_cluster.apply(base.high_severity_cluster),
            auto_create_incidents: raw.auto_create_incidents.unwrap_or(base.auto_create_incidents),
        }
    }
}

/// Per-rule settings for a scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "DetectionOverrides")]
pub struct DetectionConfig {
    pub brute_force: RuleSettings,
    pub account_compromise: RuleSettings,
    pub login_spike: RuleSettings,
    pub high_severity_cluster: RuleSettings,
    /// Whether scheduled and API-triggered scans open incidents.
    pub auto_create_incidents: bool,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            brute_force: RuleSettings::new(60, 5),
            account_compromise: RuleSettings::new(30, 3),
            login_spike: RuleSettings::new(10, 20),
            high_severity_cluster: RuleSettings::new(24 * 60, 3),
            auto_create_incidents: true,
        }
    }
}

impl DetectionConfig {
    pub fn settings(&self, rule: Rule) -> RuleSettings {
        match rule {
            Rule::BruteForce => self.brute_force,
            Rule::AccountCompromise => self.account_compromise,
            Rule::LoginSpike => self.login_spike,
            Rule::HighSeverityCluster => self.high_severity_cluster,
        }
    }
}

/// Outcome of a single rule within a scan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleReport {
    pub rule: Rule,
    pub count: usize,
    /// Set when the rule failed and contributed nothing.
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    /// In rule order, then each rule's own order.
    pub anomalies: Vec<Anomaly>,
    pub total_count: usize,
    pub rules: Vec<RuleReport>,
    pub incidents_created: usize,
}

impl ScanSummary {
    pub fn count_for(&self, rule: Rule) -> usize {
        self.rules
            .iter()
            .find(|r| r.rule == rule)
            .map_or(0, |r| r.count)
    }

    pub fn failed_rules(&self) -> impl Iterator<Item = &RuleReport> {
        self.rules.iter().filter(|r| r.error.is_some())
    }
}

fn run_rule(
    events: &dyn EventSource,
    rule: Rule,
    settings: RuleSettings,
) -> Result<Vec<Anomaly>, DetectError> {
    let window = settings.window()?;
    match rule {
        Rule::BruteForce => detect_brute_force_attacks(events, window, settings.threshold),
        Rule::AccountCompromise => {
            detect_account_compromise_attempts(events, window, settings.threshold)
        }
        Rule::LoginSpike => detect_login_spikes(events, window, settings.threshold),
        Rule::HighSeverityCluster => detect_high_severity_events(events, window, settings.threshold),
    }
}

/// Run every rule in order, then open incidents for what was found.
///
/// A rule that fails is logged, contributes no anomalies and is marked in
/// its [`RuleReport`]; the remaining rules still run.
pub fn run_detections(
    events: &dyn EventSource,
    incidents: &dyn IncidentSink,
    config: &DetectionConfig,
    auto_create: bool,
) -> ScanSummary {
    let run_id = Uuid::new_v4();
    let started_at = Utc::now();
    info!(%run_id, "Running anomaly detection scan");

    let mut anomalies = Vec::new();
    let mut rules = Vec::with_capacity(Rule::ALL.len());

    for rule in Rule::ALL {
        let settings = config.settings(rule);
        match run_rule(events, rule, settings) {
            Ok(found) => {
                info!(%run_id, %rule, count = found.len(), "rule finished");
                rules.push(RuleReport { rule, count: found.len(), error: None });
                anomalies.extend(found);
            }
            Err(e) => {
                warn!(%run_id, %rule, error = %e, "rule failed, continuing without it");
                rules.push(RuleReport { rule, count: 0, error: Some(e.to_string()) });
            }
        }
    }

    let total_count = anomalies.len();
    let incidents_created = if total_count > 0 {
        create_incidents_from_anomalies(incidents, &anomalies, auto_create)
    } else {
        0
    };

    if auto_create && incidents_created < total_count {
        warn!(%run_id, total_count, incidents_created, "some incidents could not be opened");
    }
    info!(%run_id, total_count, incidents_created, "Anomaly detection scan complete");

    ScanSummary {
        run_id,
        started_at,
        anomalies,
        total_count,
        rules,
        incidents_created,
    }
}

/// Scan with the default windows and thresholds.
pub fn run_all_detections<S>(store: &S, auto_create_incidents: bool) -> ScanSummary
where
    S: EventSource + IncidentSink,
{
    run_detections(store, store, &DetectionConfig::default(), auto_create_incidents)
}

/// A store paired with the detection settings the daemon runs with.
#[derive(Clone)]
pub struct AnomalyEngine<S> {
    store: S,
    config: DetectionConfig,
}

impl<S> AnomalyEngine<S>
where
    S: EventSource + IncidentSink,
{
    pub fn new(store: S) -> Self {
        Self::with_config(store, DetectionConfig::default())
    }

    pub fn with_config(store: S, config: DetectionConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    /// Scan using the configured incident policy.
    pub fn run_scan(&self) -> ScanSummary {
        self.run_scan_with(self.config.auto_create_incidents)
    }

    pub fn run_scan_with(&self, auto_create: bool) -> ScanSummary {
        run_detections(&self.store, &self.store, &self.config, auto_create)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::window::{WindowGroup, WindowQuery};
    use crate::model::{EventKind, NewEvent, NewIncident};
    use crate::storage::{SqliteStore, StoreError};

    /// Fails the n-th window query; delegates everything else.
    struct FlakySource<'a> {
        inner: &'a SqliteStore,
        fail_call: usize,
        calls: std::cell::Cell<usize>,
    }

    impl EventSource for FlakySource<'_> {
        fn query_window(&self, query: &WindowQuery) -> Result<Vec<WindowGroup>, StoreError> {
            let n = self.calls.get();
            self.calls.set(n + 1);
            if n == self.fail_call {
                return Err(StoreError::TimedOut(std::time::Duration::from_millis(5)));
            }
            self.inner.query_window(query)
        }
    }

    struct NoIncidents;

    impl IncidentSink for NoIncidents {
        fn create_incident(&self, _: &NewIncident) -> Result<i64, StoreError> {
            Err(StoreError::TimedOut(std::time::Duration::from_millis(5)))
        }
    }

    /// Routes the first window query to a store whose only connection is
    /// checked out; later queries go to the working store.
    struct StarvedFirst<'a> {
        starved: &'a SqliteStore,
        healthy: &'a SqliteStore,
        calls: std::cell::Cell<usize>,
    }

    impl EventSource for StarvedFirst<'_> {
        fn query_window(&self, query: &WindowQuery) -> Result<Vec<WindowGroup>, StoreError> {
            let n = self.calls.get();
            self.calls.set(n + 1);
            if n == 0 {
                self.starved.query_window(query)
            } else {
                self.healthy.query_window(query)
            }
        }
    }

    /// A store over a one-connection pool with a short checkout timeout.
    fn single_connection_store() -> SqliteStore {
        let pool = r2d2::Pool::builder()
            .max_size(1)
            .connection_timeout(std::time::Duration::from_millis(50))
            .build(r2d2_sqlite::SqliteConnectionManager::memory())
            .unwrap();
        SqliteStore::new(pool)
    }

    fn seed_attack(store: &SqliteStore) {
        for user in ["a", "b", "c", "d", "e", "f"] {
            store
                .insert_event(&NewEvent::new("203.0.113.100", EventKind::LoginFailed).subject(user))
                .unwrap();
        }
    }

    #[test]
    fn test_summary_counts_per_rule_in_order() {
        let store = SqliteStore::in_memory().unwrap();
        seed_attack(&store);

        let summary = run_all_detections(&store, false);
        let order: Vec<Rule> = summary.rules.iter().map(|r| r.rule).collect();
        assert_eq!(order, Rule::ALL);
        assert_eq!(summary.total_count, 2);
        assert_eq!(summary.count_for(Rule::BruteForce), 1);
        assert_eq!(summary.count_for(Rule::AccountCompromise), 1);
        assert_eq!(summary.count_for(Rule::LoginSpike), 0);
        assert_eq!(summary.anomalies[0].rule(), Rule::BruteForce);
        assert_eq!(summary.anomalies[1].rule(), Rule::AccountCompromise);
        assert_eq!(summary.incidents_created, 0);
        assert_eq!(store.count_incidents().unwrap(), 0);
    }

    #[test]
    fn test_failed_rule_does_not_stop_the_others() {
        let store = SqliteStore::in_memory().unwrap();
        seed_attack(&store);
        let flaky = FlakySource { inner: &store, fail_call: 0, calls: Default::default() };

        let summary = run_detections(&flaky, &store, &DetectionConfig::default(), true);
        assert_eq!(flaky.calls.get(), 4);
        let failed: Vec<Rule> = summary.failed_rules().map(|r| r.rule).collect();
        assert_eq!(failed, [Rule::BruteForce]);
        assert_eq!(summary.count_for(Rule::AccountCompromise), 1);
        assert_eq!(summary.incidents_created, 1);
    }

    #[test]
    fn test_write_failures_reduce_created_count() {
        let store = SqliteStore::in_memory().unwrap();
        seed_attack(&store);

        let summary = run_detections(&store, &NoIncidents, &DetectionConfig::default(), true);
        assert_eq!(summary.total_count, 2);
        assert_eq!(summary.incidents_created, 0);
    }

    #[test]
    fn test_engine_uses_configured_thresholds() {
        let store = SqliteStore::in_memory().unwrap();
        seed_attack(&store);
        let config = DetectionConfig {
            brute_force: RuleSettings::new(60, 7),
            auto_create_incidents: false,
            ..DetectionConfig::default()
        };
        let engine = AnomalyEngine::with_config(store.clone(), config);

        let summary = engine.run_scan();
        assert_eq!(summary.count_for(Rule::BruteForce), 0);
        assert_eq!(summary.count_for(Rule::AccountCompromise), 1);
        assert_eq!(store.count_incidents().unwrap(), 0);

        let summary = engine.run_scan_with(true);
        assert_eq!(summary.incidents_created, 1);
        assert_eq!(store.count_incidents().unwrap(), 1);
    }

    #[test]
    fn test_out_of_range_window_fails_only_that_rule() {
        let store = SqliteStore::in_memory().unwrap();
        seed_attack(&store);
        let config: DetectionConfig = toml::from_str(
            r#"
            [brute_force]
            window_minutes = 9223372036854775807
            "#,
        )
        .unwrap();

        let summary = run_detections(&store, &store, &config, false);
        let failed: Vec<Rule> = summary.failed_rules().map(|r| r.rule).collect();
        assert_eq!(failed, [Rule::BruteForce]);
        assert!(summary.rules[0].error.as_deref().unwrap_or("").contains("out of range"));
        assert_eq!(summary.count_for(Rule::AccountCompromise), 1);
    }

    #[test]
    fn test_unavailable_store_is_a_rule_failure() {
        let starved = single_connection_store();
        let _held = starved.pool().get().unwrap();

        let result = detect_brute_force_attacks(&starved, Duration::minutes(60), 5);
        assert!(matches!(result, Err(DetectError::Store(StoreError::Unavailable(_)))));

        let store = SqliteStore::in_memory().unwrap();
        seed_attack(&store);
        let source = StarvedFirst { starved: &starved, healthy: &store, calls: Default::default() };

        let summary = run_detections(&source, &store, &DetectionConfig::default(), true);
        assert_eq!(source.calls.get(), 4);
        let failed: Vec<Rule> = summary.failed_rules().map(|r| r.rule).collect();
        assert_eq!(failed, [Rule::BruteForce]);
        assert_eq!(summary.count_for(Rule::AccountCompromise), 1);
        assert_eq!(summary.incidents_created, 1);
    }
}
