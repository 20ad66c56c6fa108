//! End-to-end detection runs against a real SQLite store.

use std::sync::Barrier;

use chrono::{Duration, Utc};

use sentrylog::config::DatabaseConfig;
use sentrylog::detect::{
    detect_account_compromise_attempts, detect_brute_force_attacks, detect_login_spikes,
    run_all_detections, Anomaly, Rule, AUTO_REPORTER,
};
use sentrylog::model::{EventKind, IncidentFilter, NewEvent, Severity};
use sentrylog::storage::SqliteStore;

fn minutes_ago(n: i64) -> chrono::DateTime<Utc> {
    Utc::now() - Duration::minutes(n)
}

#[test]
fn test_anonymous_brute_force() {
    let store = SqliteStore::in_memory().unwrap();
    for i in 0..7 {
        store
            .insert_event(&NewEvent::new("1.2.3.100", EventKind::LoginFailed).at(minutes_ago(i * 5 + 1)))
            .unwrap();
    }

    let found = detect_brute_force_attacks(&store, Duration::minutes(60), 5).unwrap();
    assert_eq!(found.len(), 1);
    match &found[0] {
        Anomaly::BruteForce { source_address, failed_attempts, targets, severity, .. } => {
            assert_eq!(source_address, "1.2.3.100");
            assert_eq!(*failed_attempts, 7);
            assert!(targets.is_empty());
            assert_eq!(*severity, Severity::Medium);
        }
        other => panic!("unexpected anomaly {other:?}"),
    }
}

#[test]
fn test_events_outside_window_are_ignored() {
    let store = SqliteStore::in_memory().unwrap();
    for i in 0..3 {
        store
            .insert_event(&NewEvent::new("1.2.3.101", EventKind::LoginFailed).at(minutes_ago(i + 1)))
            .unwrap();
    }
    for i in 0..5 {
        store
            .insert_event(&NewEvent::new("1.2.3.101", EventKind::LoginFailed).at(minutes_ago(120 + i)))
            .unwrap();
    }

    let found = detect_brute_force_attacks(&store, Duration::minutes(60), 5).unwrap();
    assert!(found.is_empty());
}

#[test]
fn test_account_enumeration() {
    let store = SqliteStore::in_memory().unwrap();
    for (i, user) in ["admin", "root", "alice", "bob", "admin"].iter().enumerate() {
        store
            .insert_event(
                &NewEvent::new("5.6.7.8", EventKind::LoginFailed)
                    .subject(*user)
                    .at(minutes_ago(i as i64 + 1)),
            )
            .unwrap();
    }
    // Anonymous attempts from another address never qualify.
    for i in 0..6 {
        store
            .insert_event(&NewEvent::new("5.6.7.9", EventKind::LoginFailed).at(minutes_ago(i + 1)))
            .unwrap();
    }

    let found = detect_account_compromise_attempts(&store, Duration::minutes(30), 3).unwrap();
    assert_eq!(found.len(), 1);
    match &found[0] {
        Anomaly::AccountCompromise { source_address, unique_subjects, total_attempts, severity, .. } => {
            assert_eq!(source_address, "5.6.7.8");
            assert_eq!(*unique_subjects, 4);
            assert_eq!(*total_attempts, 5);
            assert_eq!(*severity, Severity::High);
        }
        other => panic!("unexpected anomaly {other:?}"),
    }
}

#[test]
fn test_mixed_login_spike() {
    let store = SqliteStore::in_memory().unwrap();
    for i in 0..25 {
        let kind = if i % 3 == 0 { EventKind::LoginFailed } else { EventKind::LoginSuccess };
        store
            .insert_event(
                &NewEvent::new(format!("172.16.0.{}", i % 7), kind)
                    .at(Utc::now() - Duration::seconds(i * 20 + 5)),
            )
            .unwrap();
    }
    // Other kinds do not count towards login volume.
    store
        .insert_event(&NewEvent::new("172.16.0.1", EventKind::AccessDenied))
        .unwrap();

    let found = detect_login_spikes(&store, Duration::minutes(10), 20).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].rule(), Rule::LoginSpike);
    assert_eq!(found[0].count(), 25);
}

#[test]
fn test_full_scan_opens_system_incidents() {
    let store = SqliteStore::in_memory().unwrap();
    for _ in 0..6 {
        store
            .insert_event(&NewEvent::new("9.9.9.9", EventKind::LoginFailed).subject("admin"))
            .unwrap();
    }
    let before = store.count_incidents().unwrap();

    let summary = run_all_detections(&store, true);
    assert_eq!(summary.count_for(Rule::BruteForce), 1);
    assert_eq!(summary.incidents_created, summary.total_count);

    let after = store.count_incidents().unwrap();
    assert!(after > before);
    let incidents = store.list_incidents().unwrap();
    assert!(incidents.iter().all(|i| i.reporter.as_deref() == Some(AUTO_REPORTER)));
    assert!(incidents.iter().any(|i| i.title.contains("9.9.9.9")));
}

#[test]
fn test_repeated_scans_are_not_deduplicated() {
    let store = SqliteStore::in_memory().unwrap();
    for _ in 0..5 {
        store
            .insert_event(&NewEvent::new("9.9.9.10", EventKind::LoginFailed))
            .unwrap();
    }

    let first = run_all_detections(&store, true);
    let second = run_all_detections(&store, true);
    assert_eq!(first.incidents_created, 1);
    assert_eq!(second.incidents_created, 1);
    assert_eq!(store.count_incidents().unwrap(), 2);
}

#[test]
fn test_concurrent_scans_both_open_incidents() {
    let dir = tempfile::tempdir().unwrap();
    let config = DatabaseConfig {
        path: dir.path().join("concurrent.db"),
        pool_size: 4,
        ..DatabaseConfig::default()
    };
    let store = SqliteStore::open(&config).unwrap();
    for _ in 0..5 {
        store
            .insert_event(&NewEvent::new("9.9.9.12", EventKind::LoginFailed))
            .unwrap();
    }

    let barrier = Barrier::new(2);
    let created: Vec<usize> = std::thread::scope(|scope| {
        let scans: Vec<_> = (0..2)
            .map(|_| {
                scope.spawn(|| {
                    barrier.wait();
                    run_all_detections(&store, true).incidents_created
                })
            })
            .collect();
        scans.into_iter().map(|scan| scan.join().unwrap()).collect()
    });

    assert_eq!(created, [1, 1]);
    assert_eq!(store.count_incidents().unwrap(), 2);
    let incidents = store.list_incidents().unwrap();
    assert_eq!(incidents[0].title, incidents[1].title);
}

#[test]
fn test_scan_without_incidents_writes_nothing() {
    let store = SqliteStore::in_memory().unwrap();
    for _ in 0..12 {
        store
            .insert_event(&NewEvent::new("9.9.9.11", EventKind::LoginFailed))
            .unwrap();
    }

    let summary = run_all_detections(&store, false);
    assert_eq!(summary.total_count, 1);
    assert_eq!(summary.anomalies[0].severity(), Severity::High);
    assert_eq!(summary.incidents_created, 0);
    assert_eq!(store.count_incidents().unwrap(), 0);
}

#[test]
fn test_file_backed_store_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let config = DatabaseConfig {
        path: dir.path().join("nested").join("sentry.db"),
        ..DatabaseConfig::default()
    };

    {
        let store = SqliteStore::open(&config).unwrap();
        for _ in 0..5 {
            store
                .insert_event(&NewEvent::new("8.8.4.4", EventKind::LoginFailed))
                .unwrap();
        }
        run_all_detections(&store, true);
    }

    let store = SqliteStore::open(&config).unwrap();
    assert_eq!(store.count_events().unwrap(), 5);
    let filter = IncidentFilter { keyword: Some("8.8.4.4".into()), ..IncidentFilter::default() };
    assert_eq!(store.search_incidents(&filter).unwrap().len(), 1);
}
