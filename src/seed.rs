//! Sample data for demos: background traffic, one attack pattern per
//! detection rule, and a few operator-reported incidents.

use anyhow::Result;
use chrono::{Duration, Utc};
use rand::distributions::WeightedIndex;
use rand::prelude::*;
use tracing::info;

use crate::model::{EventKind, NewEvent, NewIncident, Severity};
use crate::storage::SqliteStore;

const SUBJECTS: &[Option<&str>] = &[
    Some("admin"),
    Some("root"),
    Some("john.doe"),
    Some("jane.smith"),
    Some("bob.wilson"),
    Some("alice.brown"),
    Some("charlie.davis"),
    Some("david.miller"),
    Some("emma.johnson"),
    Some("frank.garcia"),
    Some("grace.martinez"),
    Some("henry.rodriguez"),
    None,
];

const ADDRESSES: &[&str] = &[
    "192.168.1.10",
    "192.168.1.20",
    "192.168.1.30",
    "192.168.1.40",
    "10.0.0.5",
    "10.0.0.15",
    "10.0.0.25",
    "172.16.0.10",
    "172.16.0.20",
    "203.0.113.5",
    "198.51.100.10",
    "203.0.113.100",
];

/// Share of background traffic per kind.
const KIND_WEIGHTS: [(EventKind, u32); 5] = [
    (EventKind::LoginSuccess, 60),
    (EventKind::LoginFailed, 25),
    (EventKind::AccessDenied, 10),
    (EventKind::DataBreach, 3),
    (EventKind::UnauthorizedAccess, 2),
];

fn messages(kind: EventKind) -> &'static [&'static str] {
    match kind {
        EventKind::LoginSuccess => &[
            "User logged in successfully",
            "Authentication successful",
            "Valid credentials provided",
            "Session initiated",
        ],
        EventKind::LoginFailed => &[
            "Invalid password",
            "Wrong username or password",
            "Authentication failed",
            "Account not found",
            "Incorrect credentials",
        ],
        EventKind::AccessDenied => &[
            "Insufficient permissions",
            "Access to resource denied",
            "Unauthorized resource request",
            "Permission denied",
        ],
        EventKind::DataBreach => &[
            "Suspicious data export detected",
            "Large data transfer detected",
            "Unusual database query",
            "Sensitive data access attempt",
        ],
        EventKind::UnauthorizedAccess => &[
            "Unauthorized system access attempt",
            "Privileged command execution attempt",
            "Elevated access denied",
            "Admin panel access denied",
        ],
    }
}

/// Insert `count` events spread uniformly over the last `days_back` days.
pub fn generate_realistic_logs<R: Rng>(
    store: &SqliteStore,
    rng: &mut R,
    count: usize,
    days_back: u32,
) -> Result<usize> {
    let dist = WeightedIndex::new(KIND_WEIGHTS.iter().map(|(_, w)| *w))?;
    let span_secs = i64::from(days_back) * 24 * 3600;
    let now = Utc::now();

    let mut created = 0;
    for _ in 0..count {
        let kind = KIND_WEIGHTS[dist.sample(rng)].0;
        let offset = if span_secs > 0 { rng.gen_range(0..span_secs) } else { 0 };
        let mut event = NewEvent::new(*ADDRESSES.choose(rng).unwrap_or(&ADDRESSES[0]), kind)
            .at(now - Duration::seconds(offset));
        if let Some(Some(subject)) = SUBJECTS.choose(rng) {
            event = event.subject(*subject);
        }
        if let Some(message) = messages(kind).choose(rng) {
            event = event.message(*message);
        }
        store.insert_event(&event)?;
        created += 1;
    }

    info!(created, days_back, "generated background events");
    Ok(created)
}

/// Insert one qualifying group for each detection rule, all timestamped
/// within the last few minutes.
pub fn generate_attack_patterns<R: Rng>(
    store: &SqliteStore,
    rng: &mut R,
) -> Result<usize> {
    let now = Utc::now();
    let mut created = 0;

    // Brute force: repeated failures against one account.
    for i in 0..8 {
        store.insert_event(
            &NewEvent::new("198.51.100.10", EventKind::LoginFailed)
                .subject("admin")
                .message(format!("Brute force attempt {}", i + 1))
                .at(now - Duration::seconds(60 - i)),
        )?;
        created += 1;
    }

    // Account enumeration: one address, many accounts.
    for (i, subject) in ["admin", "root", "john.doe", "jane.smith", "bob.wilson"].iter().enumerate() {
        store.insert_event(
            &NewEvent::new("203.0.113.100", EventKind::LoginFailed)
                .subject(*subject)
                .message("Account enumeration attempt")
                .at(now - Duration::seconds(50 - i as i64)),
        )?;
        created += 1;
    }

    // Login spike.
    for i in 0..25 {
        let kind = if i % 2 == 0 { EventKind::LoginSuccess } else { EventKind::LoginFailed };
        store.insert_event(
            &NewEvent::new(format!("172.16.0.{}", rng.gen_range(1..=50)), kind)
                .message(format!("Spike login {}", i + 1))
                .at(now - Duration::seconds(40 - i)),
        )?;
        created += 1;
    }

    // High-severity cluster.
    for i in 0..4 {
        let mut event = NewEvent::new(format!("10.0.0.{}", rng.gen_range(1..=50)), EventKind::DataBreach)
            .message("Suspicious data export detected")
            .at(now - Duration::seconds(10 - i));
        if let Some(Some(subject)) = SUBJECTS.choose(rng) {
            event = event.subject(*subject);
        }
        store.insert_event(&event)?;
        created += 1;
    }

    info!(created, "generated attack patterns");
    Ok(created)
}

/// A few operator-reported incidents.
pub fn generate_sample_incidents(store: &SqliteStore) -> Result<usize> {
    let incidents = [
        (
            "Suspicious Activity from External IP",
            "Multiple failed access attempts detected from external IP address. Possible reconnaissance activity.",
            Severity::Medium,
            "john.doe",
        ),
        (
            "Unusual After-Hours Database Access",
            "Database queries executed at 2:30 AM from admin account. Requires investigation.",
            Severity::High,
            "jane.smith",
        ),
        (
            "Repeated Permission Escalation Attempts",
            "User bob.wilson attempted to access admin panel 3 times without authorization.",
            Severity::Medium,
            "system",
        ),
    ];

    for (title, description, severity, reporter) in incidents {
        store.insert_incident(&NewIncident {
            title: title.to_owned(),
            description: Some(description.to_owned()),
            severity,
            reporter: Some(reporter.to_owned()),
            log_id: None,
        })?;
    }
    Ok(incidents.len())
}
