//! Operator-facing rendering of a scan.

use std::fmt::Write;

use super::{Anomaly, Rule, ScanSummary};

const RULE_WIDTH: usize = 70;

fn heading(rule: Rule) -> &'static str {
    match rule {
        Rule::BruteForce => "BRUTE FORCE ATTACK",
        Rule::AccountCompromise => "ACCOUNT COMPROMISE ATTEMPT",
        Rule::LoginSpike => "LOGIN SPIKE",
        Rule::HighSeverityCluster => "HIGH SEVERITY CLUSTER",
    }
}

fn details(anomaly: &Anomaly) -> Vec<String> {
    match anomaly {
        Anomaly::BruteForce { source_address, failed_attempts, targets, .. } => vec![
            format!("IP: {source_address}"),
            format!("Failed Attempts: {failed_attempts}"),
            format!(
                "Targets: {}",
                if targets.is_empty() {
                    "-".to_owned()
                } else {
                    targets.iter().cloned().collect::<Vec<_>>().join(", ")
                }
            ),
        ],
        Anomaly::AccountCompromise { source_address, unique_subjects, total_attempts, .. } => vec![
            format!("IP: {source_address}"),
            format!("Unique Users: {unique_subjects}"),
            format!("Total Attempts: {total_attempts}"),
        ],
        Anomaly::LoginSpike { login_count, window_minutes, .. } => {
            vec![format!("Login Count: {login_count} in {window_minutes} minutes")]
        }
        Anomaly::HighSeverityCluster { event_kind, event_count, .. } => vec![
            format!("Event Type: {event_kind}"),
            format!("Event Count: {event_count}"),
        ],
    }
}

/// Per-rule counts followed by a numbered listing of every anomaly.
pub fn render_summary(summary: &ScanSummary) -> String {
    let mut out = String::new();
    let rule_line = "=".repeat(RULE_WIDTH);

    // Writing to a String cannot fail.
    let _ = writeln!(out, "{rule_line}");
    let _ = writeln!(out, "ANOMALY DETECTION SCAN {}", summary.run_id);
    let _ = writeln!(out, "{rule_line}");
    for report in &summary.rules {
        match &report.error {
            None => {
                let _ = writeln!(out, "{:<25} {}", report.rule.as_str(), report.count);
            }
            Some(e) => {
                let _ = writeln!(out, "{:<25} FAILED ({e})", report.rule.as_str());
            }
        }
    }
    let _ = writeln!(out, "{rule_line}");
    let _ = writeln!(out, "Total anomalies detected: {}", summary.total_count);

    if summary.anomalies.is_empty() {
        let _ = writeln!(out, "\nNo anomalies detected.");
        return out;
    }

    let _ = writeln!(out, "\nAnomaly details:");
    for (i, anomaly) in summary.anomalies.iter().enumerate() {
        let _ = writeln!(out, "\n{}. {}", i + 1, heading(anomaly.rule()));
        let _ = writeln!(out, "   Severity: {}", anomaly.severity().as_str().to_uppercase());
        for line in details(anomaly) {
            let _ = writeln!(out, "   {line}");
        }
    }
    let _ = writeln!(out, "\nIncidents created: {}", summary.incidents_created);
    out
}
