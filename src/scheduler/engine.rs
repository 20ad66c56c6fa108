use std::time::Duration;

use chrono::Utc;
use tracing::{error, info, warn};

use super::ScanScheduler;
use crate::detect::AnomalyEngine;
use crate::storage::SqliteStore;

/// Main scan loop: sleep until the next fire time, scan, repeat.
///
/// Each scan runs on the blocking pool. Rule failures are recorded in the
/// scan summary; a scan task that cannot be joined is logged and the loop
/// carries on with the next fire time.
pub async fn run_scan_loop(engine: AnomalyEngine<SqliteStore>, scheduler: ScanScheduler) {
    info!(cron = %scheduler.expr(), "Scan scheduler started");

    loop {
        let now = Utc::now();
        let Some(next) = scheduler.next_after(&now) else {
            warn!(cron = %scheduler.expr(), "schedule has no future fire times, stopping");
            return;
        };
        let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
        tokio::time::sleep(wait).await;

        let engine = engine.clone();
        match tokio::task::spawn_blocking(move || engine.run_scan()).await {
            Ok(summary) => {
                info!(
                    run_id = %summary.run_id,
                    total = summary.total_count,
                    incidents = summary.incidents_created,
                    "Scheduled scan finished"
                );
            }
            Err(e) => {
                error!("Scheduled scan aborted: {}", e);
            }
        }
    }
}
