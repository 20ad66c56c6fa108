//! sentrylog -- security log and incident tracking.
//!
//! This crate records authentication and access events in SQLite, lets an
//! operator browse them, and periodically scans them for brute force,
//! account enumeration, login spikes and high-severity clusters, opening
//! incidents when a rule's threshold is crossed.

pub mod api;
pub mod config;
pub mod detect;
pub mod model;
pub mod report;
pub mod scheduler;
pub mod seed;
pub mod storage;

use anyhow::Result;

use crate::config::SentryConfig;
use crate::detect::AnomalyEngine;
use crate::storage::SqliteStore;

/// Start the sentrylog daemon: API server plus, if configured, the scan
/// scheduler.
pub async fn serve(config: SentryConfig) -> Result<()> {
    // 1. Initialize Storage
    tracing::info!(db_path = %config.database.path.display(), "Initializing database");
    let store = SqliteStore::open(&config.database)?;
    let engine = AnomalyEngine::with_config(store, config.detection.clone());

    // 2. Start Scan Scheduler (background task)
    if let Some(expr) = &config.schedule.cron {
        let scheduler = scheduler::ScanScheduler::parse(expr)?;
        let scan_engine = engine.clone();
        tokio::spawn(async move {
            scheduler::run_scan_loop(scan_engine, scheduler).await;
        });
    } else {
        tracing::info!("No scan schedule configured, scans run on demand only");
    }

    // 3. Start API Server
    let addr: std::net::SocketAddr = config.api.bind.parse()?;
    let app = api::router(api::state::AppState::new(engine));

    tracing::info!(%addr, "sentrylog listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
