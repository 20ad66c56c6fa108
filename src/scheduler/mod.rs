//! Background detection scans on a cron schedule.

pub mod cron;
pub mod engine;

// Re-export common types
pub use self::cron::ScanScheduler;
pub use self::engine::run_scan_loop;
