use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use sentrylog::config::{LoggingConfig, SentryConfig};
use sentrylog::detect::{report::render_summary, AnomalyEngine};
use sentrylog::model::{
    display_timestamp, parse_time_bound, Event, EventFilter, EventKind, Incident, IncidentFilter,
    IncidentStatus, NewEvent, NewIncident, Severity,
};
use sentrylog::storage::SqliteStore;

#[derive(Parser)]
#[command(
    name = "sentrylog",
    about = "Security log and incident tracking with anomaly detection",
    version,
    long_about = None
)]
struct Cli {
    /// Config file (defaults to $SENTRYLOG_CONFIG, then ./sentrylog.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database path, overriding the config file
    #[arg(long, global = true, env = "SENTRYLOG_DB")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon (API server + scheduled scans)
    Serve {
        /// Bind address, overriding the config file
        #[arg(long)]
        bind: Option<String>,
    },

    /// Run every detection rule once
    Scan {
        /// Report anomalies without opening incidents
        #[arg(long)]
        no_incidents: bool,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Record and browse security events
    Log {
        #[command(subcommand)]
        action: LogAction,
    },

    /// Track incidents
    Incident {
        #[command(subcommand)]
        action: IncidentAction,
    },

    /// Summary reports
    Report {
        #[command(subcommand)]
        action: ReportAction,
    },

    /// Inspect the configured scan schedule
    Schedule {
        #[command(subcommand)]
        action: ScheduleAction,
    },

    /// Populate the database with demo data
    Seed {
        /// Background events to generate
        #[arg(long, default_value = "200")]
        logs: usize,

        /// Spread background events over this many days
        #[arg(long, default_value = "7")]
        days: u32,

        /// Skip the attack patterns that trip each detection rule
        #[arg(long)]
        no_attacks: bool,

        /// Skip the sample operator incidents
        #[arg(long)]
        no_incidents: bool,
    },
}

#[derive(Subcommand)]
enum LogAction {
    /// Record a new event
    Add {
        /// Event kind (login_success, login_failed, access_denied, data_breach, unauthorized_access)
        #[arg(long)]
        kind: EventKind,

        /// Source IP address
        #[arg(long)]
        ip: String,

        /// Username the event concerns
        #[arg(long)]
        user: Option<String>,

        #[arg(long)]
        message: Option<String>,

        /// low, medium or high (defaults by kind)
        #[arg(long)]
        severity: Option<Severity>,
    },

    /// List the most recent events
    List {
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Show one event
    Show { id: i64 },

    /// Filter events; all criteria are optional and combined
    Search {
        #[arg(long)]
        ip: Option<String>,
        #[arg(long)]
        user: Option<String>,
        #[arg(long)]
        kind: Option<EventKind>,
        #[arg(long)]
        severity: Option<Severity>,
        /// From (YYYY-MM-DD or YYYY-MM-DD HH:MM:SS)
        #[arg(long)]
        from: Option<String>,
        /// To (YYYY-MM-DD or YYYY-MM-DD HH:MM:SS)
        #[arg(long)]
        to: Option<String>,
        #[arg(long, default_value = "50")]
        limit: usize,
    },

    /// Replace an event's message
    Edit {
        id: i64,
        #[arg(long)]
        message: String,
    },

    /// Delete an event
    Delete { id: i64 },
}

#[derive(Subcommand)]
enum IncidentAction {
    /// Report an incident manually
    Create {
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long, default_value = "medium")]
        severity: Severity,
        #[arg(long)]
        reporter: Option<String>,
        /// Event that triggered this incident
        #[arg(long)]
        log_id: Option<i64>,
    },

    /// List all incidents
    List,

    /// Show one incident
    Show { id: i64 },

    /// Filter incidents; all criteria are optional and combined
    Search {
        #[arg(long)]
        status: Option<IncidentStatus>,
        #[arg(long)]
        severity: Option<Severity>,
        /// Text to look for in title or description
        #[arg(long)]
        keyword: Option<String>,
        #[arg(long)]
        from: Option<String>,
        #[arg(long)]
        to: Option<String>,
    },

    /// Change an incident's status (open, investigating, resolved)
    Status { id: i64, status: IncidentStatus },

    /// Change an incident's severity
    Severity { id: i64, severity: Severity },

    /// Delete an incident
    Delete { id: i64 },
}

#[derive(Subcommand)]
enum ReportAction {
    /// Daily totals for the last seven days
    Weekly {
        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ScheduleAction {
    /// Preview when scheduled scans will run in the next N hours
    DryRun {
        /// Up to one year ahead
        #[arg(long, default_value = "24", value_parser = clap::value_parser!(u64).range(1..=8760))]
        hours: u64,
    },
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() > width {
        let head: String = text.chars().take(width.saturating_sub(3)).collect();
        format!("{head}...")
    } else {
        text.to_owned()
    }
}

fn print_events(events: &[Event]) {
    if events.is_empty() {
        println!("No logs found.");
        return;
    }
    println!(
        "{:<6} | {:<20} | {:<16} | {:<15} | {:<8} | Time",
        "ID", "Event Type", "IP Address", "Username", "Severity"
    );
    println!("{:-<6}-|-{:-<20}-|-{:-<16}-|-{:-<15}-|-{:-<8}-|-{:-<19}", "", "", "", "", "", "");
    for e in events {
        println!(
            "{:<6} | {:<20} | {:<16} | {:<15} | {:<8} | {}",
            e.id,
            e.kind.as_str(),
            e.source_address,
            truncate(e.subject.as_deref().unwrap_or("-"), 15),
            e.severity.as_str(),
            display_timestamp(&e.timestamp)
        );
    }
    println!("\n{} log(s)", events.len());
}

fn print_incidents(incidents: &[Incident]) {
    if incidents.is_empty() {
        println!("No incidents found.");
        return;
    }
    println!(
        "{:<6} | {:<40} | {:<8} | {:<13} | Created",
        "ID", "Title", "Severity", "Status"
    );
    println!("{:-<6}-|-{:-<40}-|-{:-<8}-|-{:-<13}-|-{:-<19}", "", "", "", "", "");
    for i in incidents {
        println!(
            "{:<6} | {:<40} | {:<8} | {:<13} | {}",
            i.id,
            truncate(&i.title, 40),
            i.severity.as_str(),
            i.status.as_str(),
            display_timestamp(&i.created_at)
        );
    }
    println!("\n{} incident(s)", incidents.len());
}

fn bound(input: Option<&str>, upper: bool) -> Result<Option<chrono::DateTime<chrono::Utc>>> {
    input
        .map(|s| parse_time_bound(s, upper).with_context(|| format!("invalid date '{s}'")))
        .transpose()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let source = SentryConfig::locate(cli.config.as_deref());
    let mut config = SentryConfig::resolve(cli.config.as_deref())?;
    if let Some(db) = cli.db {
        config.database.path = db;
    }

    init_tracing(&config.logging);
    match &source {
        Some(path) => tracing::info!(path = %path.display(), "loaded configuration"),
        None => tracing::debug!("no config file found, using compiled-in defaults"),
    }

    match cli.command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.api.bind = bind;
            }
            tracing::info!(bind = %config.api.bind, "Starting sentrylog daemon");
            sentrylog::serve(config).await?;
        }
        Commands::Scan { no_incidents, json } => {
            let store = SqliteStore::open(&config.database)?;
            let engine = AnomalyEngine::with_config(store, config.detection.clone());
            let summary = engine.run_scan_with(!no_incidents);
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print!("{}", render_summary(&summary));
            }
        }
        Commands::Log { action } => {
            let store = SqliteStore::open(&config.database)?;
            match action {
                LogAction::Add { kind, ip, user, message, severity } => {
                    let mut event = NewEvent::new(ip, kind);
                    event.subject = user;
                    event.message = message;
                    if let Some(severity) = severity {
                        event.severity = severity;
                    }
                    let id = store.insert_event(&event)?;
                    println!("Log entry added (Log ID: {}).", id);
                }
                LogAction::List { limit } => {
                    print_events(&store.list_events(limit)?);
                }
                LogAction::Show { id } => match store.get_event(id)? {
                    Some(e) => println!("{}", serde_json::to_string_pretty(&e)?),
                    None => bail!("Log {} not found", id),
                },
                LogAction::Search { ip, user, kind, severity, from, to, limit } => {
                    let filter = EventFilter {
                        source_address: ip,
                        subject: user,
                        kind,
                        severity,
                        start: bound(from.as_deref(), false)?,
                        end: bound(to.as_deref(), true)?,
                        limit: Some(limit),
                    };
                    print_events(&store.search_events(&filter)?);
                }
                LogAction::Edit { id, message } => {
                    if !store.update_event_message(id, &message)? {
                        bail!("Log {} not found", id);
                    }
                    println!("Log {} updated.", id);
                }
                LogAction::Delete { id } => {
                    if !store.delete_event(id)? {
                        bail!("Log {} not found", id);
                    }
                    println!("Log {} deleted.", id);
                }
            }
        }
        Commands::Incident { action } => {
            let store = SqliteStore::open(&config.database)?;
            match action {
                IncidentAction::Create { title, description, severity, reporter, log_id } => {
                    let id = store.insert_incident(&NewIncident {
                        title,
                        description,
                        severity,
                        reporter,
                        log_id,
                    })?;
                    println!("Incident created (Incident ID: {}).", id);
                }
                IncidentAction::List => {
                    print_incidents(&store.list_incidents()?);
                }
                IncidentAction::Show { id } => match store.get_incident(id)? {
                    Some(i) => println!("{}", serde_json::to_string_pretty(&i)?),
                    None => bail!("Incident {} not found", id),
                },
                IncidentAction::Search { status, severity, keyword, from, to } => {
                    let filter = IncidentFilter {
                        status,
                        severity,
                        keyword,
                        start: bound(from.as_deref(), false)?,
                        end: bound(to.as_deref(), true)?,
                    };
                    print_incidents(&store.search_incidents(&filter)?);
                }
                IncidentAction::Status { id, status } => {
                    if !store.update_incident_status(id, status)? {
                        bail!("Incident {} not found", id);
                    }
                    println!("Incident #{} updated to '{}'.", id, status);
                }
                IncidentAction::Severity { id, severity } => {
                    if !store.update_incident_severity(id, severity)? {
                        bail!("Incident {} not found", id);
                    }
                    println!("Incident #{} severity set to '{}'.", id, severity);
                }
                IncidentAction::Delete { id } => {
                    if !store.delete_incident(id)? {
                        bail!("Incident {} not found", id);
                    }
                    println!("Incident {} deleted.", id);
                }
            }
        }
        Commands::Report { action } => {
            let store = SqliteStore::open(&config.database)?;
            match action {
                ReportAction::Weekly { json } => {
                    let today = chrono::Utc::now().date_naive();
                    let days = sentrylog::report::weekly_summary(&store, today)?;
                    if json {
                        println!("{}", serde_json::to_string_pretty(&days)?);
                    } else {
                        print!("{}", sentrylog::report::render_weekly(&days));
                    }
                }
            }
        }
        Commands::Schedule { action } => match action {
            ScheduleAction::DryRun { hours } => {
                let Some(expr) = config.schedule.cron.as_deref() else {
                    println!("No scan schedule configured.");
                    return Ok(());
                };
                let scheduler = sentrylog::scheduler::ScanScheduler::parse(expr)?;
                let runs = scheduler.preview(&chrono::Utc::now(), hours)?;
                if runs.is_empty() {
                    println!("No scans scheduled in next {} hours.", hours);
                } else {
                    println!("Upcoming scans (next {} hours, '{}'):", hours, expr);
                    for time in runs {
                        println!("{}", time.to_rfc3339());
                    }
                }
            }
        },
        Commands::Seed { logs, days, no_attacks, no_incidents } => {
            let store = SqliteStore::open(&config.database)?;
            let mut rng = rand::thread_rng();
            let background = sentrylog::seed::generate_realistic_logs(&store, &mut rng, logs, days)?;
            println!("Created {} background logs over {} days.", background, days);
            if !no_attacks {
                let attacks = sentrylog::seed::generate_attack_patterns(&store, &mut rng)?;
                println!("Created {} attack pattern logs.", attacks);
            }
            if !no_incidents {
                let incidents = sentrylog::seed::generate_sample_incidents(&store)?;
                println!("Created {} sample incidents.", incidents);
            }
        }
    }

    Ok(())
}
