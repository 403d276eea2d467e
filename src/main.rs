use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use rollcall::calendar::WeekStart;
use rollcall::config::AppConfig;
use rollcall::error::ValidationError;
use rollcall::models::{Actor, ConflictPolicy, MaterializeWeekInput, Role};
use rollcall::scheduling::Scheduler;
use rollcall::{api, db};

#[derive(Parser)]
#[command(name = "rollcall")]
#[command(about = "Recurring training sessions and attendance tracking")]
struct Cli {
    /// SQLite database file [env: ROLLCALL_DB_PATH]
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// First day of the week [env: ROLLCALL_WEEK_START]
    #[arg(long, global = true, value_enum)]
    week_start: Option<WeekStart>,

    /// JSON roster assignments [env: ROLLCALL_ROSTER_FILE]
    #[arg(long, global = true)]
    roster_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API
    Serve {
        /// Port for HTTP API [env: ROLLCALL_PORT]
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Materialize a template into a week
    Materialize {
        template_id: Uuid,
        /// First day of the target week (YYYY-MM-DD)
        week: NaiveDate,
        /// Keep sessions that already have attendance instead of failing
        #[arg(long)]
        keep_recorded: bool,
        /// User id recorded as the creator
        #[arg(long, default_value = "cli")]
        user: String,
    },
    /// Print attendance stats for an athlete
    Stats {
        athlete_id: String,
        /// Ignore records after this date
        #[arg(long)]
        as_of: Option<NaiveDate>,
    },
    /// List materialized schedules
    Schedules {
        /// Only this week
        #[arg(long)]
        week: Option<NaiveDate>,
    },
    /// Print the week start for a date
    WeekStart { date: NaiveDate },
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "rollcall=debug,tower_http=debug".into()),
    );

    // Logs go to stderr so command output on stdout stays machine-readable
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn open_scheduler(config: &AppConfig) -> anyhow::Result<Scheduler> {
    let db = match &config.db_path {
        Some(path) => db::Database::open(path.clone())?,
        None => db::Database::open_default()?,
    };
    db.migrate()?;
    Ok(Scheduler::new(
        Arc::new(db),
        config.build_roster()?,
        config.scheduling(),
    ))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let mut config = AppConfig::from_env()?;
    if let Some(db) = cli.db {
        config.db_path = Some(db);
    }
    if let Some(week_start) = cli.week_start {
        config.week_start = week_start;
    }
    if let Some(roster_file) = cli.roster_file {
        config.roster_file = Some(roster_file);
    }

    match cli.command.unwrap_or(Commands::Serve { port: None }) {
        Commands::Serve { port } => {
            if let Some(port) = port {
                config.port = port;
            }
            tracing::info!(
                "Starting Rollcall server on port {} (weeks start on {})",
                config.port,
                config.week_start
            );

            let scheduler = open_scheduler(&config)?;
            let app = api::create_router_with_cors(scheduler, config.cors_origins.as_deref());

            let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", config.port)).await?;
            tracing::info!("Rollcall server listening on http://127.0.0.1:{}", config.port);

            axum::serve(listener, app).await?;
        }
        Commands::Materialize {
            template_id,
            week,
            keep_recorded,
            user,
        } => {
            let scheduler = open_scheduler(&config)?;
            let on_conflict = if keep_recorded {
                ConflictPolicy::KeepRecorded
            } else {
                ConflictPolicy::Fail
            };
            let schedule = scheduler.materialize_week(
                &Actor::new(user, Role::Admin),
                MaterializeWeekInput {
                    template_id,
                    week_start_date: week,
                    on_conflict,
                },
            )?;
            print_json(&schedule)?;
        }
        Commands::Stats { athlete_id, as_of } => {
            let scheduler = open_scheduler(&config)?;
            let stats =
                scheduler.attendance_stats(&Actor::new("cli", Role::Admin), &athlete_id, as_of)?;
            println!(
                "{}: {} sessions, {} present, {} late, {} absent ({})",
                stats.athlete_id,
                stats.total_sessions,
                stats.attended_sessions,
                stats.late_sessions,
                stats.missed_sessions,
                stats.rate_label()
            );
            print_json(&stats.recent_attendance)?;
        }
        Commands::Schedules { week } => {
            let scheduler = open_scheduler(&config)?;
            print_json(&scheduler.list_schedules(week)?)?;
        }
        Commands::WeekStart { date } => {
            let week_start = config
                .week_start
                .week_of(date)
                .ok_or(ValidationError::DateOutOfRange(date))?;
            println!("{}", week_start);
        }
    }

    Ok(())
}
