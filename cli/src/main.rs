//! `tally-cdc`: command-line entry points for the sync engine and the
//! persistent scheduler.

mod config;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use anyhow::Result;
use chrono::NaiveDate;
use clap::Parser;
use clap::Subcommand;
use tally_scheduler::JobTrigger;
use tally_scheduler::Scheduler;
use tally_scheduler::SchedulerConfig;
use tally_scheduler::SqlJobStore;
use tally_sync::SyncEngine;
use tally_sync::SyncRuntime;
use tally_sync::TracingSink;
use tally_sync::register_runtime;
use tally_sync::unregister_runtime;
use tally_upstream::TallyClient;
use tally_warehouse::SqlWarehouse;
use tally_warehouse::Warehouse;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

use crate::config::AppConfig;

#[derive(Debug, Parser)]
#[command(name = "tally-cdc", about = "Incremental warehouse sync for Tally companies")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Sync one company now.
    Run {
        company: String,
        /// Sync up to this date (YYYYMMDD, default today).
        #[arg(long)]
        to_date: Option<String>,
        /// Override the snapshot start date (YYYYMMDD).
        #[arg(long)]
        from_date: Option<String>,
    },
    /// Sync every active company, one after another.
    SyncAll {
        #[arg(long)]
        to_date: Option<String>,
        #[arg(long)]
        from_date: Option<String>,
    },
    /// Run the persistent scheduler until interrupted.
    Serve,
    /// Fetch the company list from the upstream and import it.
    Companies,
    /// Configure or remove the scheduled sync for a company.
    Schedule {
        company: String,
        /// Fire every N minutes.
        #[arg(long, conflicts_with = "daily")]
        every_minutes: Option<u32>,
        /// Fire daily at HH:MM (scheduler timezone).
        #[arg(long)]
        daily: Option<String>,
        /// Keep the job but stop firing it.
        #[arg(long)]
        disabled: bool,
        /// Delete the job entirely.
        #[arg(long)]
        remove: bool,
    },
    /// Create the database and tables if absent, then exit.
    InitDb,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = AppConfig::from_env()?;
    let _log_guard = init_logging(&config)?;

    let code = match cli.command {
        Command::Run {
            company,
            to_date,
            from_date,
        } => cmd_run(&config, &company, to_date.as_deref(), from_date.as_deref()).await?,
        Command::SyncAll { to_date, from_date } => {
            cmd_sync_all(&config, to_date.as_deref(), from_date.as_deref()).await?
        }
        Command::Serve => cmd_serve(&config).await?,
        Command::Companies => cmd_companies(&config).await?,
        Command::Schedule {
            company,
            every_minutes,
            daily,
            disabled,
            remove,
        } => cmd_schedule(&config, &company, every_minutes, daily.as_deref(), disabled, remove).await?,
        Command::InitDb => cmd_init_db(&config).await?,
    };
    Ok(ExitCode::from(code))
}

fn init_logging(config: &AppConfig) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    std::fs::create_dir_all(&config.log_dir)
        .with_context(|| format!("cannot create log dir {}", config.log_dir.display()))?;
    let file_appender = tracing_appender::rolling::daily(&config.log_dir, "tally-cdc.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(file_writer.and(std::io::stderr))
        .with_ansi(false)
        .init();
    Ok(guard)
}

fn parse_date_arg(value: Option<&str>) -> Result<Option<NaiveDate>> {
    value
        .map(|raw| {
            NaiveDate::parse_from_str(raw.trim(), "%Y%m%d")
                .with_context(|| format!("date is not YYYYMMDD: {raw}"))
        })
        .transpose()
}

fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

async fn cmd_run(
    config: &AppConfig,
    company: &str,
    to_date: Option<&str>,
    from_date: Option<&str>,
) -> Result<u8> {
    let warehouse = SqlWarehouse::connect(&config.warehouse).await?;
    let warehouse: Arc<dyn Warehouse> = Arc::new(warehouse);

    let stored = warehouse.get_company(company).await?;
    let upstream_config = match &stored {
        Some(stored) => config.upstream_for(stored.tally_host.as_deref(), stored.tally_port),
        None => config.upstream.clone(),
    };
    let client = TallyClient::new(&upstream_config)?;

    let engine = SyncEngine::with_sink(
        Arc::new(client),
        warehouse,
        config.sync.clone(),
        Arc::new(TracingSink),
    );
    let to_date = parse_date_arg(to_date)?.unwrap_or_else(today);
    let from_date = parse_date_arg(from_date)?;

    let report = engine.run_company(company, to_date, from_date).await;
    Ok(u8::try_from(report.exit_code()).unwrap_or(1))
}

async fn cmd_sync_all(
    config: &AppConfig,
    to_date: Option<&str>,
    from_date: Option<&str>,
) -> Result<u8> {
    let warehouse = SqlWarehouse::connect(&config.warehouse).await?;
    let warehouse: Arc<dyn Warehouse> = Arc::new(warehouse);
    let client = TallyClient::new(&config.upstream)?;
    let engine = SyncEngine::with_sink(
        Arc::new(client),
        warehouse,
        config.sync.clone(),
        Arc::new(TracingSink),
    );
    let to_date = parse_date_arg(to_date)?.unwrap_or_else(today);
    let from_date = parse_date_arg(from_date)?;

    let reports = engine.run_all(to_date, from_date).await;
    let failed = reports.iter().filter(|report| !report.success()).count();
    println!(
        "synced {} companies, {} with failures",
        reports.len(),
        failed
    );
    Ok(u8::from(failed > 0))
}

async fn cmd_serve(config: &AppConfig) -> Result<u8> {
    let warehouse = SqlWarehouse::connect(&config.warehouse).await?;
    let pool = warehouse.pool().clone();
    let warehouse: Arc<dyn Warehouse> = Arc::new(warehouse);
    let client = TallyClient::new(&config.upstream)?;

    let key = register_runtime(Arc::new(SyncRuntime {
        upstream: Arc::new(client),
        warehouse,
        sink: Arc::new(TracingSink),
        config: config.sync.clone(),
    }));
    let store = Arc::new(SqlJobStore::new(pool).await?);
    let scheduler = Arc::new(Scheduler::new(store, key, SchedulerConfig::default()));

    let loop_handle = tokio::spawn(Arc::clone(&scheduler).run());
    info!("scheduler serving; press ctrl-c to stop");
    tokio::signal::ctrl_c().await?;

    // In-flight runs are abandoned; the chunk watermark makes the next
    // scheduled run resume where they stopped.
    scheduler.shutdown();
    let _ = loop_handle.await;
    unregister_runtime(key);
    Ok(0)
}

async fn cmd_companies(config: &AppConfig) -> Result<u8> {
    let client = TallyClient::new(&config.upstream)?;
    let companies = client.fetch_companies().await?;
    if companies.is_empty() {
        println!("No companies reported by the upstream.");
        return Ok(0);
    }

    let warehouse = SqlWarehouse::connect(&config.warehouse).await?;
    let stats = warehouse.import_companies(companies.clone()).await?;

    println!("Companies");
    for company in &companies {
        let starting_from = company
            .starting_from
            .map(|date| date.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("  {} ({}) books from {starting_from}", company.name, company.guid);
    }
    println!(
        "Imported: {} new, {} updated, {} unchanged, {} skipped",
        stats.inserted, stats.updated, stats.unchanged, stats.skipped
    );
    Ok(0)
}

async fn cmd_schedule(
    config: &AppConfig,
    company: &str,
    every_minutes: Option<u32>,
    daily: Option<&str>,
    disabled: bool,
    remove: bool,
) -> Result<u8> {
    let warehouse = SqlWarehouse::connect(&config.warehouse).await?;
    let store = Arc::new(SqlJobStore::new(warehouse.pool().clone()).await?);
    let key = register_runtime(Arc::new(SyncRuntime {
        upstream: Arc::new(TallyClient::new(&config.upstream)?),
        warehouse: Arc::new(warehouse),
        sink: Arc::new(TracingSink),
        config: config.sync.clone(),
    }));
    let scheduler = Scheduler::new(store, key, SchedulerConfig::default());

    if remove {
        scheduler.remove_job(company).await?;
        println!("Removed schedule for {company}");
        unregister_runtime(key);
        return Ok(0);
    }

    let trigger = match (every_minutes, daily) {
        (Some(minutes), None) => JobTrigger::Interval { minutes },
        (None, Some(time)) => {
            let (hour, minute) = parse_wall_clock(time)?;
            JobTrigger::Daily { hour, minute }
        }
        (None, None) => anyhow::bail!("pass --every-minutes N or --daily HH:MM"),
        (Some(_), Some(_)) => unreachable!("clap conflicts_with"),
    };

    let job = scheduler
        .add_or_update_job(company, trigger, !disabled)
        .await?;
    match job.next_fire_at {
        Some(next) => println!("Scheduled {company}; next fire at {next}"),
        None => println!("Saved schedule for {company} (disabled)"),
    }
    unregister_runtime(key);
    Ok(0)
}

fn parse_wall_clock(value: &str) -> Result<(u8, u8)> {
    let (hour, minute) = value
        .split_once(':')
        .with_context(|| format!("expected HH:MM, got {value}"))?;
    let hour: u8 = hour.trim().parse().context("invalid hour")?;
    let minute: u8 = minute.trim().parse().context("invalid minute")?;
    anyhow::ensure!(hour < 24 && minute < 60, "expected HH:MM, got {value}");
    Ok((hour, minute))
}

async fn cmd_init_db(config: &AppConfig) -> Result<u8> {
    SqlWarehouse::connect(&config.warehouse).await?;
    println!(
        "Warehouse {} on {} is ready.",
        config.warehouse.database, config.warehouse.host
    );
    Ok(0)
}
