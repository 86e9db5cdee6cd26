//! fdw-ingest - flight data warehouse loader
//!
//! Loads dimension data (airports, carriers, dates), flight facts and weather
//! observations into the SQLite warehouse, runs post-load quality checks, and serves run status
//! over HTTP.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use fdw_common::config::{database_path, load_config, resolve_root_folder, TomlConfig};
use fdw_common::db::init_database;
use sqlx::SqlitePool;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fdw_ingest::db::fail_stale_runs;
use fdw_ingest::dimensions::{dates, load_airports, load_carriers};
use fdw_ingest::pipeline::{load_flight_file, FlightLoadOptions, FLIGHTS_SOURCE};
use fdw_ingest::quality::run_quality_checks;
use fdw_ingest::source::flight_files;
use fdw_ingest::weather::load_weather;
use fdw_ingest::{AppState, LoadControl, LoadError};

#[derive(Parser, Debug)]
#[command(name = "fdw-ingest")]
#[command(about = "Flight data warehouse loader")]
#[command(version)]
struct Args {
    /// Folder holding the warehouse database
    #[arg(long, env = "FDW_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// TOML configuration file
    #[arg(long, env = "FDW_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the HTTP API
    Serve {
        /// Override the configured bind address
        #[arg(long)]
        bind: Option<String>,
    },

    /// Load flight CSV files (directories contribute their .csv files)
    LoadFlights {
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Run-tracking source name
        #[arg(long, default_value = FLIGHTS_SOURCE)]
        source: String,

        /// Records per chunk (defaults to the configured value)
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Add each file's flight dates to the date dimension first
        #[arg(long)]
        ensure_dates: bool,
    },

    /// Load an OpenFlights airports.dat file
    LoadAirports { path: PathBuf },

    /// Derive carriers from flight CSV files
    LoadCarriers {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Fill the date dimension from flight CSV files
    GenerateDates {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Load airport weather observation CSV files
    LoadWeather {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Run post-load quality checks
    Check {
        #[arg(long, default_value = FLIGHTS_SOURCE)]
        source: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config(args.config.as_deref()).context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("fdw-ingest {}", env!("CARGO_PKG_VERSION"));

    let root_folder = resolve_root_folder(args.root_folder.as_deref(), &config);
    let db_path = database_path(&root_folder);
    info!("Database: {}", db_path.display());

    let pool = init_database(&db_path)
        .await
        .context("Failed to open warehouse database")?;

    match args.command {
        Command::Serve { bind } => serve(pool, config, bind).await,
        Command::LoadFlights {
            paths,
            source,
            chunk_size,
            ensure_dates,
        } => {
            let mut options = FlightLoadOptions::from_config(&config.loader);
            options.source = source;
            options.ensure_dates = ensure_dates;
            if let Some(chunk_size) = chunk_size {
                options.chunk_size = chunk_size;
            }
            load_flights(&pool, &paths, &options).await
        }
        Command::LoadAirports { path } => {
            let inserted = load_airports(&pool, &path).await?;
            info!(inserted, "Airports loaded");
            Ok(())
        }
        Command::LoadCarriers { paths } => {
            let files = flight_files(&paths)?;
            let inserted = load_carriers(&pool, &files).await?;
            info!(inserted, "Carriers loaded");
            Ok(())
        }
        Command::GenerateDates { paths } => {
            let files = flight_files(&paths)?;
            let added = dates::generate_from_files(&pool, &files).await?;
            info!(added, "Dates generated");
            Ok(())
        }
        Command::LoadWeather { paths } => {
            let mut failures = 0usize;
            for path in &paths {
                match load_weather(&pool, path).await {
                    Ok(counts) => println!(
                        "{}: {} processed, {} loaded, {} rejected",
                        path.display(),
                        counts.rows_processed,
                        counts.rows_loaded,
                        counts.rows_rejected
                    ),
                    Err(e) => {
                        failures += 1;
                        error!(file = %path.display(), error = %e, "Weather load failed");
                    }
                }
            }
            if failures > 0 {
                bail!("{} of {} weather file(s) failed to load", failures, paths.len());
            }
            Ok(())
        }
        Command::Check { source } => {
            let report = run_quality_checks(&pool, &source).await?;
            for check in &report.checks {
                let mark = if check.passed { "PASS" } else { "FAIL" };
                println!("{} {:<32} {}", mark, check.name, check.detail);
            }
            println!("{} passed, {} failed", report.passed(), report.failed());
            if !report.all_passed() {
                bail!("{} quality check(s) failed", report.failed());
            }
            Ok(())
        }
    }
}

async fn load_flights(pool: &SqlitePool, paths: &[PathBuf], options: &FlightLoadOptions) -> Result<()> {
    let files = flight_files(paths)?;
    if files.is_empty() {
        warn!("No flight files found");
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        on_signal.cancel();
    });

    let mut failures = 0usize;
    for path in &files {
        if cancel.is_cancelled() {
            break;
        }

        let control = LoadControl {
            cancel: cancel.clone(),
            deadline: None,
        };
        match load_flight_file(pool, path, options, control).await {
            Ok(summary) => {
                println!(
                    "{}: {} processed, {} loaded, {} rejected ({})",
                    path.display(),
                    summary.rows_processed,
                    summary.rows_loaded,
                    summary.rows_rejected,
                    summary.status
                );
            }
            Err(LoadError::Cancelled { rows_committed }) => {
                warn!(file = %path.display(), rows_committed, "Load cancelled");
                bail!("Interrupted after {} committed rows of {}", rows_committed, path.display());
            }
            Err(e) => {
                failures += 1;
                error!(file = %path.display(), error = %e, "Load failed");
            }
        }
    }

    if failures > 0 {
        bail!("{} of {} file(s) failed to load", failures, files.len());
    }
    Ok(())
}

async fn serve(pool: SqlitePool, config: TomlConfig, bind: Option<String>) -> Result<()> {
    fail_stale_runs(&pool).await?;

    let bind_address = bind.unwrap_or_else(|| config.server.bind_address.clone());
    let state = AppState::new(pool, config.loader.clone());
    let active_loads = state.active_loads.clone();

    let app = fdw_ingest::build_router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_address))?;
    info!("Listening on http://{}", bind_address);
    info!("Health check: http://{}/health", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            for token in active_loads.read().await.values() {
                token.cancel();
            }
        })
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
    }
}
