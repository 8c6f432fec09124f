use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{error, info};

use corona_api::config::Config;
use corona_api::schedule::{load_descriptors, SchedulerHandle, TaskScheduler};
use corona_api::statistics::HttpStatisticSource;
use corona_api::storage::SqliteStore;
use corona_api::utils::logger;
use corona_api::{web, AppContext, GIT_HASH};

/// Coronavirus statistics API with per-plan daily request quotas
#[derive(Parser, Debug)]
#[command(name = "corona-api", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP API and the scheduled jobs
    Serve {
        /// Do not start the scheduled jobs
        #[arg(long)]
        no_scheduler: bool,
    },
    /// Run only the scheduled jobs
    Cron,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;
    let _guard = logger::init(&config.log_dir)?;

    info!("Starting corona-api ({})", GIT_HASH);

    config.ensure_data_dir()?;
    let store = Arc::new(SqliteStore::new(&config.database_url).await?);
    let source = Arc::new(HttpStatisticSource::new(config.source_url.clone())?);
    let ctx = Arc::new(AppContext::new(store.clone(), store, source));

    match cli.command {
        Commands::Serve { no_scheduler } => {
            let scheduler = if no_scheduler {
                info!("Scheduler disabled");
                None
            } else {
                Some(start_scheduler(&ctx, &config).await)
            };

            if let Err(e) = web::start_server(ctx.clone(), config.bind_addr, shutdown_signal()).await {
                error!("Server error: {}", e);
                if let Some(handle) = &scheduler {
                    stop_scheduler(handle).await;
                }
                return Err(e);
            }
            info!("Server stopped gracefully");

            if let Some(handle) = &scheduler {
                stop_scheduler(handle).await;
            }
        }
        Commands::Cron => {
            let handle = start_scheduler(&ctx, &config).await;
            info!("Cron up & running");
            shutdown_signal().await;
            stop_scheduler(&handle).await;
        }
    }

    Ok(())
}

async fn start_scheduler(ctx: &AppContext, config: &Config) -> SchedulerHandle {
    let scheduler = TaskScheduler::new(ctx.jobs());
    let raw = match load_descriptors(&config.schedule_path).await {
        Ok(raw) => raw,
        Err(e) => {
            error!("No scheduled tasks will run: {}", e);
            Vec::new()
        }
    };

    let (tasks, rejected) = scheduler.build(&raw);
    info!(accepted = tasks.len(), rejected = rejected.len(), "Schedule loaded");
    scheduler.start(tasks)
}

async fn stop_scheduler(handle: &SchedulerHandle) {
    info!("Stopping scheduler...");
    handle.clear();
    handle.stopped().await;
    info!("Scheduler stopped");
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
