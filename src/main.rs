use std::fs::OpenOptions;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use log::{error, info, warn};
use tokio_util::sync::CancellationToken;
use tracing_log::LogTracer;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use dbmirror::network::{run_http_admin, AccessPolicy, AdminClient};
use dbmirror::scheduler::DailyScheduler;
use dbmirror::{Config, MySqlConnector, SyncOrchestrator};

fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_timer(fmt::time::UtcTime::rfc_3339());

    if let Ok(path) = std::env::var("DBMIRROR_LOG_FILE") {
        // With DBMIRROR_LOG_FILE set, plain logs go to that file through
        // env_logger instead of the structured stderr layer.
        match OpenOptions::new().create(true).append(true).open(&path) {
            Ok(file) => {
                env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
                    .target(env_logger::Target::Pipe(Box::new(file)))
                    .try_init()
                    .ok();
                return;
            }
            Err(e) => eprintln!("Cannot open log file {path}: {e}"),
        }
    }

    let _ = LogTracer::init();
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init();
}

#[derive(Parser)]
#[command(name = "dbmirror")]
#[command(about = "Mirror a MySQL database into a secondary MariaDB/MySQL server")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the control API and run the daily sync schedule
    Serve {
        /// Path to the TOML configuration file. Without it, connection
        /// settings come from DBMIRROR_SOURCE_* and DBMIRROR_TARGET_*.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Run one sync in the foreground and exit
    SyncOnce {
        /// Path to the TOML configuration file. Without it, connection
        /// settings come from DBMIRROR_SOURCE_* and DBMIRROR_TARGET_*.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Talk to a running `dbmirror serve`
    Admin {
        #[command(subcommand)]
        cmd: AdminCmd,
    },
}

#[derive(Subcommand)]
enum AdminCmd {
    /// Print the current sync status
    Status {
        /// Control API address, e.g. 127.0.0.1:8000
        #[arg(long)]
        http: String,
        /// Bearer token, if the service requires one
        #[arg(long)]
        token: Option<String>,
    },
    /// Start a sync
    Start {
        #[arg(long)]
        http: String,
        #[arg(long)]
        token: Option<String>,
    },
    /// Stop the running sync
    Stop {
        #[arg(long)]
        http: String,
        #[arg(long)]
        token: Option<String>,
    },
}

fn build_orchestrator(config: &Config) -> Arc<SyncOrchestrator> {
    let options = config.sync.session_options();
    let source = MySqlConnector::new(config.source.clone(), options.clone());
    let target = MySqlConnector::new(config.target.clone(), options);
    Arc::new(SyncOrchestrator::new(Arc::new(source), Arc::new(target)))
}

fn admin_client(http: &str, token: Option<String>) -> AdminClient {
    let client = AdminClient::new(http);
    match token {
        Some(token) => client.with_auth_token(token),
        None => client,
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let orchestrator = build_orchestrator(&config);
    let shutdown = CancellationToken::new();

    if config.schedule.enabled {
        match DailyScheduler::new(&config.schedule, Arc::clone(&orchestrator)) {
            Some(scheduler) => {
                tokio::spawn(scheduler.run(shutdown.clone()));
            }
            None => warn!("Schedule time is invalid; daily sync disabled"),
        }
    } else {
        info!("Daily sync disabled by configuration");
    }

    {
        let shutdown = shutdown.clone();
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutting down...");
                if orchestrator.cancel().await.is_ok() {
                    info!("Cancelled running sync");
                }
                shutdown.cancel();
            }
        });
    }

    let addr: SocketAddr = config
        .server
        .address
        .parse()
        .with_context(|| format!("invalid server address {}", config.server.address))?;
    let access = AccessPolicy::from(&config.server);

    run_http_admin(addr, Arc::clone(&orchestrator), access, shutdown).await?;

    // Let a cancelled run release its connections before exiting.
    orchestrator.join().await;
    Ok(())
}

async fn sync_once(config: Config) -> anyhow::Result<()> {
    let orchestrator = build_orchestrator(&config);
    orchestrator.start().await?;

    let outcome = orchestrator
        .join()
        .await
        .context("sync job ended without reporting an outcome")?;

    println!("{}", serde_json::to_string_pretty(&outcome.stats)?);
    if let Some(e) = &outcome.error {
        error!("Sync failed: {e}");
    }
    if !outcome.is_success() {
        anyhow::bail!("sync finished with status {:?}", outcome.status);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve { config } => {
            let config = Config::load(config.as_deref())?;
            info!(
                "Starting dbmirror: {}:{}/{} -> {}:{}/{}",
                config.source.host,
                config.source.port,
                config.source.database,
                config.target.host,
                config.target.port,
                config.target.database
            );
            serve(config).await?;
        }
        Command::SyncOnce { config } => {
            let config = Config::load(config.as_deref())?;
            sync_once(config).await?;
        }
        Command::Admin { cmd } => match cmd {
            AdminCmd::Status { http, token } => {
                let status = admin_client(&http, token).status().await?;
                println!("{}", serde_json::to_string_pretty(&status)?);
            }
            AdminCmd::Start { http, token } => {
                println!("{}", admin_client(&http, token).start().await?);
            }
            AdminCmd::Stop { http, token } => {
                println!("{}", admin_client(&http, token).stop().await?);
            }
        },
    }

    Ok(())
}
