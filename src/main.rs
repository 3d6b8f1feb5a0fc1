use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;

use copydesk::cleanup::RetentionScheduler;
use copydesk::config::{config, init_config, CopydeskConfig};
use copydesk::resilience::CircuitBreaker;
use copydesk::service::AdminService;
use copydesk::store::memory::{
    InMemoryAuditLog, InMemoryContentStore, InMemoryErrorStore, InMemoryNotificationDispatcher,
};
use copydesk::telemetry::{init_telemetry, shutdown_telemetry};
use copydesk::workflow::WorkflowEngine;

#[derive(Parser)]
#[command(name = "copydesk")]
#[command(about = "Content workflow automation and retention cleanup")]
#[command(long_about = "Copydesk runs the content review workflow engine and the retention \
                       cleanup scheduler that keep the admin backend healthy. Use 'copydesk serve' \
                       to run the scheduler, or the cleanup subcommands for one-off maintenance.")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the retention cleanup scheduler until interrupted
    Serve,
    /// Run one retention cleanup pass and exit
    Cleanup,
    /// Report what a cleanup pass would delete, without deleting
    Estimate,
    /// Show the retention scheduler status
    Status,
    /// Show the effective configuration
    Config {
        /// Write the effective configuration to copydesk.toml
        #[arg(long, help = "Write the effective configuration to copydesk.toml")]
        write: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve => {
            tokio::runtime::Runtime::new()?.block_on(async { serve_command().await })
        }
        Commands::Cleanup => {
            tokio::runtime::Runtime::new()?.block_on(async { cleanup_command().await })
        }
        Commands::Estimate => {
            tokio::runtime::Runtime::new()?.block_on(async { estimate_command().await })
        }
        Commands::Status => {
            tokio::runtime::Runtime::new()?.block_on(async { status_command().await })
        }
        Commands::Config { write } => config_command(write),
    }
}

/// Wires the engine and scheduler against in-memory collaborators. Real
/// deployments swap these for the CMS-backed implementations behind the
/// same traits.
fn build_service(config: &CopydeskConfig) -> AdminService {
    let store = Arc::new(InMemoryContentStore::new());
    let audit = Arc::new(InMemoryAuditLog::new());
    let error_store = Arc::new(InMemoryErrorStore::new());
    let notifier = Arc::new(InMemoryNotificationDispatcher::new());

    let breaker = Arc::new(CircuitBreaker::new(config.breaker.breaker_config()));
    let engine = Arc::new(WorkflowEngine::new(
        store,
        audit.clone(),
        error_store.clone(),
        notifier.clone(),
        breaker,
        config.retry.policy(),
    ));
    let scheduler = RetentionScheduler::new(audit, error_store, notifier, config.cleanup.clone());

    AdminService::new(engine, scheduler)
}

async fn serve_command() -> Result<()> {
    init_telemetry()?;
    init_config()?;
    let config = config()?;

    let service = build_service(config);
    service.scheduler().start();

    tracing::info!("copydesk running, press ctrl-c to stop");
    tokio::signal::ctrl_c().await?;

    tracing::info!("shutdown signal received");
    service.scheduler().stop().await;
    shutdown_telemetry();
    Ok(())
}

async fn cleanup_command() -> Result<()> {
    init_telemetry()?;
    init_config()?;
    let config = config()?;

    let service = build_service(config);
    let response = service.trigger_cleanup().await;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

async fn estimate_command() -> Result<()> {
    init_telemetry()?;
    init_config()?;
    let config = config()?;

    let service = build_service(config);
    let response = service.estimate_cleanup().await;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

async fn status_command() -> Result<()> {
    init_telemetry()?;
    init_config()?;
    let config = config()?;

    let service = build_service(config);
    let response = service.cleanup_status();
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

fn config_command(write: bool) -> Result<()> {
    init_config()?;
    let config = config()?;

    println!("{}", toml::to_string_pretty(config)?);
    if write {
        config.save_to_file("copydesk.toml")?;
        println!("wrote copydesk.toml");
    }
    Ok(())
}
