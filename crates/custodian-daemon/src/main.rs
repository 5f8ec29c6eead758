//! Custodian daemon - background trigger coordination service.
//!
//! custodiand runs the polling trigger loops over one workspace:
//! - spool consumption for version-control hook events
//! - time/age policy scans
//! - disk pressure monitoring and relief sweeps
//! It recovers interrupted transitions at startup and shuts down
//! gracefully, completing in-flight work first.

use std::sync::Arc;

use clap::Parser;
use custodian_engine::{Coordinator, FileAuditSink, FsSideEffector};
use custodian_registry::{FileRegistry, Registry};
use custodian_triggers::{DiskSampler, EventSpool};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod scheduler;

use config::DaemonConfig;
use scheduler::Scheduler;

/// Custodian daemon CLI.
#[derive(Parser)]
#[command(name = "custodiand")]
#[command(about = "Custodian daemon - backup lifecycle trigger coordination", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path.
    #[arg(short, long, env = "CUSTODIAN_CONFIG")]
    config: Option<String>,

    /// Workspace root (overrides the configured root).
    #[arg(short, long, env = "CUSTODIAN_ROOT")]
    root: Option<String>,

    /// Log level.
    #[arg(long, env = "CUSTODIAN_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Enable JSON logging.
    #[arg(long, env = "CUSTODIAN_LOG_JSON")]
    json: bool,
}

fn sampler_for(path: std::path::PathBuf) -> Box<dyn DiskSampler> {
    #[cfg(unix)]
    {
        Box::new(custodian_triggers::StatvfsSampler::new(path))
    }
    #[cfg(not(unix))]
    {
        let _ = path;
        Box::new(custodian_triggers::StaticSampler(
            custodian_triggers::DiskSample {
                total_bytes: 0,
                available_bytes: 0,
            },
        ))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| cli.log_level.clone().into());

    if cli.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    let mut config = DaemonConfig::load(cli.config.as_deref())?;
    if let Some(root) = cli.root {
        config.root = root.into();
    }

    info!(
        root = %config.root.display(),
        version = env!("CARGO_PKG_VERSION"),
        "custodiand starting"
    );

    let registry: Arc<dyn Registry> = Arc::new(FileRegistry::open(&config.root).await?);
    let effects = Arc::new(FsSideEffector::open(&config.root).await?);
    let audit = Arc::new(FileAuditSink::open(config.root.join("audit.jsonl")).await?);

    let coordinator = Arc::new(
        Coordinator::new(
            &config.root,
            registry.clone(),
            effects,
            audit,
            config.policy.clone(),
        )
        .await?,
    );

    // Pick up any transition interrupted by a crash.
    let recovered = coordinator.recover().await?;
    if recovered > 0 {
        warn!(recovered, "Recovered interrupted transitions at startup");
    }

    let spool = EventSpool::open(&config.root).await?;
    let sampler = sampler_for(config.disk_path());
    let scheduler = Scheduler::new(
        coordinator,
        registry,
        spool,
        sampler,
        config.scheduler.clone(),
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal");
            let _ = shutdown_tx.send(true);
        }
    });

    scheduler.run(shutdown_rx).await?;
    Ok(())
}
