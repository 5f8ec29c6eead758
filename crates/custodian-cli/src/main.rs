//! Custodian CLI - operator interface for the backup lifecycle engine.
//!
//! Exit codes: 0 success, 1 validation error, 2 busy/lock timeout,
//! 3 low-confidence rejection.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod output;
mod workspace;

use commands::{audit, hook, lifecycle};
use workspace::Workspace;

/// Custodian CLI application.
#[derive(Parser)]
#[command(name = "custodian")]
#[command(about = "Custodian - backup lifecycle coordination", long_about = None)]
#[command(version)]
struct Cli {
    /// Workspace root.
    #[arg(short, long, env = "CUSTODIAN_ROOT", default_value = ".custodian")]
    root: PathBuf,

    /// Policy configuration file path.
    #[arg(short, long, env = "CUSTODIAN_CONFIG")]
    config: Option<String>,

    /// Output format (table, json, yaml).
    #[arg(short, long, default_value = "table")]
    output: output::OutputFormat,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// List backup records.
    List,

    /// Show one record with its current confidence breakdown.
    Status {
        /// Backup id.
        id: String,
    },

    /// Confirm a pending backup.
    Confirm {
        /// Backup id.
        id: String,
    },

    /// Delete a cleanable backup through the confidence gate.
    Cleanup {
        /// Backup id.
        id: String,

        /// Simulate without committing.
        #[arg(long)]
        dry_run: bool,
    },

    /// Move a cleanable backup to archival storage.
    Archive {
        /// Backup id.
        id: String,

        /// Simulate without committing.
        #[arg(long)]
        dry_run: bool,
    },

    /// Delete bypassing the confidence gate (asks for confirmation).
    ForceCleanup {
        /// Backup id.
        id: String,

        /// Skip the confirmation prompt.
        #[arg(short, long)]
        yes: bool,
    },

    /// Run a disk relief sweep immediately.
    Emergency,

    /// Version-control hook entry points.
    Hook {
        #[command(subcommand)]
        command: hook::HookCommands,
    },

    /// Inspect the audit log.
    Audit {
        #[command(subcommand)]
        command: audit::AuditCommands,
    },
}

fn sampler_for(path: PathBuf) -> Box<dyn custodian_triggers::DiskSampler> {
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

    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().without_time())
        .init();

    let code = match cli.command {
        // Hooks must not pay workspace-open costs beyond the spool.
        Commands::Hook { command } => hook::execute(command, &cli.root).await?,
        Commands::Audit { command } => audit::execute(command, &cli.root).await?,
        command => {
            let workspace = Workspace::open(cli.root.clone(), cli.config.as_deref()).await?;
            match command {
                Commands::List => lifecycle::list(&workspace, cli.output).await?,
                Commands::Status { id } => {
                    lifecycle::status(&workspace, &id, cli.output).await?
                }
                Commands::Confirm { id } => lifecycle::confirm(&workspace, &id).await?,
                Commands::Cleanup { id, dry_run } => {
                    lifecycle::cleanup(&workspace, &id, dry_run).await?
                }
                Commands::Archive { id, dry_run } => {
                    lifecycle::archive(&workspace, &id, dry_run).await?
                }
                Commands::ForceCleanup { id, yes } => {
                    lifecycle::force_cleanup(&workspace, &id, yes).await?
                }
                Commands::Emergency => {
                    let sampler = sampler_for(workspace.root.clone());
                    lifecycle::emergency(&workspace, sampler.as_ref()).await?
                }
                Commands::Hook { .. } | Commands::Audit { .. } => unreachable!(),
            }
        }
    };

    std::process::exit(code);
}
