//! Audit log inspection.

use std::path::Path;

use clap::Subcommand;
use custodian_engine::{verify_chain, FileAuditSink};

use crate::output;

/// Audit subcommands.
#[derive(Subcommand)]
pub enum AuditCommands {
    /// Verify the integrity of the audit chain.
    Verify,

    /// Print the most recent entries.
    Tail {
        /// Number of entries to show.
        #[arg(short, long, default_value_t = 20)]
        count: usize,
    },
}

/// Execute an audit subcommand.
pub async fn execute(command: AuditCommands, root: &Path) -> anyhow::Result<i32> {
    let sink = FileAuditSink::open(root.join("audit.jsonl")).await?;
    let entries = sink.read_all().await?;

    match command {
        AuditCommands::Verify => match verify_chain(&entries) {
            Ok(()) => {
                output::print_success(&format!(
                    "audit chain intact ({} entries)",
                    entries.len()
                ));
                Ok(0)
            }
            Err(e) => {
                output::print_error(&e.to_string());
                Ok(1)
            }
        },
        AuditCommands::Tail { count } => {
            for entry in entries.iter().rev().take(count).rev() {
                let cause = entry
                    .cause
                    .as_ref()
                    .map(|c| format!(" ({c})"))
                    .unwrap_or_default();
                let confidence = entry
                    .confidence
                    .map(|c| format!(" confidence={c}"))
                    .unwrap_or_default();
                println!(
                    "{} {} {} {} -> {} [{:?}]{}{}",
                    entry.timestamp.to_rfc3339(),
                    entry.backup_id,
                    entry.trigger,
                    entry.from,
                    entry.requested,
                    entry.outcome,
                    confidence,
                    cause,
                );
            }
            Ok(0)
        }
    }
}
