//! Version-control hook entry points.
//!
//! Installed hook scripts call `custodian hook <kind>`. The command
//! spools the event within the latency budget and always exits 0: a
//! backup-engine problem must never fail a commit, merge, or push.

use std::path::Path;

use clap::Subcommand;
use custodian_triggers::{EventSpool, GitHookTrigger};
use custodian_types::HookKind;

/// Hook subcommands.
#[derive(Subcommand)]
pub enum HookCommands {
    /// After a commit lands.
    PostCommit {
        /// Revision the commit produced.
        #[arg(long)]
        revision: Option<String>,
    },

    /// After a merge completes.
    PostMerge {
        /// Merge revision.
        #[arg(long)]
        revision: Option<String>,
    },

    /// Before a push is sent.
    PrePush {
        /// Revision being pushed.
        #[arg(long)]
        revision: Option<String>,
    },
}

/// Execute a hook entry point.
pub async fn execute(command: HookCommands, root: &Path) -> anyhow::Result<i32> {
    let (kind, revision) = match command {
        HookCommands::PostCommit { revision } => (HookKind::PostCommit, revision),
        HookCommands::PostMerge { revision } => (HookKind::PostMerge, revision),
        HookCommands::PrePush { revision } => (HookKind::PrePush, revision),
    };

    // Even a failure to open the spool is swallowed: the exit code is
    // the contract with the version-control operation.
    match EventSpool::open(root).await {
        Ok(spool) => {
            GitHookTrigger::new(spool).record_event(kind, revision).await;
        }
        Err(e) => {
            tracing::warn!(error = %e, "Could not open event spool from hook");
        }
    }

    Ok(0)
}
