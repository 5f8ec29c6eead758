//! Lifecycle commands: list, status, confirm, cleanup, force-cleanup,
//! archive, emergency.

use chrono::Utc;
use custodian_triggers::{plan_sweep, DiskSampler, UserTrigger};
use custodian_types::{BackupId, BackupState, Outcome, TransitionResult};
use serde::Serialize;
use tabled::Tabled;

use crate::commands::exit_code_for;
use crate::output::{self, OutputFormat};
use crate::workspace::Workspace;

/// One row of `custodian list`.
#[derive(Tabled, Serialize)]
pub struct RecordRow {
    /// Backup id.
    pub id: String,
    /// Lifecycle state.
    pub state: String,
    /// Payload classification.
    pub kind: String,
    /// Payload size.
    pub size: String,
    /// Age in days.
    pub age_days: i64,
    /// Whether the record needs operator attention.
    pub stuck: String,
}

/// `list`: show every record.
pub async fn list(workspace: &Workspace, format: OutputFormat) -> anyhow::Result<i32> {
    let now = Utc::now();
    let records = workspace.registry.list(&|_| true).await?;

    let rows: Vec<RecordRow> = records
        .iter()
        .map(|r| RecordRow {
            id: r.id.to_string(),
            state: match format {
                OutputFormat::Table => output::colored_state(r.state),
                _ => r.state.to_string(),
            },
            kind: r.kind.to_string(),
            size: output::human_size(r.size_bytes),
            age_days: r.age(now).num_days(),
            stuck: if r.stuck { "yes".into() } else { "".into() },
        })
        .collect();

    output::print_output(rows, format);
    Ok(0)
}

/// `status <id>`: record detail plus the current score breakdown.
pub async fn status(
    workspace: &Workspace,
    id: &str,
    format: OutputFormat,
) -> anyhow::Result<i32> {
    let record = match workspace.registry.get(&BackupId::new(id)).await {
        Ok(record) => record,
        Err(e) => {
            output::print_error(&e.to_string());
            return Ok(1);
        }
    };

    let breakdown = custodian_score::score(&record, &workspace.policy.scoring, Utc::now());

    #[derive(Serialize)]
    struct Status<'a> {
        record: &'a custodian_types::BackupRecord,
        confidence: f64,
        archive_threshold: f64,
        delete_threshold: f64,
        factors: &'a [custodian_score::FactorScore],
    }

    output::print_single(
        &Status {
            record: &record,
            confidence: breakdown.confidence.value(),
            archive_threshold: workspace.policy.thresholds.archive,
            delete_threshold: workspace.policy.thresholds.delete,
            factors: &breakdown.factors,
        },
        format,
    );
    Ok(0)
}

/// `confirm <id>`: manually confirm a pending backup.
pub async fn confirm(workspace: &Workspace, id: &str) -> anyhow::Result<i32> {
    let result = workspace
        .coordinator
        .submit(UserTrigger::confirm(BackupId::new(id)))
        .await?;
    report(&result, id, "confirmed");
    Ok(exit_code_for(&result))
}

/// `cleanup <id>`: delete through the confidence gate.
pub async fn cleanup(workspace: &Workspace, id: &str, dry_run: bool) -> anyhow::Result<i32> {
    let result = workspace
        .coordinator
        .submit(UserTrigger::cleanup(BackupId::new(id), dry_run))
        .await?;

    if dry_run && result.is_committed() {
        let confidence = result
            .confidence_at_decision
            .map(|c| c.to_string())
            .unwrap_or_else(|| "n/a".into());
        output::print_success(&format!(
            "dry run: {id} would be deleted (confidence {confidence})"
        ));
        return Ok(0);
    }

    report(&result, id, "deleted");
    Ok(exit_code_for(&result))
}

/// `archive <id>`: move a cleanable backup to archival storage.
pub async fn archive(workspace: &Workspace, id: &str, dry_run: bool) -> anyhow::Result<i32> {
    let result = workspace
        .coordinator
        .submit(UserTrigger::archive(BackupId::new(id), dry_run))
        .await?;

    if dry_run && result.is_committed() {
        output::print_success(&format!("dry run: {id} would be archived"));
        return Ok(0);
    }

    report(&result, id, "archived");
    Ok(exit_code_for(&result))
}

/// `force-cleanup <id>`: delete bypassing the confidence gate, with an
/// explicit confirmation prompt unless `--yes` was given.
pub async fn force_cleanup(workspace: &Workspace, id: &str, yes: bool) -> anyhow::Result<i32> {
    if !yes {
        let confirmed = dialoguer::Confirm::new()
            .with_prompt(format!(
                "Force delete {id}? This bypasses the confidence gate and cannot be undone"
            ))
            .default(false)
            .interact()?;
        if !confirmed {
            output::print_warning("aborted");
            return Ok(1);
        }
    }

    let result = workspace
        .coordinator
        .submit(UserTrigger::force_cleanup(BackupId::new(id)))
        .await?;
    report(&result, id, "force-deleted");
    Ok(exit_code_for(&result))
}

/// `emergency`: sample disk pressure and run a relief sweep now,
/// re-sampling between deletions and stopping as soon as usage clears
/// the relief target.
pub async fn emergency(workspace: &Workspace, sampler: &dyn DiskSampler) -> anyhow::Result<i32> {
    let sample = sampler.sample()?;
    let level = workspace.policy.disk.classify(sample.used_pct());

    if level == custodian_types::DiskLevel::Normal {
        output::print_success(&format!(
            "disk usage {:.1}% is below every threshold; nothing to do",
            sample.used_pct()
        ));
        return Ok(0);
    }

    let cleanable = workspace
        .registry
        .list_in_state(BackupState::Cleanable)
        .await?;
    let Some(plan) = plan_sweep(
        &cleanable,
        &sample,
        level,
        &workspace.policy.disk,
        &workspace.policy.scoring,
        &workspace.policy.thresholds,
        Utc::now(),
    ) else {
        output::print_warning(&format!(
            "disk pressure is {level} but no cleanable record is eligible; use force-cleanup"
        ));
        return Ok(1);
    };

    let relief_target = workspace.policy.disk.relief_target(level);
    let mut released = 0u32;

    for request in plan.requests {
        // Stop issuing once the target is met; the rest of the batch
        // is abandoned.
        let usage = sampler.sample()?.used_pct();
        if usage < relief_target {
            break;
        }

        let id = request.backup_id.clone();
        let result = workspace.coordinator.submit(request).await?;
        match result.outcome {
            Outcome::Committed => {
                released += 1;
                output::print_success(&format!("deleted {id}"));
            }
            Outcome::Rejected => {
                if let Some(cause) = &result.cause {
                    output::print_warning(&format!("{id}: {cause}"));
                }
            }
        }
    }

    output::print_success(&format!("emergency sweep finished: {released} deleted"));
    Ok(0)
}

fn report(result: &TransitionResult, id: &str, verb: &str) {
    match result.outcome {
        Outcome::Committed => {
            output::print_success(&format!("{id} {verb}"));
        }
        Outcome::Rejected => {
            if let Some(cause) = &result.cause {
                output::print_error(&format!("{id}: {cause}"));
                output::print_warning(&format!("next: {}", cause.next_action()));
            }
        }
    }
}
