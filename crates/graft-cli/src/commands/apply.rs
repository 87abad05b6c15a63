use super::{App, check, short_sha};
use anyhow::Result;
use graft_core::types::DeletePolicy;
use graft_engine::classify::ConflictReason;
use graft_engine::{ApplyOptions, ApplyReport, CheckOutcome};
use graft_vcs::Git2Repository;
use std::path::Path;
use std::process::ExitCode;
use tracing::error;

#[derive(Debug, Clone, Copy)]
pub struct Flags {
    pub dry_run: bool,
    pub overwrite_with_backup: bool,
    pub delete_policy: Option<DeletePolicy>,
    pub auto_import_new: bool,
    pub force_conflicting: bool,
}

pub fn run(
    id: Option<&str>,
    all: bool,
    flags: Flags,
    config_file: Option<&Path>,
    registry_override: Option<&Path>,
) -> Result<ExitCode> {
    let app = App::load(config_file, registry_override)?;
    let vcs = Git2Repository;
    let engine = app.engine(&vcs);
    let ids = app.target_ids(&engine, id, all)?;

    let opts = ApplyOptions {
        dry_run: flags.dry_run,
        overwrite_with_backup: flags.overwrite_with_backup,
        auto_import_new: flags.auto_import_new || app.config.update.auto_import_new,
        delete_policy: flags
            .delete_policy
            .unwrap_or(app.config.update.delete_policy),
        force_conflicting: flags.force_conflicting,
    };

    let mut failed = false;
    let mut policy_stop = false;
    for id in &ids {
        let outcome = match engine.check(id) {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(id, error = %err, "check failed");
                failed = true;
                continue;
            }
        };
        let pending = match outcome {
            CheckOutcome::UpToDate {
                commit,
                artifact_count,
                ..
            } => {
                println!(
                    "{id}: up to date at {} ({artifact_count} artifacts)",
                    short_sha(&commit)
                );
                continue;
            }
            CheckOutcome::UpdateAvailable(check) => check,
        };
        check::print_pending(id, &pending);

        match engine.apply(&pending, &opts) {
            Ok(report) => {
                print_report(&report);
                if report.blocked || report.reimport_required || has_unsafe_path(&report) {
                    policy_stop = true;
                }
            }
            Err(err) => {
                error!(id, error = %err, "apply failed");
                failed = true;
            }
        }
    }

    Ok(if policy_stop {
        ExitCode::from(3)
    } else if failed {
        ExitCode::from(4)
    } else {
        ExitCode::SUCCESS
    })
}

fn has_unsafe_path(report: &ApplyReport) -> bool {
    report
        .plan
        .conflicts
        .iter()
        .any(|c| c.reason == ConflictReason::PathUnsafe)
}

fn print_report(report: &ApplyReport) {
    let id = &report.integration_id;

    if report.reimport_required {
        println!(
            "{id}: upstream history is unrelated to the recorded import; \
             no changes were made (unregister and re-import to recover)"
        );
        return;
    }

    if report.blocked {
        println!("{id}: BLOCKED by cross-integration ownership conflicts:");
        for conflict in &report.ownership_conflicts {
            println!(
                "  {} also owned by {}",
                conflict.dest.display(),
                conflict.owners.join(", ")
            );
        }
        println!("  no changes were made (use --force-conflicting to override)");
        return;
    }

    if report.dry_run {
        println!("{id}: dry run (pass --no-dry-run to write changes)");
        for action in &report.plan.actions {
            println!(
                "  would apply {} {} -> {}",
                action.status,
                action.source_relpath,
                action.dest.display()
            );
        }
        for deletion in &report.plan.deletions {
            println!("  would delete {}", deletion.dest.display());
        }
    } else {
        for change in &report.applied {
            println!(
                "  applied {} {} -> {}",
                change.status,
                change.source_relpath,
                change.dest.display()
            );
            if let Some(backup) = &change.backed_up {
                println!("    backup saved: {}", backup.display());
            }
            match change.exec_bit_changed {
                Some(true) => println!("    now executable"),
                Some(false) => println!("    no longer executable"),
                None => {}
            }
        }
        for deleted in &report.deleted {
            println!("  deleted {}", deleted.display());
        }
    }

    for conflict in &report.plan.conflicts {
        println!(
            "  CONFLICT ({}): {} {}",
            conflict.reason, conflict.source_relpath, conflict.detail
        );
    }
    for patch in &report.patches {
        println!("  upstream diff saved: {}", patch.display());
    }
    for artifact in &report.plan.new_artifacts {
        println!("  new upstream artifact (not imported): {artifact}");
    }
    for skipped in &report.plan.skipped {
        println!(
            "  skipped {} {} ({})",
            skipped.status, skipped.source_relpath, skipped.reason
        );
    }

    if !report.dry_run {
        println!(
            "{id}: now at {} ({} applied, {} deleted, {} conflicts)",
            short_sha(&report.commit),
            report.applied.len(),
            report.deleted.len(),
            report.plan.conflicts.len()
        );
    }
}
