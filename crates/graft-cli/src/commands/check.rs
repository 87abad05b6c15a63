use super::{App, short_sha};
use anyhow::Result;
use graft_core::constants;
use graft_engine::{CheckOutcome, UpdateCheck};
use graft_vcs::{Git2Repository, RangeStatus};
use std::path::Path;
use std::process::ExitCode;
use tracing::error;

pub fn run(
    id: Option<&str>,
    all: bool,
    config_file: Option<&Path>,
    registry_override: Option<&Path>,
) -> Result<ExitCode> {
    let app = App::load(config_file, registry_override)?;
    let vcs = Git2Repository;
    let engine = app.engine(&vcs);
    let ids = app.target_ids(&engine, id, all)?;

    let mut failed = false;
    for id in &ids {
        match engine.check(id) {
            Ok(CheckOutcome::UpToDate {
                commit,
                artifact_count,
                last_import_time,
                last_check_time,
                ..
            }) => {
                println!(
                    "{id}: up to date at {} ({artifact_count} artifacts)",
                    short_sha(&commit)
                );
                if let Some(imported) = last_import_time {
                    println!("  last import: {imported}");
                }
                if let Some(checked) = last_check_time {
                    println!("  last check:  {checked}");
                }
            }
            Ok(CheckOutcome::UpdateAvailable(check)) => print_pending(id, &check),
            Err(err) => {
                error!(id, error = %err, "check failed");
                failed = true;
            }
        }
    }

    Ok(if failed {
        ExitCode::from(4)
    } else {
        ExitCode::SUCCESS
    })
}

pub(crate) fn print_pending(id: &str, check: &UpdateCheck) {
    match &check.range {
        RangeStatus::ReimportRequired => {
            println!(
                "{id}: upstream history is unrelated to the recorded import; re-import required"
            );
            return;
        }
        RangeStatus::Rewritten { merge_base } => {
            println!(
                "{id}: upstream history was rewritten (force-push); diffing from merge-base {}",
                short_sha(merge_base)
            );
        }
        RangeStatus::Normal => {}
    }

    let from = check.from.as_deref().unwrap_or("?");
    println!(
        "{id}: update available {}..{} ({} commits, {} changed files)",
        short_sha(from),
        short_sha(&check.to),
        check.commits.len(),
        check.entries.len()
    );
    for commit in check.commits.iter().take(constants::COMMIT_LOG_DISPLAY_LIMIT) {
        println!("  {} {}", short_sha(&commit.sha), commit.summary);
    }
    let remaining = check
        .commits
        .len()
        .saturating_sub(constants::COMMIT_LOG_DISPLAY_LIMIT);
    if remaining > 0 {
        println!("  ... and {remaining} more");
    }
    for entry in &check.entries {
        println!("  {} {}", entry.status.letter(), entry.path);
    }
}
