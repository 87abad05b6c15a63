use super::App;
use anyhow::Result;
use graft_vcs::Git2Repository;
use std::path::Path;
use std::process::ExitCode;

pub fn run(
    id: &str,
    remove_files: bool,
    config_file: Option<&Path>,
    registry_override: Option<&Path>,
) -> Result<ExitCode> {
    let app = App::load(config_file, registry_override)?;
    let vcs = Git2Repository;
    let engine = app.engine(&vcs);

    let removed = engine.unregister(id, remove_files)?;
    if remove_files {
        println!(
            "unregistered {id} and removed {} installed files",
            removed.artifact_mappings.len()
        );
    } else {
        println!(
            "unregistered {id} ({} installed files left in place)",
            removed.artifact_mappings.len()
        );
    }
    Ok(ExitCode::SUCCESS)
}
