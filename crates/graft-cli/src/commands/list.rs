use super::{App, short_sha};
use anyhow::Result;
use graft_core::types::SourceRef;
use graft_vcs::Git2Repository;
use std::path::Path;
use std::process::ExitCode;

pub fn run(config_file: Option<&Path>, registry_override: Option<&Path>) -> Result<ExitCode> {
    let app = App::load(config_file, registry_override)?;
    let vcs = Git2Repository;
    let engine = app.engine(&vcs);
    let registry = engine.registry().load()?;

    if registry.integrations.is_empty() {
        println!("no integrations registered");
        return Ok(ExitCode::SUCCESS);
    }

    for (id, integration) in &registry.integrations {
        let source = match integration.source() {
            Some(SourceRef::Url(url)) => url,
            Some(SourceRef::LocalPath(path)) => path.display().to_string(),
            None => "(no source)".to_string(),
        };
        let commit = integration
            .last_import_commit
            .as_deref()
            .map(short_sha)
            .unwrap_or("never imported");
        println!(
            "{id}: {source} [{}] at {commit}, {} artifacts",
            integration.target_scope.as_str(),
            integration.artifact_mappings.len()
        );
        if integration.force_push_detected {
            println!("  warning: upstream history rewrite detected on last check");
        }
    }
    Ok(ExitCode::SUCCESS)
}
