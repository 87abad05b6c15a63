pub mod apply;
pub mod check;
pub mod list;
pub mod unregister;

use anyhow::{Context, Result, bail};
use graft_core::config::Config;
use graft_core::paths::FsCaseSensitivity;
use graft_engine::Engine;
use graft_store::{DurableStore, ProvenanceStore, RegistryStore};
use graft_vcs::{Git2Repository, MirrorStore};
use std::path::{Path, PathBuf};

/// Loaded configuration plus the resolved registry location, shared by
/// every command.
pub(crate) struct App {
    pub config: Config,
    pub registry_path: PathBuf,
}

impl App {
    pub fn load(config_file: Option<&Path>, registry_override: Option<&Path>) -> Result<Self> {
        // The directory graft runs in is the target repo for the
        // project-layer config.
        let cwd = std::env::current_dir().ok();
        let config = Config::load_with_file(cwd.as_deref(), config_file)
            .context("failed to load configuration")?;
        let registry_path = registry_override
            .map(Path::to_path_buf)
            .unwrap_or_else(|| config.registry_path());
        Ok(Self {
            config,
            registry_path,
        })
    }

    pub fn case(&self) -> FsCaseSensitivity {
        FsCaseSensitivity::resolve(&self.config.fs.case_sensitivity, &self.config.data_dir())
    }

    pub fn engine<'a>(&self, vcs: &'a Git2Repository) -> Engine<'a> {
        let store = DurableStore::new(self.config.locking.timeout_ms, self.config.locking.poll_ms);
        Engine::new(
            vcs,
            MirrorStore::new(
                self.config.sources_dir(),
                self.config.network.max_retries,
                self.config.network.backoff_base_ms,
            ),
            RegistryStore::new(self.registry_path.clone(), store.clone()),
            ProvenanceStore::new(self.config.provenance_dir(), store.clone()),
            store,
            self.case(),
        )
    }

    /// Resolve `--id`/`--all` into concrete integration ids.
    pub fn target_ids(
        &self,
        engine: &Engine<'_>,
        id: Option<&str>,
        all: bool,
    ) -> Result<Vec<String>> {
        if let Some(id) = id {
            return Ok(vec![id.to_string()]);
        }
        debug_assert!(all);
        let registry = engine.registry().load()?;
        if registry.integrations.is_empty() {
            bail!("no integrations registered");
        }
        Ok(registry.integrations.keys().cloned().collect())
    }
}

pub(crate) fn short_sha(sha: &str) -> &str {
    &sha[..sha.len().min(8)]
}
