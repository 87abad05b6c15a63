use crate::durable::DurableStore;
use graft_core::constants;
use graft_core::error::StoreError;
use graft_core::types::Integration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// The integration registry: `{version, config, integrations}`.
///
/// Schema-versioned and validated on load; records are typed, never
/// free-form maps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registry {
    pub version: u32,
    #[serde(default)]
    pub config: RegistryConfig,
    #[serde(default)]
    pub integrations: BTreeMap<String, Integration>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default)]
    pub search_roots: Vec<String>,
    #[serde(default = "default_true")]
    pub auto_track: bool,
    #[serde(default = "default_true")]
    pub ask_confirmation: bool,
}

fn default_true() -> bool {
    true
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            search_roots: Vec::new(),
            auto_track: true,
            ask_confirmation: true,
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self {
            version: constants::REGISTRY_SCHEMA_VERSION,
            config: RegistryConfig::default(),
            integrations: BTreeMap::new(),
        }
    }
}

/// Registry persistence on top of [`DurableStore`].
#[derive(Debug, Clone)]
pub struct RegistryStore {
    path: PathBuf,
    store: DurableStore,
}

impl RegistryStore {
    pub fn new(path: impl Into<PathBuf>, store: DurableStore) -> Self {
        Self {
            path: path.into(),
            store,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the registry, defaulting to an empty one when the file does
    /// not exist yet. A schema version newer than this binary understands
    /// is an error, not a silent reset.
    pub fn load(&self) -> Result<Registry, StoreError> {
        let registry: Registry = match self.store.load_json(&self.path)? {
            Some(registry) => registry,
            None => Registry::default(),
        };
        if registry.version > constants::REGISTRY_SCHEMA_VERSION {
            return Err(StoreError::SchemaVersion {
                found: registry.version,
                expected: constants::REGISTRY_SCHEMA_VERSION,
            });
        }
        Ok(registry)
    }

    pub fn save(&self, registry: &Registry) -> Result<(), StoreError> {
        self.store.write_json(&self.path, registry)
    }

    /// Mutate the registry with the advisory lock held across the whole
    /// read-modify-write.
    pub fn update<F>(&self, mutate: F) -> Result<Registry, StoreError>
    where
        F: FnOnce(&mut Registry),
    {
        self.store.update_json(&self.path, |current| {
            let mut registry = current.unwrap_or_default();
            mutate(&mut registry);
            registry
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graft_core::types::TargetScope;

    fn sample_integration(id: &str) -> Integration {
        Integration {
            id: id.to_string(),
            source_url: Some(format!("https://example.com/{id}.git")),
            source_path: None,
            target_scope: TargetScope::User,
            target_repo_path: None,
            import_ref: None,
            last_import_commit: None,
            last_checked_commit: None,
            last_import_time: None,
            last_check_time: None,
            force_push_detected: false,
            markers: Vec::new(),
            artifact_mappings: Vec::new(),
            notes: None,
        }
    }

    #[test]
    fn missing_registry_loads_as_default() {
        let tmp = tempfile::tempdir().unwrap();
        let store = RegistryStore::new(tmp.path().join("registry.json"), DurableStore::default());
        let registry = store.load().unwrap();
        assert_eq!(registry.version, constants::REGISTRY_SCHEMA_VERSION);
        assert!(registry.integrations.is_empty());
        assert!(registry.config.auto_track);
    }

    #[test]
    fn save_and_reload_round_trips_integrations() {
        let tmp = tempfile::tempdir().unwrap();
        let store = RegistryStore::new(tmp.path().join("registry.json"), DurableStore::default());
        let mut registry = Registry::default();
        registry
            .integrations
            .insert("alpha".into(), sample_integration("alpha"));
        store.save(&registry).unwrap();

        let reloaded = store.load().unwrap();
        assert_eq!(reloaded.integrations.len(), 1);
        assert_eq!(
            reloaded.integrations["alpha"].source_url.as_deref(),
            Some("https://example.com/alpha.git")
        );
    }

    #[test]
    fn newer_schema_version_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("registry.json");
        std::fs::write(
            &path,
            format!(
                "{{\"version\": {}, \"integrations\": {{}}}}",
                constants::REGISTRY_SCHEMA_VERSION + 1
            ),
        )
        .unwrap();
        let store = RegistryStore::new(&path, DurableStore::default());
        let err = store.load().unwrap_err();
        assert!(matches!(err, StoreError::SchemaVersion { .. }));
    }

    #[test]
    fn update_persists_mutation() {
        let tmp = tempfile::tempdir().unwrap();
        let store = RegistryStore::new(tmp.path().join("registry.json"), DurableStore::default());
        store
            .update(|registry| {
                registry
                    .integrations
                    .insert("beta".into(), sample_integration("beta"));
            })
            .unwrap();
        assert!(store.load().unwrap().integrations.contains_key("beta"));
    }
}
