use crate::durable::DurableStore;
use graft_core::error::StoreError;
use graft_core::types::ArtifactMapping;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Snapshot of an integration's artifact mappings captured at the moment
/// of the most recent successful import. The classifier consumes this as
/// the expected baseline for future diffs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvenanceRecord {
    pub integration_id: String,
    pub commit: String,
    pub captured_at: String,
    pub artifact_mappings: Vec<ArtifactMapping>,
}

/// One JSON file per integration under the provenance directory.
#[derive(Debug, Clone)]
pub struct ProvenanceStore {
    dir: PathBuf,
    store: DurableStore,
}

impl ProvenanceStore {
    pub fn new(dir: impl Into<PathBuf>, store: DurableStore) -> Self {
        Self {
            dir: dir.into(),
            store,
        }
    }

    fn record_path(&self, integration_id: &str) -> PathBuf {
        // Integration ids can contain path-hostile characters; hash-suffix
        // a sanitized name so distinct ids never share a file.
        let sanitized: String = integration_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        let digest = blake3::hash(integration_id.as_bytes());
        self.dir
            .join(format!("{sanitized}-{}.json", &digest.to_hex()[..8]))
    }

    pub fn load(&self, integration_id: &str) -> Result<Option<ProvenanceRecord>, StoreError> {
        self.store.load_json(&self.record_path(integration_id))
    }

    pub fn save(&self, record: &ProvenanceRecord) -> Result<(), StoreError> {
        self.store
            .write_json(&self.record_path(&record.integration_id), record)
    }

    pub fn remove(&self, integration_id: &str) -> Result<(), StoreError> {
        let path = self.record_path(integration_id);
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        Ok(())
    }
}
