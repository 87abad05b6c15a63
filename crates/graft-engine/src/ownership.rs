use graft_core::paths::{FsCaseSensitivity, comparison_key};
use graft_store::Registry;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// A planned destination already claimed by a different integration.
#[derive(Debug, Clone)]
pub struct OwnershipConflict {
    pub dest: PathBuf,
    pub owners: Vec<String>,
}

/// Normalized destination -> owning integration ids, built over the whole
/// registry so detection is symmetric: whichever integration is processed
/// first, a shared destination is reported against the other owner.
#[derive(Debug)]
pub struct OwnershipIndex {
    owners: HashMap<String, Vec<String>>,
    case: FsCaseSensitivity,
}

impl OwnershipIndex {
    pub fn build(registry: &Registry, case: FsCaseSensitivity) -> Self {
        let mut owners: HashMap<String, Vec<String>> = HashMap::new();
        for (id, integration) in &registry.integrations {
            for mapping in &integration.artifact_mappings {
                let key = comparison_key(&mapping.dest_abspath, case);
                let entry = owners.entry(key).or_default();
                if !entry.contains(id) {
                    entry.push(id.clone());
                }
            }
        }
        Self { owners, case }
    }

    /// Integrations other than `integration_id` that claim `dest`.
    pub fn other_owners(&self, integration_id: &str, dest: &Path) -> Vec<String> {
        let key = comparison_key(dest, self.case);
        self.owners
            .get(&key)
            .map(|ids| {
                ids.iter()
                    .filter(|id| id.as_str() != integration_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Cross-integration conflicts for a set of planned destinations.
    /// Any non-empty result is a hard stop for apply unless the caller
    /// explicitly forces past it.
    pub fn conflicts_for(&self, integration_id: &str, dests: &[PathBuf]) -> Vec<OwnershipConflict> {
        dests
            .iter()
            .filter_map(|dest| {
                let owners = self.other_owners(integration_id, dest);
                if owners.is_empty() {
                    None
                } else {
                    Some(OwnershipConflict {
                        dest: dest.clone(),
                        owners,
                    })
                }
            })
            .collect()
    }
}
