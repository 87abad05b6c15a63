use crate::classify::{
    ActionKind, ClassifyContext, ClassifyOptions, Conflict, ConflictReason, Plan, classify,
};
use crate::ownership::{OwnershipConflict, OwnershipIndex};
use crate::transaction::FileTransaction;
use graft_core::error::{EngineError, Error};
use graft_core::hash::hash_file;
use graft_core::paths::{FsCaseSensitivity, PathValidator};
use graft_core::time::{compact_timestamp, now_iso8601};
use graft_core::types::{ArtifactMapping, DeletePolicy, Integration};
use graft_store::{DurableStore, ProvenanceRecord, ProvenanceStore, Registry, RegistryStore};
use graft_vcs::{CommitInfo, DiffEntry, GitRepository, MirrorStore, RangeStatus, safe_diff_range};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Options for one apply run.
#[derive(Debug, Clone, Copy)]
pub struct ApplyOptions {
    /// Report what would change without touching any file.
    pub dry_run: bool,
    pub overwrite_with_backup: bool,
    pub auto_import_new: bool,
    pub delete_policy: DeletePolicy,
    /// Proceed despite cross-integration ownership conflicts.
    pub force_conflicting: bool,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            dry_run: true,
            overwrite_with_backup: false,
            auto_import_new: false,
            delete_policy: DeletePolicy::Ask,
            force_conflicting: false,
        }
    }
}

/// A pending update detected by `check`, carried into `apply`.
#[derive(Debug)]
pub struct UpdateCheck {
    pub integration_id: String,
    pub mirror: PathBuf,
    /// Effective diff base; `None` when only a fresh import can recover.
    pub from: Option<String>,
    pub to: String,
    pub range: RangeStatus,
    pub commits: Vec<CommitInfo>,
    pub entries: Vec<DiffEntry>,
}

#[derive(Debug)]
pub enum CheckOutcome {
    /// Recorded import point already matches the remote head.
    UpToDate {
        integration_id: String,
        commit: String,
        artifact_count: usize,
        last_import_time: Option<String>,
        last_check_time: Option<String>,
    },
    UpdateAvailable(Box<UpdateCheck>),
}

/// One file written during apply.
#[derive(Debug, Clone)]
pub struct AppliedChange {
    pub source_relpath: String,
    pub dest: PathBuf,
    pub status: char,
    pub backed_up: Option<PathBuf>,
    /// `Some(true)` when the executable bit was gained, `Some(false)`
    /// when lost; `None` when unchanged or untracked.
    pub exec_bit_changed: Option<bool>,
}

#[derive(Debug)]
pub struct ApplyReport {
    pub integration_id: String,
    pub commit: String,
    pub dry_run: bool,
    /// Apply refused to run because of ownership conflicts.
    pub blocked: bool,
    /// Upstream history shares no ancestor with the recorded import;
    /// only a fresh import can recover, so nothing was touched.
    pub reimport_required: bool,
    pub ownership_conflicts: Vec<OwnershipConflict>,
    pub plan: Plan,
    pub applied: Vec<AppliedChange>,
    pub deleted: Vec<PathBuf>,
    /// Patch files written next to conflicting destinations.
    pub patches: Vec<PathBuf>,
}

/// Drives the full update flow for one integration: mirror refresh,
/// history-integrity check, classification, ownership check, and the
/// transactional apply with registry and provenance persistence.
pub struct Engine<'a> {
    vcs: &'a dyn GitRepository,
    mirrors: MirrorStore,
    registry: RegistryStore,
    provenance: ProvenanceStore,
    files: DurableStore,
    case: FsCaseSensitivity,
}

impl<'a> Engine<'a> {
    pub fn new(
        vcs: &'a dyn GitRepository,
        mirrors: MirrorStore,
        registry: RegistryStore,
        provenance: ProvenanceStore,
        files: DurableStore,
        case: FsCaseSensitivity,
    ) -> Self {
        Self {
            vcs,
            mirrors,
            registry,
            provenance,
            files,
            case,
        }
    }

    pub fn registry(&self) -> &RegistryStore {
        &self.registry
    }

    fn integration(&self, registry: &Registry, id: &str) -> Result<Integration, Error> {
        registry
            .integrations
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::IntegrationNotFound { id: id.to_string() }.into())
    }

    /// Refresh the mirror and compare the recorded import point against
    /// the remote head. Persists `last_check_time` (and the force-push
    /// flag when history was rewritten) but never touches artifacts.
    pub fn check(&self, id: &str) -> Result<CheckOutcome, Error> {
        let registry = self.registry.load()?;
        let integration = self.integration(&registry, id)?;
        let source = integration
            .source()
            .ok_or_else(|| EngineError::NoSource { id: id.to_string() })?;

        let mirror = self.mirrors.ensure_mirror(self.vcs, &source)?;
        let remote = self
            .vcs
            .remote_head(&mirror, integration.import_ref.as_deref())?;

        let last_import = match &integration.last_import_commit {
            Some(commit) => commit.clone(),
            None => {
                warn!(id, "no recorded import commit; treating remote head as baseline");
                remote.clone()
            }
        };

        if last_import == remote {
            let count = integration.artifact_mappings.len();
            let refreshed = self.touch_check(id, &remote, false)?;
            let times = refreshed
                .integrations
                .get(id)
                .map(|i| (i.last_import_time.clone(), i.last_check_time.clone()))
                .unwrap_or_default();
            return Ok(CheckOutcome::UpToDate {
                integration_id: id.to_string(),
                commit: remote,
                artifact_count: count,
                last_import_time: times.0,
                last_check_time: times.1,
            });
        }

        let range = safe_diff_range(self.vcs, &mirror, &last_import, &remote)?;
        let rewritten = matches!(range.status, RangeStatus::Rewritten { .. });
        if rewritten {
            warn!(id, "upstream history was rewritten; diffing from merge-base");
        }
        self.touch_check(id, &remote, rewritten)?;

        let (commits, entries) = match (&range.status, &range.from) {
            (RangeStatus::ReimportRequired, _) | (_, None) => (Vec::new(), Vec::new()),
            (_, Some(from)) => (
                self.vcs.commit_log(&mirror, from, &remote)?,
                self.vcs.diff_name_status(&mirror, from, &remote)?,
            ),
        };

        Ok(CheckOutcome::UpdateAvailable(Box::new(UpdateCheck {
            integration_id: id.to_string(),
            mirror,
            from: range.from,
            to: remote,
            range: range.status,
            commits,
            entries,
        })))
    }

    fn touch_check(&self, id: &str, remote: &str, rewritten: bool) -> Result<Registry, Error> {
        let registry = self.registry.update(|registry| {
            if let Some(integration) = registry.integrations.get_mut(id) {
                integration.last_check_time = Some(now_iso8601());
                integration.last_checked_commit = Some(remote.to_string());
                if rewritten {
                    integration.force_push_detected = true;
                }
            }
        })?;
        Ok(registry)
    }

    /// Classify and apply a pending update. With `dry_run` the full plan
    /// is produced and reported but no file, registry, or provenance
    /// state changes.
    pub fn apply(&self, check: &UpdateCheck, opts: &ApplyOptions) -> Result<ApplyReport, Error> {
        let id = check.integration_id.as_str();
        let registry = self.registry.load()?;
        let integration = self.integration(&registry, id)?;

        if matches!(check.range, RangeStatus::ReimportRequired) {
            warn!(id, "upstream history is unrelated to the recorded import; re-import required");
            return Ok(ApplyReport {
                integration_id: id.to_string(),
                commit: check.to.clone(),
                dry_run: opts.dry_run,
                blocked: false,
                reimport_required: true,
                ownership_conflicts: Vec::new(),
                plan: Plan::default(),
                applied: Vec::new(),
                deleted: Vec::new(),
                patches: Vec::new(),
            });
        }

        let install_root = integration.install_root();
        let validator = PathValidator::new(&install_root, self.case)?;
        let plan = classify(
            &check.entries,
            &ClassifyContext {
                mappings: &integration.artifact_mappings,
                install_root: &install_root,
                validator: &validator,
                options: ClassifyOptions {
                    auto_import_new: opts.auto_import_new,
                    overwrite_with_backup: opts.overwrite_with_backup,
                    delete_policy: opts.delete_policy,
                },
            },
        );

        let ownership = OwnershipIndex::build(&registry, self.case);
        let ownership_conflicts = ownership.conflicts_for(id, &plan.planned_dests());
        if !ownership_conflicts.is_empty() && !opts.force_conflicting {
            warn!(id, conflicts = ownership_conflicts.len(), "ownership conflict; apply blocked");
            return Ok(ApplyReport {
                integration_id: id.to_string(),
                commit: check.to.clone(),
                dry_run: opts.dry_run,
                blocked: true,
                reimport_required: false,
                ownership_conflicts,
                plan,
                applied: Vec::new(),
                deleted: Vec::new(),
                patches: Vec::new(),
            });
        }

        if opts.dry_run {
            return Ok(ApplyReport {
                integration_id: id.to_string(),
                commit: check.to.clone(),
                dry_run: true,
                blocked: false,
                reimport_required: false,
                ownership_conflicts,
                plan,
                applied: Vec::new(),
                deleted: Vec::new(),
                patches: Vec::new(),
            });
        }

        let stamp = compact_timestamp();
        // Patches land before any artifact is touched, so a failed sidecar
        // write cannot leave the files and the registry out of step.
        let patches = self.write_conflict_patches(check, &plan.conflicts, &stamp)?;

        self.vcs.checkout(&check.mirror, &check.to)?;

        let mut mappings = integration.artifact_mappings.clone();
        let mut removed_slots: BTreeSet<usize> = BTreeSet::new();
        let mut new_mappings: Vec<ArtifactMapping> = Vec::new();

        let (applied, deleted) = FileTransaction::run(|txn| {
            let mut applied = Vec::new();
            let mut deleted = Vec::new();

            // Deletions first so a rename chain never trips over a file
            // scheduled for removal.
            for deletion in &plan.deletions {
                if deletion.needs_backup && deletion.dest.exists() {
                    txn.copy_file(&deletion.dest, &backup_path(&deletion.dest, &stamp))?;
                }
                txn.delete_file(&deletion.dest)?;
                removed_slots.insert(deletion.mapping_slot);
                deleted.push(deletion.dest.clone());
            }

            for action in &plan.actions {
                let src = check.mirror.join(&action.source_relpath);
                if let ActionKind::Rename { old_dest, .. } = &action.kind {
                    txn.delete_file(old_dest)?;
                }
                let backed_up = if action.needs_backup && action.dest.exists() {
                    let backup = backup_path(&action.dest, &stamp);
                    txn.copy_file(&action.dest, &backup)?;
                    Some(backup)
                } else {
                    None
                };
                txn.copy_file(&src, &action.dest)?;

                let new_hash = hash_file(&action.dest).map_err(|e| {
                    Error::from(EngineError::transaction(
                        format!("hash {}", action.dest.display()),
                        e,
                    ))
                })?;
                let new_mode = file_mode(&action.dest);
                let mut exec_bit_changed = None;

                match &action.kind {
                    ActionKind::Update { mapping_slot } => {
                        let mapping = &mut mappings[*mapping_slot];
                        exec_bit_changed = exec_transition(mapping.file_mode, new_mode);
                        mapping.last_import_hash = Some(new_hash);
                        mapping.last_import_time = Some(now_iso8601());
                        mapping.file_mode = new_mode;
                    }
                    ActionKind::Rename { mapping_slot, .. } => {
                        let mapping = &mut mappings[*mapping_slot];
                        exec_bit_changed = exec_transition(mapping.file_mode, new_mode);
                        mapping.source_relpath = action.source_relpath.clone();
                        mapping.dest_abspath = action.dest.clone();
                        mapping.last_import_hash = Some(new_hash);
                        mapping.last_import_time = Some(now_iso8601());
                        mapping.file_mode = new_mode;
                    }
                    ActionKind::Create { mapping } => {
                        let mut mapping = mapping.clone();
                        mapping.last_import_hash = Some(new_hash);
                        mapping.file_mode = new_mode;
                        new_mappings.push(mapping);
                    }
                }

                applied.push(AppliedChange {
                    source_relpath: action.source_relpath.clone(),
                    dest: action.dest.clone(),
                    status: action.status,
                    backed_up,
                    exec_bit_changed,
                });
            }

            Ok::<_, Error>((applied, deleted))
        })?;

        let final_mappings: Vec<ArtifactMapping> = mappings
            .into_iter()
            .enumerate()
            .filter(|(i, _)| !removed_slots.contains(i))
            .map(|(_, m)| m)
            .chain(new_mappings)
            .collect();

        self.registry.update(|registry| {
            if let Some(integration) = registry.integrations.get_mut(id) {
                integration.artifact_mappings = final_mappings.clone();
                integration.last_import_commit = Some(check.to.clone());
                integration.last_checked_commit = Some(check.to.clone());
                integration.last_import_time = Some(now_iso8601());
                // A successful apply reconciles state even after a rewrite.
                integration.force_push_detected = false;
            }
        })?;

        self.provenance.save(&ProvenanceRecord {
            integration_id: id.to_string(),
            commit: check.to.clone(),
            captured_at: now_iso8601(),
            artifact_mappings: final_mappings,
        })?;

        info!(
            id,
            commit = %check.to,
            applied = applied.len(),
            deleted = deleted.len(),
            conflicts = plan.conflicts.len(),
            "update applied"
        );

        Ok(ApplyReport {
            integration_id: id.to_string(),
            commit: check.to.clone(),
            dry_run: false,
            blocked: false,
            reimport_required: false,
            ownership_conflicts,
            plan,
            applied,
            deleted,
            patches,
        })
    }

    /// Write `<dest>.diff.<timestamp>` next to each locally modified
    /// conflicting file so the change can be merged by hand.
    fn write_conflict_patches(
        &self,
        check: &UpdateCheck,
        conflicts: &[Conflict],
        stamp: &str,
    ) -> Result<Vec<PathBuf>, Error> {
        let Some(from) = &check.from else {
            return Ok(Vec::new());
        };
        let mut patches = Vec::new();
        for conflict in conflicts {
            if !matches!(
                conflict.reason,
                ConflictReason::LocalModified | ConflictReason::RenameLocalModified
            ) {
                continue;
            }
            let Some(dest) = &conflict.dest else { continue };
            match self
                .vcs
                .file_diff(&check.mirror, from, &check.to, &conflict.source_relpath)?
            {
                Some(diff) => {
                    let patch = suffixed_path(dest, &format!(".diff.{stamp}"));
                    self.files.write_text(&patch, &diff, false)?;
                    patches.push(patch);
                }
                None => {
                    warn!(path = %conflict.source_relpath, "no textual diff for conflicting file");
                }
            }
        }
        Ok(patches)
    }

    /// Remove an integration from the registry and drop its provenance
    /// record. With `remove_files` the installed artifacts are deleted in
    /// the same all-or-nothing transaction style as apply.
    pub fn unregister(&self, id: &str, remove_files: bool) -> Result<Integration, Error> {
        let registry = self.registry.load()?;
        let integration = self.integration(&registry, id)?;

        if remove_files {
            // Destinations come from persisted state and are revalidated
            // before deletion, same as during apply.
            let validator = PathValidator::new(&integration.install_root(), self.case)?;
            FileTransaction::run(|txn| {
                for mapping in &integration.artifact_mappings {
                    match validator.validate(&mapping.dest_abspath) {
                        Ok(dest) => txn.delete_file(&dest)?,
                        Err(err) => {
                            warn!(path = %mapping.dest_abspath.display(), error = %err,
                                "skipping unsafe destination");
                        }
                    }
                }
                Ok::<_, Error>(())
            })?;
        }

        self.registry.update(|registry| {
            registry.integrations.remove(id);
        })?;
        self.provenance.remove(id)?;
        info!(id, remove_files, "integration unregistered");
        Ok(integration)
    }
}

fn backup_path(dest: &Path, stamp: &str) -> PathBuf {
    suffixed_path(dest, &format!(".bak.{stamp}"))
}

fn suffixed_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

#[cfg(unix)]
fn file_mode(path: &Path) -> Option<u32> {
    use std::os::unix::fs::MetadataExt;
    std::fs::metadata(path).ok().map(|m| m.mode() & 0o777)
}

#[cfg(not(unix))]
fn file_mode(_path: &Path) -> Option<u32> {
    None
}

fn exec_transition(old: Option<u32>, new: Option<u32>) -> Option<bool> {
    let (old, new) = (old?, new?);
    let (was, is) = (old & 0o111 != 0, new & 0o111 != 0);
    if was == is { None } else { Some(is) }
}
