use graft_core::hash::try_hash_file;
use graft_core::paths::PathValidator;
use graft_core::time::now_iso8601;
use graft_core::types::{ArtifactKind, ArtifactMapping, DeletePolicy, dest_from_source_relpath};
use graft_vcs::{ChangeStatus, DiffEntry};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Knobs that change how upstream changes are classified.
#[derive(Debug, Clone, Copy)]
pub struct ClassifyOptions {
    /// Track and install artifacts added upstream without being asked.
    pub auto_import_new: bool,
    /// Overwrite locally modified or colliding files after saving a
    /// timestamped backup, instead of reporting a conflict.
    pub overwrite_with_backup: bool,
    pub delete_policy: DeletePolicy,
}

impl Default for ClassifyOptions {
    fn default() -> Self {
        Self {
            auto_import_new: false,
            overwrite_with_backup: false,
            delete_policy: DeletePolicy::Ask,
        }
    }
}

/// Everything the classifier needs to read; it never writes.
pub struct ClassifyContext<'a> {
    pub mappings: &'a [ArtifactMapping],
    pub install_root: &'a Path,
    pub validator: &'a PathValidator,
    pub options: ClassifyOptions,
}

/// How a planned action updates the mapping table on apply.
#[derive(Debug, Clone)]
pub enum ActionKind {
    /// Refresh an existing mapping in place.
    Update { mapping_slot: usize },
    /// Append a brand-new mapping (auto-imported artifact).
    Create { mapping: ArtifactMapping },
    /// Move a mapping to a new source path and destination.
    Rename {
        mapping_slot: usize,
        old_dest: PathBuf,
        old_source_relpath: String,
        case_only: bool,
    },
}

/// One file copy the apply phase will perform.
#[derive(Debug, Clone)]
pub struct PlannedAction {
    pub source_relpath: String,
    pub dest: PathBuf,
    pub status: char,
    /// Save a timestamped backup of the destination before overwriting.
    pub needs_backup: bool,
    pub kind: ActionKind,
}

/// One tracked file the apply phase will remove.
#[derive(Debug, Clone)]
pub struct PlannedDeletion {
    pub source_relpath: String,
    pub dest: PathBuf,
    pub mapping_slot: usize,
    /// Soft policy: copy to a timestamped backup before removal.
    pub needs_backup: bool,
}

/// Why a change could not be applied. Conflicts are values the caller
/// inspects and reports; classification itself never fails on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictReason {
    /// Destination bytes no longer match the recorded import hash.
    LocalModified,
    /// Renamed upstream while also locally modified.
    RenameLocalModified,
    /// Rename destination is already claimed by another tracked mapping.
    RenameDestTracked,
    /// Rename destination exists on disk but is untracked.
    RenameDestExists,
    /// A new upstream artifact's destination already exists locally.
    NewDestExists,
    /// Computed destination failed path-safety validation.
    PathUnsafe,
    /// Deleted upstream but modified locally; kept under the ask policy.
    DeletedUpstreamKeptLocal,
}

impl ConflictReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LocalModified => "local_modified",
            Self::RenameLocalModified => "rename_local_modified",
            Self::RenameDestTracked => "rename_dest_tracked",
            Self::RenameDestExists => "rename_dest_exists",
            Self::NewDestExists => "new_dest_exists",
            Self::PathUnsafe => "path_unsafe",
            Self::DeletedUpstreamKeptLocal => "deleted_upstream_kept_local",
        }
    }
}

impl std::fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct Conflict {
    pub source_relpath: String,
    pub dest: Option<PathBuf>,
    pub reason: ConflictReason,
    pub detail: String,
}

/// A change the engine deliberately leaves alone (unmerged, unknown, or
/// broken pair entries).
#[derive(Debug, Clone)]
pub struct SkippedChange {
    pub source_relpath: String,
    pub status: char,
    pub reason: String,
}

/// Full classification of an upstream diff against the recorded state.
#[derive(Debug, Default)]
pub struct Plan {
    pub actions: Vec<PlannedAction>,
    pub deletions: Vec<PlannedDeletion>,
    pub conflicts: Vec<Conflict>,
    /// Untracked additions reported but not imported (auto-import off).
    pub new_artifacts: Vec<String>,
    pub skipped: Vec<SkippedChange>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
            && self.deletions.is_empty()
            && self.conflicts.is_empty()
            && self.new_artifacts.is_empty()
            && self.skipped.is_empty()
    }

    /// Destinations this plan would write or remove, for ownership checks.
    pub fn planned_dests(&self) -> Vec<PathBuf> {
        self.actions
            .iter()
            .map(|a| a.dest.clone())
            .chain(self.deletions.iter().map(|d| d.dest.clone()))
            .collect()
    }
}

/// Classify upstream diff entries into apply actions, deletions,
/// conflicts, and skips.
///
/// Per-file state drives every verdict: a change is clean only when the
/// destination's current hash matches the hash recorded at the last
/// import. A mapping with no recorded hash (legacy record) is treated as
/// clean. Every computed destination passes through the path validator;
/// an unsafe path becomes a conflict that overrides any other verdict for
/// that entry.
pub fn classify(entries: &[DiffEntry], ctx: &ClassifyContext<'_>) -> Plan {
    let index: BTreeMap<&str, usize> = ctx
        .mappings
        .iter()
        .enumerate()
        .map(|(i, m)| (m.source_relpath.as_str(), i))
        .collect();

    let mut plan = Plan::default();
    for entry in entries {
        match &entry.status {
            ChangeStatus::Added | ChangeStatus::Modified => {
                classify_upsert(&mut plan, ctx, &index, entry, entry.status.letter());
            }
            ChangeStatus::Copied { old_path, .. } => {
                // The original stays in place; only the copy is new.
                debug!(from = %old_path, to = %entry.path, "upstream copy treated as addition");
                classify_upsert(&mut plan, ctx, &index, entry, 'C');
            }
            ChangeStatus::TypeChanged => {
                classify_typechange(&mut plan, ctx, &index, entry);
            }
            ChangeStatus::Deleted => {
                classify_delete(&mut plan, ctx, &index, entry);
            }
            ChangeStatus::Renamed { old_path, .. } => {
                classify_rename(&mut plan, ctx, &index, entry, old_path);
            }
            ChangeStatus::Unmerged | ChangeStatus::Unknown | ChangeStatus::Broken => {
                warn!(path = %entry.path, status = %entry.status.letter(), "skipping unapplicable change");
                plan.skipped.push(SkippedChange {
                    source_relpath: entry.path.clone(),
                    status: entry.status.letter(),
                    reason: "unmerged, unknown, or broken upstream entry".into(),
                });
            }
        }
    }
    plan
}

/// Added or modified upstream. An untracked modification behaves like an
/// addition: upstream may have started shipping a file we never imported.
fn classify_upsert(
    plan: &mut Plan,
    ctx: &ClassifyContext<'_>,
    index: &BTreeMap<&str, usize>,
    entry: &DiffEntry,
    status: char,
) {
    let Some(&slot) = index.get(entry.path.as_str()) else {
        classify_new_artifact(plan, ctx, &entry.path, status);
        return;
    };

    let mapping = &ctx.mappings[slot];
    let dest = match ctx.validator.validate(&mapping.dest_abspath) {
        Ok(dest) => dest,
        Err(e) => {
            push_unsafe(plan, &entry.path, &mapping.dest_abspath, e);
            return;
        }
    };

    match local_state(mapping, &dest) {
        LocalState::Clean | LocalState::Missing => plan.actions.push(PlannedAction {
            source_relpath: entry.path.clone(),
            dest,
            status,
            needs_backup: false,
            kind: ActionKind::Update { mapping_slot: slot },
        }),
        LocalState::Modified => {
            if ctx.options.overwrite_with_backup {
                plan.actions.push(PlannedAction {
                    source_relpath: entry.path.clone(),
                    dest,
                    status,
                    needs_backup: true,
                    kind: ActionKind::Update { mapping_slot: slot },
                });
            } else {
                plan.conflicts.push(Conflict {
                    source_relpath: entry.path.clone(),
                    dest: Some(dest),
                    reason: ConflictReason::LocalModified,
                    detail: "local file differs from last imported content".into(),
                });
            }
        }
    }
}

/// Mode flips (regular file <-> symlink/executable) always back up the
/// destination before replacing it, even when the content hash matches.
fn classify_typechange(
    plan: &mut Plan,
    ctx: &ClassifyContext<'_>,
    index: &BTreeMap<&str, usize>,
    entry: &DiffEntry,
) {
    let Some(&slot) = index.get(entry.path.as_str()) else {
        debug!(path = %entry.path, "untracked type change ignored");
        return;
    };
    let mapping = &ctx.mappings[slot];
    match ctx.validator.validate(&mapping.dest_abspath) {
        Ok(dest) => plan.actions.push(PlannedAction {
            source_relpath: entry.path.clone(),
            dest,
            status: 'T',
            needs_backup: true,
            kind: ActionKind::Update { mapping_slot: slot },
        }),
        Err(e) => push_unsafe(plan, &entry.path, &mapping.dest_abspath, e),
    }
}

fn classify_delete(
    plan: &mut Plan,
    ctx: &ClassifyContext<'_>,
    index: &BTreeMap<&str, usize>,
    entry: &DiffEntry,
) {
    let Some(&slot) = index.get(entry.path.as_str()) else {
        debug!(path = %entry.path, "untracked upstream deletion ignored");
        return;
    };
    let mapping = &ctx.mappings[slot];
    let dest = match ctx.validator.validate(&mapping.dest_abspath) {
        Ok(dest) => dest,
        Err(e) => {
            push_unsafe(plan, &entry.path, &mapping.dest_abspath, e);
            return;
        }
    };

    let clean = !matches!(local_state(mapping, &dest), LocalState::Modified);
    let deletion = |needs_backup| PlannedDeletion {
        source_relpath: entry.path.clone(),
        dest: dest.clone(),
        mapping_slot: slot,
        needs_backup,
    };
    match ctx.options.delete_policy {
        DeletePolicy::Hard => plan.deletions.push(deletion(false)),
        DeletePolicy::Soft => plan.deletions.push(deletion(true)),
        DeletePolicy::Skip => plan.skipped.push(SkippedChange {
            source_relpath: entry.path.clone(),
            status: 'D',
            reason: "delete policy is skip".into(),
        }),
        DeletePolicy::Ask => {
            if clean {
                plan.deletions.push(deletion(false));
            } else {
                plan.conflicts.push(Conflict {
                    source_relpath: entry.path.clone(),
                    dest: Some(dest),
                    reason: ConflictReason::DeletedUpstreamKeptLocal,
                    detail: "deleted upstream but modified locally; file kept".into(),
                });
            }
        }
    }
}

/// The new destination is computed from the *new* source path's directory
/// structure, so a move between artifact trees (commands -> agents)
/// relocates the installed file as well.
fn classify_rename(
    plan: &mut Plan,
    ctx: &ClassifyContext<'_>,
    index: &BTreeMap<&str, usize>,
    entry: &DiffEntry,
    old_path: &str,
) {
    let Some(&slot) = index.get(old_path) else {
        // Nothing of ours moved; the new path is an ordinary addition.
        classify_new_artifact(plan, ctx, &entry.path, 'A');
        return;
    };
    let mapping = &ctx.mappings[slot];

    let new_dest = dest_from_source_relpath(&entry.path, ctx.install_root);
    let new_dest = match ctx.validator.validate(&new_dest) {
        Ok(dest) => dest,
        Err(e) => {
            push_unsafe(plan, &entry.path, &new_dest, e);
            return;
        }
    };
    let old_dest = match ctx.validator.validate(&mapping.dest_abspath) {
        Ok(dest) => dest,
        Err(e) => {
            push_unsafe(plan, old_path, &mapping.dest_abspath, e);
            return;
        }
    };

    if matches!(local_state(mapping, &old_dest), LocalState::Modified) {
        plan.conflicts.push(Conflict {
            source_relpath: entry.path.clone(),
            dest: Some(old_dest),
            reason: ConflictReason::RenameLocalModified,
            detail: format!("renamed upstream from {old_path} but modified locally"),
        });
        return;
    }

    let case_only =
        ctx.validator.comparison_key(&new_dest) == ctx.validator.comparison_key(&old_dest);
    let rename = |needs_backup| PlannedAction {
        source_relpath: entry.path.clone(),
        dest: new_dest.clone(),
        status: 'R',
        needs_backup,
        kind: ActionKind::Rename {
            mapping_slot: slot,
            old_dest: old_dest.clone(),
            old_source_relpath: old_path.to_string(),
            case_only,
        },
    };

    if case_only || !new_dest.exists() {
        plan.actions.push(rename(false));
        return;
    }

    // Destination occupied by a different file.
    let new_key = ctx.validator.comparison_key(&new_dest);
    let tracked_by_other = ctx.mappings.iter().enumerate().any(|(i, m)| {
        i != slot && ctx.validator.comparison_key(&m.dest_abspath) == new_key
    });
    if tracked_by_other {
        plan.conflicts.push(Conflict {
            source_relpath: entry.path.clone(),
            dest: Some(new_dest),
            reason: ConflictReason::RenameDestTracked,
            detail: format!("rename target of {old_path} is already tracked"),
        });
    } else if ctx.options.overwrite_with_backup {
        plan.actions.push(rename(true));
    } else {
        plan.conflicts.push(Conflict {
            source_relpath: entry.path.clone(),
            dest: Some(new_dest),
            reason: ConflictReason::RenameDestExists,
            detail: format!("rename target of {old_path} exists and is untracked"),
        });
    }
}

fn classify_new_artifact(
    plan: &mut Plan,
    ctx: &ClassifyContext<'_>,
    source_relpath: &str,
    status: char,
) {
    if !ctx.options.auto_import_new {
        plan.new_artifacts.push(source_relpath.to_string());
        return;
    }

    let dest = dest_from_source_relpath(source_relpath, ctx.install_root);
    let dest = match ctx.validator.validate(&dest) {
        Ok(dest) => dest,
        Err(e) => {
            push_unsafe(plan, source_relpath, &dest, e);
            return;
        }
    };
    if dest.exists() {
        plan.conflicts.push(Conflict {
            source_relpath: source_relpath.to_string(),
            dest: Some(dest),
            reason: ConflictReason::NewDestExists,
            detail: "new upstream artifact collides with an existing local file".into(),
        });
        return;
    }
    plan.actions.push(PlannedAction {
        source_relpath: source_relpath.to_string(),
        dest: dest.clone(),
        status,
        needs_backup: false,
        kind: ActionKind::Create {
            mapping: ArtifactMapping {
                kind: ArtifactKind::AutoImported,
                source_relpath: source_relpath.to_string(),
                dest_abspath: dest,
                last_import_hash: None,
                last_import_time: Some(now_iso8601()),
                file_mode: None,
                is_directory: false,
            },
        },
    });
}

fn push_unsafe(
    plan: &mut Plan,
    source_relpath: &str,
    dest: &Path,
    error: graft_core::error::PathSafetyError,
) {
    warn!(path = %dest.display(), error = %error, "destination failed path validation");
    plan.conflicts.push(Conflict {
        source_relpath: source_relpath.to_string(),
        dest: Some(dest.to_path_buf()),
        reason: ConflictReason::PathUnsafe,
        detail: error.to_string(),
    });
}

enum LocalState {
    Clean,
    Modified,
    Missing,
}

fn local_state(mapping: &ArtifactMapping, dest: &Path) -> LocalState {
    let Some(current) = try_hash_file(dest) else {
        return LocalState::Missing;
    };
    match &mapping.last_import_hash {
        // Legacy record with no hash: nothing to compare against.
        None => LocalState::Clean,
        Some(expected) if *expected == current => LocalState::Clean,
        Some(_) => LocalState::Modified,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graft_core::hash::hash_string;
    use graft_core::paths::FsCaseSensitivity;
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        root: PathBuf,
        validator: PathValidator,
        mappings: Vec<ArtifactMapping>,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join(".graft");
        fs::create_dir_all(root.join("commands")).unwrap();
        fs::create_dir_all(root.join("agents")).unwrap();
        let validator = PathValidator::new(&root, FsCaseSensitivity::Sensitive).unwrap();
        Fixture {
            _dir: dir,
            root,
            validator,
            mappings: Vec::new(),
        }
    }

    impl Fixture {
        fn track(&mut self, source_relpath: &str, rel_dest: &str, content: Option<&str>) {
            let dest = self.root.join(rel_dest);
            let hash = content.map(|c| {
                fs::write(&dest, c).unwrap();
                hash_string(c)
            });
            self.mappings.push(ArtifactMapping {
                kind: ArtifactKind::Command,
                source_relpath: source_relpath.into(),
                dest_abspath: dest,
                last_import_hash: hash,
                last_import_time: None,
                file_mode: None,
                is_directory: false,
            });
        }

        fn ctx(&self, options: ClassifyOptions) -> ClassifyContext<'_> {
            ClassifyContext {
                mappings: &self.mappings,
                install_root: &self.root,
                validator: &self.validator,
                options,
            }
        }
    }

    #[test]
    fn clean_modification_is_planned() {
        let mut fx = fixture();
        fx.track(".graft/commands/x.md", "commands/x.md", Some("v1"));

        let plan = classify(
            &[DiffEntry::modified(".graft/commands/x.md")],
            &fx.ctx(ClassifyOptions::default()),
        );

        assert_eq!(plan.actions.len(), 1);
        assert!(plan.conflicts.is_empty());
        assert!(!plan.actions[0].needs_backup);
    }

    #[test]
    fn locally_modified_file_conflicts() {
        let mut fx = fixture();
        fx.track(".graft/commands/x.md", "commands/x.md", Some("v1"));
        fs::write(fx.root.join("commands/x.md"), "edited locally").unwrap();

        let plan = classify(
            &[DiffEntry::modified(".graft/commands/x.md")],
            &fx.ctx(ClassifyOptions::default()),
        );

        assert!(plan.actions.is_empty());
        assert_eq!(plan.conflicts[0].reason, ConflictReason::LocalModified);
    }

    #[test]
    fn overwrite_flag_downgrades_local_modification_to_backup() {
        let mut fx = fixture();
        fx.track(".graft/commands/x.md", "commands/x.md", Some("v1"));
        fs::write(fx.root.join("commands/x.md"), "edited locally").unwrap();

        let plan = classify(
            &[DiffEntry::modified(".graft/commands/x.md")],
            &fx.ctx(ClassifyOptions {
                overwrite_with_backup: true,
                ..Default::default()
            }),
        );

        assert!(plan.conflicts.is_empty());
        assert!(plan.actions[0].needs_backup);
    }

    #[test]
    fn missing_destination_is_recreated_not_conflicting() {
        let mut fx = fixture();
        fx.track(".graft/commands/x.md", "commands/x.md", Some("v1"));
        fs::remove_file(fx.root.join("commands/x.md")).unwrap();

        let plan = classify(
            &[DiffEntry::modified(".graft/commands/x.md")],
            &fx.ctx(ClassifyOptions::default()),
        );

        assert_eq!(plan.actions.len(), 1);
        assert!(plan.conflicts.is_empty());
    }

    #[test]
    fn mapping_without_hash_is_treated_as_clean() {
        let mut fx = fixture();
        fx.track(".graft/commands/x.md", "commands/x.md", Some("v1"));
        fx.mappings[0].last_import_hash = None;
        fs::write(fx.root.join("commands/x.md"), "anything at all").unwrap();

        let plan = classify(
            &[DiffEntry::modified(".graft/commands/x.md")],
            &fx.ctx(ClassifyOptions::default()),
        );

        assert_eq!(plan.actions.len(), 1);
        assert!(plan.conflicts.is_empty());
    }

    #[test]
    fn untracked_modification_behaves_like_addition() {
        let fx = fixture();

        let plan = classify(
            &[DiffEntry::modified(".graft/commands/new.md")],
            &fx.ctx(ClassifyOptions::default()),
        );

        assert_eq!(plan.new_artifacts, vec![".graft/commands/new.md"]);
        assert!(plan.actions.is_empty());
    }

    #[test]
    fn auto_import_plans_new_artifact_with_mapping() {
        let fx = fixture();

        let plan = classify(
            &[DiffEntry::added(".graft/agents/helper.md")],
            &fx.ctx(ClassifyOptions {
                auto_import_new: true,
                ..Default::default()
            }),
        );

        let action = &plan.actions[0];
        assert_eq!(action.dest, fx.root.join("agents/helper.md"));
        match &action.kind {
            ActionKind::Create { mapping } => {
                assert_eq!(mapping.kind, ArtifactKind::AutoImported);
            }
            other => panic!("expected Create, got {other:?}"),
        }
    }

    #[test]
    fn auto_import_collision_conflicts() {
        let fx = fixture();
        fs::write(fx.root.join("agents/helper.md"), "mine").unwrap();

        let plan = classify(
            &[DiffEntry::added(".graft/agents/helper.md")],
            &fx.ctx(ClassifyOptions {
                auto_import_new: true,
                ..Default::default()
            }),
        );

        assert_eq!(plan.conflicts[0].reason, ConflictReason::NewDestExists);
    }

    #[test]
    fn rename_dest_follows_new_source_structure() {
        let mut fx = fixture();
        fx.track(".graft/commands/x.md", "commands/x.md", Some("v1"));

        let plan = classify(
            &[DiffEntry::renamed(
                ".graft/commands/x.md",
                ".graft/agents/x.md",
            )],
            &fx.ctx(ClassifyOptions::default()),
        );

        let action = &plan.actions[0];
        assert_eq!(action.dest, fx.root.join("agents/x.md"));
        match &action.kind {
            ActionKind::Rename { old_dest, case_only, .. } => {
                assert_eq!(*old_dest, fx.root.join("commands/x.md"));
                assert!(!case_only);
            }
            other => panic!("expected Rename, got {other:?}"),
        }
    }

    #[test]
    fn rename_of_locally_modified_file_conflicts() {
        let mut fx = fixture();
        fx.track(".graft/commands/x.md", "commands/x.md", Some("v1"));
        fs::write(fx.root.join("commands/x.md"), "edited").unwrap();

        let plan = classify(
            &[DiffEntry::renamed(
                ".graft/commands/x.md",
                ".graft/agents/x.md",
            )],
            &fx.ctx(ClassifyOptions::default()),
        );

        assert_eq!(plan.conflicts[0].reason, ConflictReason::RenameLocalModified);
    }

    #[test]
    fn rename_onto_tracked_destination_conflicts() {
        let mut fx = fixture();
        fx.track(".graft/commands/x.md", "commands/x.md", Some("v1"));
        fx.track(".graft/agents/x.md", "agents/x.md", Some("other"));

        let plan = classify(
            &[DiffEntry::renamed(
                ".graft/commands/x.md",
                ".graft/agents/x.md",
            )],
            &fx.ctx(ClassifyOptions::default()),
        );

        assert_eq!(plan.conflicts[0].reason, ConflictReason::RenameDestTracked);
    }

    #[test]
    fn rename_onto_untracked_file_conflicts_without_overwrite() {
        let mut fx = fixture();
        fx.track(".graft/commands/x.md", "commands/x.md", Some("v1"));
        fs::write(fx.root.join("agents/x.md"), "untracked bystander").unwrap();

        let plan = classify(
            &[DiffEntry::renamed(
                ".graft/commands/x.md",
                ".graft/agents/x.md",
            )],
            &fx.ctx(ClassifyOptions::default()),
        );
        assert_eq!(plan.conflicts[0].reason, ConflictReason::RenameDestExists);

        let plan = classify(
            &[DiffEntry::renamed(
                ".graft/commands/x.md",
                ".graft/agents/x.md",
            )],
            &fx.ctx(ClassifyOptions {
                overwrite_with_backup: true,
                ..Default::default()
            }),
        );
        assert!(plan.conflicts.is_empty());
        assert!(plan.actions[0].needs_backup);
    }

    #[test]
    fn case_only_rename_is_detected_on_insensitive_fs() {
        let mut fx = fixture();
        fx.track(".graft/commands/Readme.md", "commands/Readme.md", Some("v1"));
        fx.validator = PathValidator::new(&fx.root, FsCaseSensitivity::Insensitive).unwrap();

        let plan = classify(
            &[DiffEntry::renamed(
                ".graft/commands/Readme.md",
                ".graft/commands/readme.md",
            )],
            &fx.ctx(ClassifyOptions::default()),
        );

        match &plan.actions[0].kind {
            ActionKind::Rename { case_only, .. } => assert!(case_only),
            other => panic!("expected Rename, got {other:?}"),
        }
    }

    #[test]
    fn rename_of_untracked_source_is_plain_addition() {
        let fx = fixture();

        let plan = classify(
            &[DiffEntry::renamed(".graft/commands/a.md", ".graft/commands/b.md")],
            &fx.ctx(ClassifyOptions::default()),
        );

        assert_eq!(plan.new_artifacts, vec![".graft/commands/b.md"]);
    }

    #[test]
    fn delete_policies_route_correctly() {
        for (policy, deletions, conflicts, skipped, backup) in [
            (DeletePolicy::Hard, 1, 0, 0, false),
            (DeletePolicy::Soft, 1, 0, 0, true),
            (DeletePolicy::Skip, 0, 0, 1, false),
            (DeletePolicy::Ask, 1, 0, 0, false),
        ] {
            let mut fx = fixture();
            fx.track(".graft/commands/x.md", "commands/x.md", Some("v1"));

            let plan = classify(
                &[DiffEntry::deleted(".graft/commands/x.md")],
                &fx.ctx(ClassifyOptions {
                    delete_policy: policy,
                    ..Default::default()
                }),
            );

            assert_eq!(plan.deletions.len(), deletions, "{policy}");
            assert_eq!(plan.conflicts.len(), conflicts, "{policy}");
            assert_eq!(plan.skipped.len(), skipped, "{policy}");
            if deletions > 0 {
                assert_eq!(plan.deletions[0].needs_backup, backup, "{policy}");
            }
        }
    }

    #[test]
    fn ask_policy_keeps_locally_modified_deletion() {
        let mut fx = fixture();
        fx.track(".graft/commands/x.md", "commands/x.md", Some("v1"));
        fs::write(fx.root.join("commands/x.md"), "edited").unwrap();

        let plan = classify(
            &[DiffEntry::deleted(".graft/commands/x.md")],
            &fx.ctx(ClassifyOptions {
                delete_policy: DeletePolicy::Ask,
                ..Default::default()
            }),
        );

        assert!(plan.deletions.is_empty());
        assert_eq!(
            plan.conflicts[0].reason,
            ConflictReason::DeletedUpstreamKeptLocal
        );
    }

    #[test]
    fn unsafe_destination_overrides_other_verdicts() {
        let mut fx = fixture();
        fx.track(".graft/commands/x.md", "commands/x.md", Some("v1"));
        fx.mappings[0].dest_abspath = fx.root.join("../escape.md");

        let plan = classify(
            &[DiffEntry::modified(".graft/commands/x.md")],
            &fx.ctx(ClassifyOptions::default()),
        );

        assert!(plan.actions.is_empty());
        assert_eq!(plan.conflicts[0].reason, ConflictReason::PathUnsafe);
    }

    #[test]
    fn typechange_always_backs_up() {
        let mut fx = fixture();
        fx.track(".graft/commands/x.md", "commands/x.md", Some("v1"));

        let plan = classify(
            &[DiffEntry::type_changed(".graft/commands/x.md")],
            &fx.ctx(ClassifyOptions::default()),
        );

        assert!(plan.actions[0].needs_backup);
        assert_eq!(plan.actions[0].status, 'T');
    }

    #[test]
    fn unmerged_entries_are_skipped() {
        let fx = fixture();
        let entry = DiffEntry {
            path: ".graft/commands/x.md".into(),
            status: ChangeStatus::Unmerged,
        };

        let plan = classify(&[entry], &fx.ctx(ClassifyOptions::default()));

        assert_eq!(plan.skipped.len(), 1);
        assert_eq!(plan.skipped[0].status, 'U');
    }
}
