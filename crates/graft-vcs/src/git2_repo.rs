use crate::diff::{ChangeStatus, CommitInfo, DiffEntry};
use crate::repo::GitRepository;
use git2::{DiffFindOptions, DiffFormat, DiffOptions, Oid, Repository};
use graft_core::error::VcsError;
use std::path::Path;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// `git2`-backed implementation of [`GitRepository`].
#[derive(Debug, Default, Clone, Copy)]
pub struct Git2Repository;

impl Git2Repository {
    fn open_repo(repo_root: &Path) -> Result<Repository, VcsError> {
        Repository::open(repo_root).map_err(|_| VcsError::NotGitRepo {
            path: repo_root.display().to_string(),
        })
    }

    fn rev_to_oid(repo: &Repository, rev: &str) -> Result<Oid, VcsError> {
        repo.revparse_single(rev)
            .map(|obj| obj.id())
            .map_err(|e| VcsError::GitError(format!("failed to resolve revision `{rev}`: {e}")))
    }

    fn tree_diff<'r>(
        repo: &'r Repository,
        from: &str,
        to: &str,
        opts: &mut DiffOptions,
    ) -> Result<git2::Diff<'r>, VcsError> {
        let from_tree = repo
            .revparse_single(from)
            .and_then(|o| o.peel_to_commit())
            .and_then(|c| c.tree())
            .map_err(|e| VcsError::GitError(format!("failed to load tree for `{from}`: {e}")))?;
        let to_tree = repo
            .revparse_single(to)
            .and_then(|o| o.peel_to_commit())
            .and_then(|c| c.tree())
            .map_err(|e| VcsError::GitError(format!("failed to load tree for `{to}`: {e}")))?;
        repo.diff_tree_to_tree(Some(&from_tree), Some(&to_tree), Some(opts))
            .map_err(|e| VcsError::GitError(format!("failed to compute diff: {e}")))
    }
}

impl GitRepository for Git2Repository {
    fn resolve_rev(&self, repo_root: &Path, rev: &str) -> Result<String, VcsError> {
        let repo = Self::open_repo(repo_root)?;
        Self::rev_to_oid(&repo, rev).map(|oid| oid.to_string())
    }

    fn head(&self, repo_root: &Path) -> Result<String, VcsError> {
        let repo = Self::open_repo(repo_root)?;
        let commit = repo
            .head()
            .and_then(|h| h.peel_to_commit())
            .map_err(|e| VcsError::GitError(format!("failed to resolve HEAD: {e}")))?;
        Ok(commit.id().to_string())
    }

    fn remote_head(&self, repo_root: &Path, import_ref: Option<&str>) -> Result<String, VcsError> {
        let repo = Self::open_repo(repo_root)?;

        if let Some(r) = import_ref {
            // Pinned ref: remote-tracking branch first, then a literal rev
            // (tags and commit ids land here).
            for candidate in [format!("origin/{r}"), r.to_string()] {
                if let Ok(obj) = repo.revparse_single(&candidate)
                    && let Ok(commit) = obj.peel_to_commit()
                {
                    return Ok(commit.id().to_string());
                }
            }
            return Err(VcsError::RemoteHeadUnresolved {
                import_ref: Some(r.to_string()),
            });
        }

        // Auto-detect the remote default branch.
        if let Ok(reference) = repo.find_reference("refs/remotes/origin/HEAD")
            && let Ok(resolved) = reference.resolve()
            && let Ok(commit) = resolved.peel_to_commit()
        {
            return Ok(commit.id().to_string());
        }

        for fallback in ["origin/main", "origin/master", "origin/develop"] {
            if let Ok(obj) = repo.revparse_single(fallback)
                && let Ok(commit) = obj.peel_to_commit()
            {
                return Ok(commit.id().to_string());
            }
        }

        Err(VcsError::RemoteHeadUnresolved { import_ref: None })
    }

    fn commit_exists(&self, repo_root: &Path, commit: &str) -> Result<bool, VcsError> {
        let repo = Self::open_repo(repo_root)?;
        Ok(repo
            .revparse_single(commit)
            .and_then(|obj| obj.peel_to_commit())
            .is_ok())
    }

    fn merge_base(&self, repo_root: &Path, a: &str, b: &str) -> Result<Option<String>, VcsError> {
        let repo = Self::open_repo(repo_root)?;
        let oid_a = Self::rev_to_oid(&repo, a)?;
        let oid_b = Self::rev_to_oid(&repo, b)?;
        match repo.merge_base(oid_a, oid_b) {
            Ok(base) => Ok(Some(base.to_string())),
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
            Err(e) => Err(VcsError::GitError(format!(
                "failed to compute merge base: {e}"
            ))),
        }
    }

    fn is_ancestor(
        &self,
        repo_root: &Path,
        ancestor: &str,
        descendant: &str,
    ) -> Result<bool, VcsError> {
        let repo = Self::open_repo(repo_root)?;
        let ancestor_oid = Self::rev_to_oid(&repo, ancestor)?;
        let descendant_oid = Self::rev_to_oid(&repo, descendant)?;
        // graph_descendant_of is strict; a commit is its own ancestor here,
        // matching `git merge-base --is-ancestor`.
        if ancestor_oid == descendant_oid {
            return Ok(true);
        }
        repo.graph_descendant_of(descendant_oid, ancestor_oid)
            .map_err(|e| VcsError::GitError(format!("failed to evaluate ancestry: {e}")))
    }

    fn diff_name_status(
        &self,
        repo_root: &Path,
        from: &str,
        to: &str,
    ) -> Result<Vec<DiffEntry>, VcsError> {
        let repo = Self::open_repo(repo_root)?;
        let mut diff_opts = DiffOptions::new();
        diff_opts.include_typechange(true).include_untracked(false);
        let mut diff = Self::tree_diff(&repo, from, to, &mut diff_opts)?;

        let mut find_opts = DiffFindOptions::new();
        find_opts.renames(true).copies(true);
        diff.find_similar(Some(&mut find_opts))
            .map_err(|e| VcsError::GitError(format!("failed to detect renames: {e}")))?;

        let mut out = Vec::new();
        for delta in diff.deltas() {
            let old_path = delta
                .old_file()
                .path()
                .map(|p| p.to_string_lossy().to_string());
            let new_path = delta
                .new_file()
                .path()
                .map(|p| p.to_string_lossy().to_string());

            match delta.status() {
                git2::Delta::Added => {
                    if let Some(path) = new_path {
                        out.push(DiffEntry::added(path));
                    }
                }
                git2::Delta::Deleted => {
                    if let Some(path) = old_path {
                        out.push(DiffEntry::deleted(path));
                    }
                }
                git2::Delta::Renamed => {
                    if let (Some(old_path), Some(new_path)) = (old_path, new_path) {
                        out.push(DiffEntry::renamed(old_path, new_path));
                    }
                }
                git2::Delta::Copied => {
                    if let (Some(old_path), Some(new_path)) = (old_path, new_path) {
                        out.push(DiffEntry::copied(old_path, new_path));
                    }
                }
                git2::Delta::Typechange => {
                    if let Some(path) = new_path.or(old_path) {
                        out.push(DiffEntry::type_changed(path));
                    }
                }
                git2::Delta::Conflicted => {
                    if let Some(path) = new_path.or(old_path) {
                        out.push(DiffEntry {
                            path,
                            status: ChangeStatus::Unmerged,
                        });
                    }
                }
                git2::Delta::Unreadable => {
                    if let Some(path) = new_path.or(old_path) {
                        out.push(DiffEntry {
                            path,
                            status: ChangeStatus::Broken,
                        });
                    }
                }
                _ => {
                    if let Some(path) = new_path.or(old_path) {
                        out.push(DiffEntry::modified(path));
                    }
                }
            }
        }
        Ok(out)
    }

    fn file_diff(
        &self,
        repo_root: &Path,
        from: &str,
        to: &str,
        path: &str,
    ) -> Result<Option<String>, VcsError> {
        let repo = Self::open_repo(repo_root)?;
        let mut diff_opts = DiffOptions::new();
        diff_opts.pathspec(path);
        let diff = Self::tree_diff(&repo, from, to, &mut diff_opts)?;

        if diff.deltas().len() == 0 {
            return Ok(None);
        }
        if diff
            .deltas()
            .any(|d| d.flags().contains(git2::DiffFlags::BINARY))
        {
            return Ok(Some(format!("Binary file changed: {path}")));
        }

        let mut text = String::new();
        diff.print(DiffFormat::Patch, |_delta, _hunk, line| {
            let origin = line.origin();
            if matches!(origin, '+' | '-' | ' ') {
                text.push(origin);
            }
            text.push_str(&String::from_utf8_lossy(line.content()));
            true
        })
        .map_err(|e| VcsError::GitError(format!("failed to render diff for `{path}`: {e}")))?;

        if text.is_empty() {
            Ok(None)
        } else {
            Ok(Some(text))
        }
    }

    fn commit_log(
        &self,
        repo_root: &Path,
        from: &str,
        to: &str,
    ) -> Result<Vec<CommitInfo>, VcsError> {
        let repo = Self::open_repo(repo_root)?;
        let from_oid = Self::rev_to_oid(&repo, from)?;
        let to_oid = Self::rev_to_oid(&repo, to)?;

        let mut walk = repo
            .revwalk()
            .map_err(|e| VcsError::GitError(format!("failed to start revwalk: {e}")))?;
        walk.push(to_oid)
            .map_err(|e| VcsError::GitError(format!("failed to push revwalk head: {e}")))?;
        walk.hide(from_oid)
            .map_err(|e| VcsError::GitError(format!("failed to hide revwalk base: {e}")))?;

        let mut commits = Vec::new();
        for oid in walk {
            let oid = oid.map_err(|e| VcsError::GitError(format!("revwalk failed: {e}")))?;
            let commit = repo
                .find_commit(oid)
                .map_err(|e| VcsError::GitError(format!("failed to load commit {oid}: {e}")))?;
            let author = commit.author();
            let date = OffsetDateTime::from_unix_timestamp(commit.time().seconds())
                .ok()
                .and_then(|t| t.format(&Rfc3339).ok())
                .unwrap_or_default();
            commits.push(CommitInfo {
                sha: oid.to_string(),
                author: author.name().unwrap_or("").to_string(),
                email: author.email().unwrap_or("").to_string(),
                date,
                summary: commit.summary().unwrap_or("").to_string(),
            });
        }
        Ok(commits)
    }

    fn checkout(&self, repo_root: &Path, commit: &str) -> Result<(), VcsError> {
        let repo = Self::open_repo(repo_root)?;
        let oid = Self::rev_to_oid(&repo, commit)?;
        repo.set_head_detached(oid)
            .map_err(|e| VcsError::GitError(format!("failed to detach HEAD at {commit}: {e}")))?;
        let mut builder = git2::build::CheckoutBuilder::new();
        builder.force();
        repo.checkout_head(Some(&mut builder))
            .map_err(|e| VcsError::GitError(format!("failed to check out {commit}: {e}")))
    }

    fn clone_repo(&self, source: &str, dest: &Path) -> Result<(), VcsError> {
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| VcsError::GitError(format!("failed to create clone parent: {e}")))?;
        }
        git2::build::RepoBuilder::new()
            .clone(source, dest)
            .map(|_| ())
            .map_err(|e| VcsError::CloneFailed {
                url: source.to_string(),
                attempts: 1,
                reason: e.to_string(),
            })
    }

    fn fetch(&self, repo_root: &Path, source: Option<&str>) -> Result<(), VcsError> {
        let repo = Self::open_repo(repo_root)?;
        let result = match source {
            Some(src) => repo
                .remote_anonymous(src)
                .and_then(|mut remote| {
                    remote.fetch(
                        &["+refs/heads/*:refs/remotes/origin/*"],
                        None,
                        None,
                    )
                }),
            None => repo
                .find_remote("origin")
                .and_then(|mut remote| remote.fetch(&[] as &[&str], None, None)),
        };
        result.map_err(|e| VcsError::FetchFailed {
            path: repo_root.display().to_string(),
            attempts: 1,
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig() -> git2::Signature<'static> {
        git2::Signature::now("test", "test@example.com").unwrap()
    }

    fn commit_all(repo: &Repository, message: &str) -> Oid {
        let mut index = repo.index().unwrap();
        index
            .add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)
            .unwrap();
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let parents: Vec<git2::Commit> = repo
            .head()
            .ok()
            .and_then(|h| h.peel_to_commit().ok())
            .into_iter()
            .collect();
        let parent_refs: Vec<&git2::Commit> = parents.iter().collect();
        repo.commit(Some("HEAD"), &sig(), &sig(), message, &tree, &parent_refs)
            .unwrap()
    }

    fn init_repo(dir: &Path) -> Repository {
        let repo = Repository::init(dir).unwrap();
        std::fs::create_dir_all(dir.join(".graft/commands")).unwrap();
        std::fs::write(dir.join(".graft/commands/x.md"), "command body\n").unwrap();
        commit_all(&repo, "initial");
        repo
    }

    #[test]
    fn head_and_resolve_rev_agree() {
        let dir = tempfile::tempdir().unwrap();
        let _repo = init_repo(dir.path());
        let vcs = Git2Repository;
        let head = vcs.head(dir.path()).unwrap();
        assert_eq!(vcs.resolve_rev(dir.path(), "HEAD").unwrap(), head);
        assert!(vcs.commit_exists(dir.path(), &head).unwrap());
        assert!(!vcs.commit_exists(dir.path(), &"0".repeat(40)).unwrap());
    }

    #[test]
    fn diff_name_status_covers_add_modify_delete_rename() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init_repo(dir.path());
        std::fs::write(dir.path().join(".graft/commands/keep.md"), "keep\n").unwrap();
        commit_all(&repo, "add keep");
        let base = repo.head().unwrap().peel_to_commit().unwrap().id();

        // Rename x.md across directories, modify keep.md, add fresh.md.
        std::fs::create_dir_all(dir.path().join(".graft/agents")).unwrap();
        std::fs::rename(
            dir.path().join(".graft/commands/x.md"),
            dir.path().join(".graft/agents/y.md"),
        )
        .unwrap();
        std::fs::write(dir.path().join(".graft/commands/keep.md"), "keep v2\n").unwrap();
        std::fs::write(dir.path().join(".graft/commands/fresh.md"), "fresh\n").unwrap();
        {
            let mut index = repo.index().unwrap();
            index
                .remove_path(Path::new(".graft/commands/x.md"))
                .unwrap();
            index.write().unwrap();
        }
        commit_all(&repo, "restructure");
        let head = repo.head().unwrap().peel_to_commit().unwrap().id();

        let vcs = Git2Repository;
        let entries = vcs
            .diff_name_status(dir.path(), &base.to_string(), &head.to_string())
            .unwrap();

        assert!(entries.iter().any(|e| {
            e.path == ".graft/agents/y.md"
                && matches!(&e.status, ChangeStatus::Renamed { old_path, .. }
                    if old_path == ".graft/commands/x.md")
        }));
        assert!(
            entries
                .iter()
                .any(|e| e.path == ".graft/commands/keep.md"
                    && e.status == ChangeStatus::Modified)
        );
        assert!(
            entries
                .iter()
                .any(|e| e.path == ".graft/commands/fresh.md" && e.status == ChangeStatus::Added)
        );
    }

    #[test]
    fn is_ancestor_includes_identity() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init_repo(dir.path());
        let first = repo.head().unwrap().peel_to_commit().unwrap().id();
        std::fs::write(dir.path().join(".graft/commands/x.md"), "v2\n").unwrap();
        commit_all(&repo, "second");
        let second = repo.head().unwrap().peel_to_commit().unwrap().id();

        let vcs = Git2Repository;
        assert!(
            vcs.is_ancestor(dir.path(), &first.to_string(), &second.to_string())
                .unwrap()
        );
        assert!(
            vcs.is_ancestor(dir.path(), &first.to_string(), &first.to_string())
                .unwrap()
        );
        assert!(
            !vcs.is_ancestor(dir.path(), &second.to_string(), &first.to_string())
                .unwrap()
        );
    }

    #[test]
    fn merge_base_of_diverged_branches_is_fork_point() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init_repo(dir.path());
        let fork = repo.head().unwrap().peel_to_commit().unwrap();
        repo.branch("upstream", &fork, false).unwrap();

        std::fs::write(dir.path().join(".graft/commands/x.md"), "local\n").unwrap();
        commit_all(&repo, "local change");

        std::fs::write(dir.path().join("other.md"), "upstream\n").unwrap();
        let mut index = repo.index().unwrap();
        index.add_path(Path::new("other.md")).unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        repo.commit(
            Some("refs/heads/upstream"),
            &sig(),
            &sig(),
            "upstream change",
            &tree,
            &[&fork],
        )
        .unwrap();

        let vcs = Git2Repository;
        let base = vcs
            .merge_base(dir.path(), "HEAD", "refs/heads/upstream")
            .unwrap();
        assert_eq!(base, Some(fork.id().to_string()));
    }

    #[test]
    fn commit_log_returns_range_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init_repo(dir.path());
        let base = repo.head().unwrap().peel_to_commit().unwrap().id();
        std::fs::write(dir.path().join("a.md"), "a\n").unwrap();
        commit_all(&repo, "add a");
        std::fs::write(dir.path().join("b.md"), "b\n").unwrap();
        commit_all(&repo, "add b");
        let head = repo.head().unwrap().peel_to_commit().unwrap().id();

        let vcs = Git2Repository;
        let log = vcs
            .commit_log(dir.path(), &base.to_string(), &head.to_string())
            .unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].summary, "add b");
        assert_eq!(log[1].summary, "add a");
        assert_eq!(log[0].author, "test");
    }

    #[test]
    fn file_diff_reports_changed_file_only() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init_repo(dir.path());
        let base = repo.head().unwrap().peel_to_commit().unwrap().id();
        std::fs::write(dir.path().join(".graft/commands/x.md"), "command body v2\n").unwrap();
        commit_all(&repo, "edit");
        let head = repo.head().unwrap().peel_to_commit().unwrap().id();

        let vcs = Git2Repository;
        let diff = vcs
            .file_diff(
                dir.path(),
                &base.to_string(),
                &head.to_string(),
                ".graft/commands/x.md",
            )
            .unwrap()
            .unwrap();
        assert!(diff.contains("+command body v2"));

        let none = vcs
            .file_diff(dir.path(), &base.to_string(), &head.to_string(), "missing.md")
            .unwrap();
        assert!(none.is_none());
    }

    #[test]
    fn checkout_moves_working_tree_to_commit() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init_repo(dir.path());
        let first = repo.head().unwrap().peel_to_commit().unwrap().id();
        std::fs::write(dir.path().join(".graft/commands/x.md"), "newer\n").unwrap();
        commit_all(&repo, "newer");

        let vcs = Git2Repository;
        vcs.checkout(dir.path(), &first.to_string()).unwrap();
        let content =
            std::fs::read_to_string(dir.path().join(".graft/commands/x.md")).unwrap();
        assert_eq!(content, "command body\n");
    }

    #[test]
    fn clone_and_fetch_from_local_source() {
        let src_dir = tempfile::tempdir().unwrap();
        let src_repo = init_repo(src_dir.path());
        let mirror_parent = tempfile::tempdir().unwrap();
        let mirror = mirror_parent.path().join("mirror");

        let vcs = Git2Repository;
        vcs.clone_repo(&src_dir.path().to_string_lossy(), &mirror)
            .unwrap();
        assert!(mirror.join(".git").exists());

        // New upstream commit is visible after fetch.
        std::fs::write(src_dir.path().join("new.md"), "new\n").unwrap();
        commit_all(&src_repo, "upstream new");
        let upstream_head = src_repo.head().unwrap().peel_to_commit().unwrap().id();

        vcs.fetch(&mirror, Some(&src_dir.path().to_string_lossy()))
            .unwrap();
        assert!(
            vcs.commit_exists(&mirror, &upstream_head.to_string())
                .unwrap()
        );
    }
}
