use crate::diff::{CommitInfo, DiffEntry};
use graft_core::error::VcsError;
use std::path::Path;

/// Narrow interface over git plumbing.
///
/// The orchestrator only ever talks to this trait, so it can run against
/// an in-memory fake in tests without touching a real repository.
pub trait GitRepository: Send + Sync {
    /// Resolve a revision string to a full commit id.
    fn resolve_rev(&self, repo: &Path, rev: &str) -> Result<String, VcsError>;

    /// Commit id of the repository's current HEAD.
    fn head(&self, repo: &Path) -> Result<String, VcsError>;

    /// Commit id of the remote head. `import_ref` pins a branch/tag;
    /// otherwise the remote default branch is auto-detected.
    fn remote_head(&self, repo: &Path, import_ref: Option<&str>) -> Result<String, VcsError>;

    /// Whether `commit` still exists in the repository. A previously
    /// imported commit that is gone means history was rewritten.
    fn commit_exists(&self, repo: &Path, commit: &str) -> Result<bool, VcsError>;

    /// Nearest common ancestor, `None` when histories are unrelated.
    fn merge_base(&self, repo: &Path, a: &str, b: &str) -> Result<Option<String>, VcsError>;

    fn is_ancestor(&self, repo: &Path, ancestor: &str, descendant: &str)
    -> Result<bool, VcsError>;

    /// Name-status diff between two commits, with rename/copy detection.
    fn diff_name_status(&self, repo: &Path, from: &str, to: &str)
    -> Result<Vec<DiffEntry>, VcsError>;

    /// Patch text for one file between two commits; `None` when the file
    /// did not change in the range.
    fn file_diff(
        &self,
        repo: &Path,
        from: &str,
        to: &str,
        path: &str,
    ) -> Result<Option<String>, VcsError>;

    /// Commits in `from..to`, newest first.
    fn commit_log(&self, repo: &Path, from: &str, to: &str) -> Result<Vec<CommitInfo>, VcsError>;

    /// Check out `commit` into the working tree (detached).
    fn checkout(&self, repo: &Path, commit: &str) -> Result<(), VcsError>;

    /// Clone `source` (URL or local path) to `dest`. Single attempt;
    /// retry policy lives in the mirror layer.
    fn clone_repo(&self, source: &str, dest: &Path) -> Result<(), VcsError>;

    /// Fetch into `repo`. `source` overrides the origin remote (used for
    /// local-path sources); default refspecs update `refs/remotes/origin/*`.
    fn fetch(&self, repo: &Path, source: Option<&str>) -> Result<(), VcsError>;
}
