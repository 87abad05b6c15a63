pub mod diff;
pub mod git2_repo;
pub mod history;
pub mod mirror;
pub mod repo;

pub use diff::{ChangeStatus, CommitInfo, DiffEntry};
pub use git2_repo::Git2Repository;
pub use history::{DiffRange, RangeStatus, safe_diff_range};
pub use mirror::MirrorStore;
pub use repo::GitRepository;

#[cfg(test)]
mod tests {
    use super::{Git2Repository, GitRepository};

    #[test]
    fn crate_exports_are_usable() {
        let repo = Git2Repository;
        let temp = tempfile::tempdir().unwrap();
        assert!(repo.head(temp.path()).is_err());
    }
}
