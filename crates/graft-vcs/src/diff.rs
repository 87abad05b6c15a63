use serde::{Deserialize, Serialize};

/// Upstream change kind, covering the full name-status alphabet.
///
/// `Unmerged`, `Unknown`, and `Broken` are never applied; the classifier
/// logs and skips them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeStatus {
    Added,
    Modified,
    Deleted,
    Renamed {
        old_path: String,
        similarity: Option<u8>,
    },
    Copied {
        old_path: String,
        similarity: Option<u8>,
    },
    TypeChanged,
    Unmerged,
    Unknown,
    Broken,
}

impl ChangeStatus {
    /// Raw git status letter for display.
    pub fn letter(&self) -> char {
        match self {
            Self::Added => 'A',
            Self::Modified => 'M',
            Self::Deleted => 'D',
            Self::Renamed { .. } => 'R',
            Self::Copied { .. } => 'C',
            Self::TypeChanged => 'T',
            Self::Unmerged => 'U',
            Self::Unknown => 'X',
            Self::Broken => 'B',
        }
    }
}

/// One entry of a name-status diff. `path` is the post-change path; for
/// renames and copies the pre-change path lives in the status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffEntry {
    pub path: String,
    pub status: ChangeStatus,
}

impl DiffEntry {
    pub fn added(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            status: ChangeStatus::Added,
        }
    }

    pub fn modified(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            status: ChangeStatus::Modified,
        }
    }

    pub fn deleted(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            status: ChangeStatus::Deleted,
        }
    }

    pub fn renamed(old_path: impl Into<String>, new_path: impl Into<String>) -> Self {
        Self {
            path: new_path.into(),
            status: ChangeStatus::Renamed {
                old_path: old_path.into(),
                similarity: None,
            },
        }
    }

    pub fn copied(old_path: impl Into<String>, new_path: impl Into<String>) -> Self {
        Self {
            path: new_path.into(),
            status: ChangeStatus::Copied {
                old_path: old_path.into(),
                similarity: None,
            },
        }
    }

    pub fn type_changed(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            status: ChangeStatus::TypeChanged,
        }
    }
}

/// One commit in a range, for check/apply reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    pub sha: String,
    pub author: String,
    pub email: String,
    pub date: String,
    pub summary: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn letters_match_git_name_status() {
        assert_eq!(DiffEntry::added("a").status.letter(), 'A');
        assert_eq!(DiffEntry::deleted("a").status.letter(), 'D');
        assert_eq!(DiffEntry::renamed("a", "b").status.letter(), 'R');
        assert_eq!(DiffEntry::copied("a", "b").status.letter(), 'C');
        assert_eq!(DiffEntry::type_changed("a").status.letter(), 'T');
    }

    #[test]
    fn renamed_entry_carries_both_paths() {
        let entry = DiffEntry::renamed("commands/x.md", "agents/y.md");
        assert_eq!(entry.path, "agents/y.md");
        match entry.status {
            ChangeStatus::Renamed { old_path, .. } => assert_eq!(old_path, "commands/x.md"),
            other => panic!("unexpected status: {other:?}"),
        }
    }
}
