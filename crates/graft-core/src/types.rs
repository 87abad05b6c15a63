use crate::constants;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

/// Where an integration installs its artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetScope {
    /// User-wide tree under the home directory.
    User,
    /// Tree inside a specific target repository.
    Project,
}

impl TargetScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Project => "project",
        }
    }
}

/// Policy for artifacts deleted upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletePolicy {
    /// Delete and keep a timestamped backup.
    Soft,
    /// Delete unconditionally.
    Hard,
    /// Non-interactive resolution: delete when the on-disk hash matches
    /// the last import, otherwise keep the file and report it as
    /// `deleted_upstream_kept_local`.
    Ask,
    /// Never delete.
    Skip,
}

impl DeletePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Soft => "soft",
            Self::Hard => "hard",
            Self::Ask => "ask",
            Self::Skip => "skip",
        }
    }

    pub fn parse_policy(s: &str) -> Option<Self> {
        match s {
            "soft" => Some(Self::Soft),
            "hard" => Some(Self::Hard),
            "ask" => Some(Self::Ask),
            "skip" => Some(Self::Skip),
            _ => None,
        }
    }
}

impl std::fmt::Display for DeletePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kinds of installable artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Command,
    Agent,
    Skill,
    Hook,
    McpConfig,
    AutoImported,
    #[serde(other)]
    Other,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Command => "command",
            Self::Agent => "agent",
            Self::Skill => "skill",
            Self::Hook => "hook",
            Self::McpConfig => "mcp_config",
            Self::AutoImported => "auto_imported",
            Self::Other => "other",
        }
    }
}

/// Links one source-relative path to its installed destination and the
/// content digest recorded at the last successful apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactMapping {
    #[serde(rename = "type")]
    pub kind: ArtifactKind,
    pub source_relpath: String,
    pub dest_abspath: PathBuf,
    #[serde(default)]
    pub last_import_hash: Option<String>,
    #[serde(default)]
    pub last_import_time: Option<String>,
    #[serde(default)]
    pub file_mode: Option<u32>,
    #[serde(default)]
    pub is_directory: bool,
}

/// One tracked relationship between a source repository and a set of
/// locally installed files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Integration {
    pub id: String,
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub source_path: Option<PathBuf>,
    pub target_scope: TargetScope,
    #[serde(default)]
    pub target_repo_path: Option<PathBuf>,
    #[serde(default)]
    pub import_ref: Option<String>,
    #[serde(default)]
    pub last_import_commit: Option<String>,
    #[serde(default)]
    pub last_checked_commit: Option<String>,
    #[serde(default)]
    pub last_import_time: Option<String>,
    #[serde(default)]
    pub last_check_time: Option<String>,
    #[serde(default)]
    pub force_push_detected: bool,
    #[serde(default)]
    pub markers: Vec<serde_json::Value>,
    #[serde(default)]
    pub artifact_mappings: Vec<ArtifactMapping>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Reference to an integration's upstream source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceRef {
    Url(String),
    LocalPath(PathBuf),
}

impl Integration {
    /// URL takes precedence when both are present, matching the schema's
    /// `source_url|source_path` alternative.
    pub fn source(&self) -> Option<SourceRef> {
        if let Some(url) = &self.source_url {
            return Some(SourceRef::Url(url.clone()));
        }
        self.source_path
            .as_ref()
            .map(|p| SourceRef::LocalPath(p.clone()))
    }

    /// Base path where this integration's artifacts are installed.
    pub fn install_root(&self) -> PathBuf {
        match self.target_scope {
            TargetScope::User => dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(constants::ARTIFACT_TREE_DIR),
            TargetScope::Project => match &self.target_repo_path {
                Some(repo) => repo.join(constants::ARTIFACT_TREE_DIR),
                None => std::env::current_dir()
                    .unwrap_or_else(|_| PathBuf::from("."))
                    .join(constants::ARTIFACT_TREE_DIR),
            },
        }
    }
}

/// Compute an install destination from a source-relative path's own
/// directory structure.
///
/// `.graft/agents/new.md` under `install_root` becomes
/// `<install_root>/agents/new.md`. Keying on the source path's structure
/// (never the old destination's parent) is what makes cross-directory
/// renames land in the right tree.
pub fn dest_from_source_relpath(source_relpath: &str, install_root: &Path) -> PathBuf {
    let source = Path::new(source_relpath);
    let mut components = source.components();
    for component in components.by_ref() {
        if let Component::Normal(name) = component
            && name == constants::ARTIFACT_TREE_DIR
        {
            let rest: PathBuf = components.collect();
            if rest.as_os_str().is_empty() {
                break;
            }
            return install_root.join(rest);
        }
    }
    // Not under the artifact tree: fall back to the file name.
    match source.file_name() {
        Some(name) => install_root.join(name),
        None => install_root.to_path_buf(),
    }
}
