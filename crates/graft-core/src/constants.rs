/// Default data directory name under home.
pub const DEFAULT_DATA_DIR: &str = ".graft";

/// Directory inside a source repository that holds installable artifacts.
pub const ARTIFACT_TREE_DIR: &str = ".graft";

/// Registry file name under the data directory.
pub const REGISTRY_FILE: &str = "registry.json";

/// Per-integration provenance snapshots live here, one JSON file each.
pub const PROVENANCE_DIR: &str = "provenance";

/// Mirror clones of upstream sources live here.
pub const SOURCES_DIR: &str = "sources";

/// Project-scope config file, relative to the target repository root.
pub const PROJECT_CONFIG_FILE: &str = ".graft/config.toml";

/// Global config file name under the data directory.
pub const CONFIG_FILE: &str = "config.toml";

/// Sidecar suffix for advisory lock files.
pub const LOCK_SUFFIX: &str = ".lock";

/// Sidecar suffix for last-known-good backups.
pub const BACKUP_SUFFIX: &str = ".bak";

/// Registry schema version written on save and validated on load.
pub const REGISTRY_SCHEMA_VERSION: u32 = 1;

/// Retries after the first clone/fetch attempt (5 attempts total).
pub const MAX_NETWORK_RETRIES: u32 = 4;

/// Base delay for exponential backoff between network retries.
pub const RETRY_BACKOFF_BASE_MS: u64 = 2_000;

/// Default advisory-lock acquisition timeout.
pub const LOCK_TIMEOUT_MS: u64 = 10_000;

/// Poll interval while waiting for an advisory lock.
pub const LOCK_POLL_MS: u64 = 100;

/// Commit subjects shown per integration in check/apply reports.
pub const COMMIT_LOG_DISPLAY_LIMIT: usize = 5;
