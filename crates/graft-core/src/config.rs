use crate::constants;
use crate::error::ConfigError;
use crate::types::DeletePolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub update: UpdateConfig,
    #[serde(default)]
    pub locking: LockingConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub fs: FsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateConfig {
    #[serde(default = "default_delete_policy")]
    pub delete_policy: DeletePolicy,
    #[serde(default)]
    pub auto_import_new: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockingConfig {
    #[serde(default = "default_lock_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_lock_poll_ms")]
    pub poll_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FsConfig {
    /// `auto` probes the install root at startup; `sensitive` and
    /// `insensitive` pin the comparison mode for tests and unusual mounts.
    #[serde(default = "default_case_sensitivity")]
    pub case_sensitivity: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_data_dir() -> String {
    format!("~/{}", constants::DEFAULT_DATA_DIR)
}
fn default_delete_policy() -> DeletePolicy {
    DeletePolicy::Ask
}
fn default_lock_timeout_ms() -> u64 {
    constants::LOCK_TIMEOUT_MS
}
fn default_lock_poll_ms() -> u64 {
    constants::LOCK_POLL_MS
}
fn default_max_retries() -> u32 {
    constants::MAX_NETWORK_RETRIES
}
fn default_backoff_base_ms() -> u64 {
    constants::RETRY_BACKOFF_BASE_MS
}
fn default_case_sensitivity() -> String {
    "auto".into()
}
fn default_log_level() -> String {
    "info".into()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            delete_policy: default_delete_policy(),
            auto_import_new: false,
        }
    }
}

impl Default for LockingConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_lock_timeout_ms(),
            poll_ms: default_lock_poll_ms(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
        }
    }
}

impl Default for FsConfig {
    fn default() -> Self {
        Self {
            case_sensitivity: default_case_sensitivity(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration with layered precedence:
    /// 1. Explicit config file (from `--config` flag, highest priority)
    /// 2. Project config: `<target_repo>/.graft/config.toml`
    /// 3. Global config: `~/.graft/config.toml`
    /// 4. Built-in defaults (lowest priority)
    ///
    /// Only fields explicitly set in a higher-priority file override lower layers.
    pub fn load(target_repo: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_file(target_repo, None)
    }

    pub fn load_with_file(
        target_repo: Option<&Path>,
        config_file: Option<&Path>,
    ) -> Result<Self, ConfigError> {
        let mut merged = toml::Value::Table(toml::map::Map::new());

        if let Some(home) = dirs::home_dir() {
            let global_path = home
                .join(constants::DEFAULT_DATA_DIR)
                .join(constants::CONFIG_FILE);
            if global_path.exists() {
                let raw = load_toml_value(&global_path)?;
                merge_toml_values(&mut merged, &raw);
            }
        }

        if let Some(root) = target_repo {
            let project_path = root.join(constants::PROJECT_CONFIG_FILE);
            if project_path.exists() {
                let raw = load_toml_value(&project_path)?;
                merge_toml_values(&mut merged, &raw);
            }
        }

        if let Some(cf) = config_file {
            if !cf.exists() {
                return Err(ConfigError::NotFound {
                    path: cf.display().to_string(),
                });
            }
            let raw = load_toml_value(cf)?;
            merge_toml_values(&mut merged, &raw);
        }

        let config_str =
            toml::to_string(&merged).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        let mut config: Config =
            toml::from_str(&config_str).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        apply_env_overrides(&mut config);

        match config.fs.case_sensitivity.as_str() {
            "auto" | "sensitive" | "insensitive" => {}
            other => {
                return Err(ConfigError::InvalidValue {
                    field: "fs.case_sensitivity".into(),
                    reason: format!("`{other}` is not one of auto|sensitive|insensitive"),
                });
            }
        }
        if config.locking.poll_ms == 0 {
            config.locking.poll_ms = default_lock_poll_ms();
        }

        config.storage.data_dir = expand_tilde(&config.storage.data_dir);

        Ok(config)
    }

    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(&self.storage.data_dir)
    }

    pub fn registry_path(&self) -> PathBuf {
        self.data_dir().join(constants::REGISTRY_FILE)
    }

    pub fn provenance_dir(&self) -> PathBuf {
        self.data_dir().join(constants::PROVENANCE_DIR)
    }

    pub fn sources_dir(&self) -> PathBuf {
        self.data_dir().join(constants::SOURCES_DIR)
    }
}

fn load_toml_value(path: &Path) -> Result<toml::Value, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    content
        .parse::<toml::Value>()
        .map_err(|e| ConfigError::ParseError(e.to_string()))
}

/// Deep-merge `overlay` into `base`. Only keys present in `overlay` are written.
fn merge_toml_values(base: &mut toml::Value, overlay: &toml::Value) {
    if let (toml::Value::Table(base_map), toml::Value::Table(overlay_map)) = (base, overlay) {
        for (key, overlay_val) in overlay_map {
            if let Some(base_val) = base_map.get_mut(key) {
                if base_val.is_table() && overlay_val.is_table() {
                    merge_toml_values(base_val, overlay_val);
                } else {
                    *base_val = overlay_val.clone();
                }
            } else {
                base_map.insert(key.clone(), overlay_val.clone());
            }
        }
    }
}

/// Environment overrides: `GRAFT_<SECTION>_<KEY>` in UPPER_SNAKE_CASE.
fn apply_env_overrides(config: &mut Config) {
    if let Ok(v) = std::env::var("GRAFT_STORAGE_DATA_DIR") {
        config.storage.data_dir = v;
    }
    if let Ok(v) = std::env::var("GRAFT_LOCKING_TIMEOUT_MS")
        && let Ok(n) = v.parse()
    {
        config.locking.timeout_ms = n;
    }
    if let Ok(v) = std::env::var("GRAFT_UPDATE_DELETE_POLICY")
        && let Some(policy) = DeletePolicy::parse_policy(&v)
    {
        config.update.delete_policy = policy;
    }
    if let Ok(v) = std::env::var("GRAFT_LOGGING_LEVEL") {
        config.logging.level = v;
    }
}

fn expand_tilde(path: &str) -> String {
    if let Some(stripped) = path.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(stripped).to_string_lossy().to_string();
    }
    path.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert_eq!(config.update.delete_policy, DeletePolicy::Ask);
        assert!(!config.update.auto_import_new);
        assert_eq!(config.locking.timeout_ms, constants::LOCK_TIMEOUT_MS);
        assert_eq!(config.network.max_retries, constants::MAX_NETWORK_RETRIES);
        assert_eq!(config.fs.case_sensitivity, "auto");
    }

    #[test]
    fn explicit_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("config.toml");
        std::fs::write(
            &file,
            "[update]\ndelete_policy = \"soft\"\nauto_import_new = true\n",
        )
        .unwrap();
        let config = Config::load_with_file(None, Some(&file)).unwrap();
        assert_eq!(config.update.delete_policy, DeletePolicy::Soft);
        assert!(config.update.auto_import_new);
        // Untouched sections keep defaults.
        assert_eq!(config.locking.timeout_ms, constants::LOCK_TIMEOUT_MS);
    }

    #[test]
    fn invalid_case_sensitivity_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("config.toml");
        std::fs::write(&file, "[fs]\ncase_sensitivity = \"mixed\"\n").unwrap();
        let err = Config::load_with_file(None, Some(&file)).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let err = Config::load_with_file(None, Some(Path::new("/nonexistent/cfg.toml")))
            .unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }));
    }
}
