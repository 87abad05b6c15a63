use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("path safety error: {0}")]
    PathSafety(#[from] PathSafetyError),

    #[error("vcs error: {0}")]
    Vcs(#[from] VcsError),

    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    NotFound { path: String },

    #[error("failed to parse config: {0}")]
    ParseError(String),

    #[error("invalid config value: {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the durable single-file store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("lock timeout after {waited_ms}ms: {path}")]
    LockTimeout { path: String, waited_ms: u64 },

    #[error("corrupt file (no usable backup): {path}: {reason}")]
    Corrupt { path: String, reason: String },

    #[error("serialization failed for {path}: {reason}")]
    Serialize { path: String, reason: String },

    #[error("unsupported registry schema version: found {found}, expected {expected}")]
    SchemaVersion { found: u32, expected: u32 },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn corrupt(path: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Corrupt {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn serialize(path: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Serialize {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// A destination path escaped its allowed root or violated symlink policy.
///
/// Never coerced to a "safe" path: the offending item is blocked instead.
#[derive(Error, Debug)]
pub enum PathSafetyError {
    #[error("path traversal detected: {path}")]
    Traversal { path: String },

    #[error("symlink not allowed: {path}")]
    SymlinkNotAllowed { path: String },

    #[error("path `{path}` is outside allowed root `{root}`")]
    OutsideRoot { path: String, root: String },

    #[error("failed to resolve path `{path}`: {reason}")]
    Unresolvable { path: String, reason: String },
}

#[derive(Error, Debug)]
pub enum VcsError {
    #[error("not a git repository: {path}")]
    NotGitRepo { path: String },

    #[error("clone failed after {attempts} attempt(s): {url}: {reason}")]
    CloneFailed {
        url: String,
        attempts: u32,
        reason: String,
    },

    #[error("fetch failed after {attempts} attempt(s): {path}: {reason}")]
    FetchFailed {
        path: String,
        attempts: u32,
        reason: String,
    },

    #[error("could not resolve remote head{}", ref_hint(.import_ref))]
    RemoteHeadUnresolved { import_ref: Option<String> },

    #[error("git error: {0}")]
    GitError(String),
}

fn ref_hint(import_ref: &Option<String>) -> String {
    match import_ref {
        Some(r) => format!(" for ref `{r}`"),
        None => String::new(),
    }
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("transaction failed during {op}: {reason}")]
    Transaction { op: String, reason: String },

    #[error("integration not found: {id}")]
    IntegrationNotFound { id: String },

    #[error("integration has no usable source: {id}")]
    NoSource { id: String },
}

impl EngineError {
    pub fn transaction(op: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Transaction {
            op: op.into(),
            reason: reason.to_string(),
        }
    }
}
