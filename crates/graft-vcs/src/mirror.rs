use crate::repo::GitRepository;
use graft_core::error::VcsError;
use graft_core::paths::normalize_lenient;
use graft_core::types::SourceRef;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Local mirror clones of upstream sources, one directory per source.
///
/// Sources are mirrored rather than read in place so update checks never
/// disturb a user's own working copy.
#[derive(Debug, Clone)]
pub struct MirrorStore {
    cache_dir: PathBuf,
    max_retries: u32,
    backoff_base_ms: u64,
}

impl MirrorStore {
    pub fn new(cache_dir: impl Into<PathBuf>, max_retries: u32, backoff_base_ms: u64) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            max_retries,
            backoff_base_ms,
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn mirror_path(&self, source: &SourceRef) -> PathBuf {
        self.cache_dir.join(mirror_dir_name(source))
    }

    /// Clone the source on first use, fetch otherwise. Both operations
    /// retry with bounded exponential backoff before failing.
    pub fn ensure_mirror(
        &self,
        vcs: &dyn GitRepository,
        source: &SourceRef,
    ) -> Result<PathBuf, VcsError> {
        let mirror = self.mirror_path(source);
        let source_str = match source {
            SourceRef::Url(url) => url.clone(),
            SourceRef::LocalPath(path) => path.to_string_lossy().to_string(),
        };

        if mirror.join(".git").exists() {
            debug!(mirror = %mirror.display(), "fetching updates");
            let fetch_source = match source {
                // Local sources are fetched by path so new commits in the
                // user's repo are picked up even without a configured remote.
                SourceRef::LocalPath(_) => Some(source_str.as_str()),
                SourceRef::Url(_) => None,
            };
            self.with_retries("fetch", &source_str, |attempts| {
                vcs.fetch(&mirror, fetch_source).map_err(|e| match e {
                    VcsError::FetchFailed { path, reason, .. } => VcsError::FetchFailed {
                        path,
                        attempts,
                        reason,
                    },
                    other => other,
                })
            })?;
        } else {
            debug!(source = %source_str, mirror = %mirror.display(), "cloning source");
            self.with_retries("clone", &source_str, |attempts| {
                // A partial clone from a failed attempt would poison the
                // next one.
                if mirror.exists() {
                    let _ = std::fs::remove_dir_all(&mirror);
                }
                vcs.clone_repo(&source_str, &mirror).map_err(|e| match e {
                    VcsError::CloneFailed { url, reason, .. } => VcsError::CloneFailed {
                        url,
                        attempts,
                        reason,
                    },
                    other => other,
                })
            })?;
        }

        Ok(mirror)
    }

    fn with_retries<F>(&self, op: &str, source: &str, mut attempt: F) -> Result<(), VcsError>
    where
        F: FnMut(u32) -> Result<(), VcsError>,
    {
        let total_attempts = self.max_retries + 1;
        let mut last_err = None;
        for n in 0..total_attempts {
            match attempt(total_attempts) {
                Ok(()) => return Ok(()),
                Err(err) => {
                    if n < self.max_retries {
                        let delay = self.backoff_base_ms.saturating_mul(1 << n);
                        warn!(op, source, attempt = n + 1, delay_ms = delay, error = %err,
                            "network operation failed, retrying");
                        std::thread::sleep(Duration::from_millis(delay));
                    }
                    last_err = Some(err);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| VcsError::GitError(format!("{op} failed: {source}"))))
    }
}

/// Collision-free mirror directory name for a source.
///
/// The hash suffix keeps same-named sources apart: `~/code/foo` and
/// `~/work/foo` get distinct directories, as do forks of one repo name.
pub fn mirror_dir_name(source: &SourceRef) -> String {
    match source {
        SourceRef::Url(url) => {
            let digest = blake3::hash(url.as_bytes());
            let short = &digest.to_hex()[..8];
            match parse_github_ref(url) {
                Some((owner, repo)) => format!("{owner}__{repo}-{short}"),
                None => {
                    let name = url
                        .trim_end_matches('/')
                        .rsplit('/')
                        .next()
                        .unwrap_or("source")
                        .trim_end_matches(".git");
                    format!("{name}-{short}")
                }
            }
        }
        SourceRef::LocalPath(path) => {
            let resolved = normalize_lenient(path).unwrap_or_else(|_| path.clone());
            let digest = blake3::hash(resolved.to_string_lossy().as_bytes());
            let name = resolved
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "source".into());
            format!("local__{name}__{}", &digest.to_hex()[..12])
        }
    }
}

/// Extract `(owner, repo)` from a github.com URL in https or ssh form.
fn parse_github_ref(url: &str) -> Option<(String, String)> {
    let idx = url.find("github.com")?;
    let rest = &url[idx + "github.com".len()..];
    let rest = rest.strip_prefix('/').or_else(|| rest.strip_prefix(':'))?;
    let mut segments = rest.trim_end_matches('/').splitn(2, '/');
    let owner = segments.next()?.to_string();
    let repo = segments
        .next()?
        .trim_end_matches(".git")
        .to_string();
    if owner.is_empty() || repo.is_empty() || repo.contains('/') {
        return None;
    }
    Some((owner, repo))
}
