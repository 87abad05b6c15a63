use crate::error::PathSafetyError;
use std::path::{Component, Path, PathBuf};

/// Effective filesystem case sensitivity for path comparison.
///
/// Carried as an explicit value through the components that compare
/// paths; nothing is cached in module-level state, so tests can pin
/// either mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsCaseSensitivity {
    Sensitive,
    Insensitive,
}

impl FsCaseSensitivity {
    /// Resolve a config-level mode string (`auto` probes `probe_dir`).
    pub fn resolve(mode: &str, probe_dir: &Path) -> Self {
        match mode {
            "sensitive" => Self::Sensitive,
            "insensitive" => Self::Insensitive,
            _ => probe_case_sensitivity(probe_dir),
        }
    }
}

/// Probe whether the filesystem backing `dir` treats names case-sensitively.
///
/// Falls back to sensitive when the probe cannot run (unwritable dir).
pub fn probe_case_sensitivity(dir: &Path) -> FsCaseSensitivity {
    let probe = dir.join("CaSe-ProBe.tmp");
    if std::fs::write(&probe, b"").is_err() {
        return FsCaseSensitivity::Sensitive;
    }
    let twin_exists = dir.join("case-probe.tmp").exists();
    let _ = std::fs::remove_file(&probe);
    if twin_exists {
        FsCaseSensitivity::Insensitive
    } else {
        FsCaseSensitivity::Sensitive
    }
}

/// Normalize a path that may not fully exist yet: canonicalize the longest
/// existing prefix (resolving symlinks), then append the missing tail.
pub fn normalize_lenient(path: &Path) -> Result<PathBuf, PathSafetyError> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(|e| PathSafetyError::Unresolvable {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?
            .join(path)
    };
    if let Ok(canonical) = std::fs::canonicalize(&absolute) {
        return Ok(canonical);
    }

    let mut existing = absolute.as_path();
    let mut missing_components = Vec::new();
    loop {
        if existing.exists() {
            let mut normalized =
                std::fs::canonicalize(existing).unwrap_or_else(|_| existing.to_path_buf());
            for component in missing_components.iter().rev() {
                normalized.push(component);
            }
            return Ok(normalized);
        }
        let Some(name) = existing.file_name() else {
            return Ok(absolute);
        };
        missing_components.push(name.to_os_string());
        let Some(parent) = existing.parent() else {
            return Ok(absolute);
        };
        existing = parent;
    }
}

/// Validates candidate destination paths against an allowed root.
///
/// All paths sourced from persisted registry/provenance data are untrusted
/// input and must pass through here at the moment of use.
#[derive(Debug, Clone)]
pub struct PathValidator {
    root: PathBuf,
    case: FsCaseSensitivity,
    allow_symlinks: bool,
}

impl PathValidator {
    pub fn new(root: &Path, case: FsCaseSensitivity) -> Result<Self, PathSafetyError> {
        Ok(Self {
            root: normalize_lenient(root)?,
            case,
            allow_symlinks: false,
        })
    }

    pub fn allow_symlinks(mut self, allow: bool) -> Self {
        self.allow_symlinks = allow;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn case_sensitivity(&self) -> FsCaseSensitivity {
        self.case
    }

    /// Validate a candidate path; returns the normalized absolute form.
    ///
    /// Rejects literal `..` components before any resolution, rejects a
    /// symlink leaf unless symlinks are permitted, and requires the
    /// resolved path to be a descendant of the resolved root. A permitted
    /// symlink that resolves outside the root is still rejected.
    pub fn validate(&self, candidate: &Path) -> Result<PathBuf, PathSafetyError> {
        if candidate
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(PathSafetyError::Traversal {
                path: candidate.display().to_string(),
            });
        }

        if !self.allow_symlinks
            && let Ok(meta) = std::fs::symlink_metadata(candidate)
            && meta.file_type().is_symlink()
        {
            return Err(PathSafetyError::SymlinkNotAllowed {
                path: candidate.display().to_string(),
            });
        }

        // normalize_lenient resolves symlinks in the existing prefix, so a
        // permitted leaf symlink pointing outside the root fails containment.
        let resolved = normalize_lenient(candidate)?;
        if !self.contains(&resolved) {
            return Err(PathSafetyError::OutsideRoot {
                path: candidate.display().to_string(),
                root: self.root.display().to_string(),
            });
        }
        Ok(resolved)
    }

    fn contains(&self, resolved: &Path) -> bool {
        match self.case {
            FsCaseSensitivity::Sensitive => resolved.starts_with(&self.root),
            FsCaseSensitivity::Insensitive => {
                let root_parts: Vec<String> = self
                    .root
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().to_lowercase())
                    .collect();
                let path_parts: Vec<String> = resolved
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().to_lowercase())
                    .collect();
                path_parts.len() >= root_parts.len()
                    && root_parts.iter().zip(path_parts.iter()).all(|(r, p)| r == p)
            }
        }
    }

    /// Normalized comparison key for a path under this validator's case
    /// mode. Used by the ownership index and case-only rename detection.
    pub fn comparison_key(&self, path: &Path) -> String {
        comparison_key(path, self.case)
    }
}

/// Normalized comparison key for a path: resolved, separator-normalized,
/// lowercased when the filesystem is case-insensitive.
pub fn comparison_key(path: &Path, case: FsCaseSensitivity) -> String {
    let resolved = normalize_lenient(path).unwrap_or_else(|_| path.to_path_buf());
    let s = resolved.to_string_lossy().replace('\\', "/");
    match case {
        FsCaseSensitivity::Sensitive => s,
        FsCaseSensitivity::Insensitive => s.to_lowercase(),
    }
}
