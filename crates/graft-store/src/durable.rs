use crate::lock;
use graft_core::constants;
use graft_core::error::StoreError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Atomic single-file read/write primitive.
///
/// Writers produce a unique temp file in the target's directory, fsync it,
/// and rename over the target, so readers observe either the complete old
/// content or the complete new content. Concurrent writers serialize
/// through the `<file>.lock` advisory lock. Every replacing write first
/// copies the prior valid content to a `.bak` sibling (best-effort), and
/// loads fall back to `.bak` when the main file is malformed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DurableStore {
    lock_timeout_ms: u64,
    lock_poll_ms: u64,
}

impl Default for DurableStore {
    fn default() -> Self {
        Self {
            lock_timeout_ms: constants::LOCK_TIMEOUT_MS,
            lock_poll_ms: constants::LOCK_POLL_MS,
        }
    }
}

impl DurableStore {
    pub fn new(lock_timeout_ms: u64, lock_poll_ms: u64) -> Self {
        Self {
            lock_timeout_ms,
            lock_poll_ms,
        }
    }

    /// Load JSON. `Ok(None)` when the file does not exist; corrupt content
    /// falls back to `.bak`, and only when both fail is it an error.
    ///
    /// No lock is taken: rename-based writers never expose partial files.
    pub fn load_json<T: DeserializeOwned>(&self, path: &Path) -> Result<Option<T>, StoreError> {
        load_json_unlocked(path)
    }

    /// Write JSON atomically with the advisory lock held.
    pub fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> Result<(), StoreError> {
        let _lock = lock::acquire(path, self.lock_timeout_ms, self.lock_poll_ms)?;
        write_json_unlocked(path, value)
    }

    /// Read-modify-write with the lock held for the whole critical
    /// section, so concurrent merges never lose updates.
    pub fn update_json<T, F>(&self, path: &Path, update: F) -> Result<T, StoreError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(Option<T>) -> T,
    {
        let _lock = lock::acquire(path, self.lock_timeout_ms, self.lock_poll_ms)?;
        let current = load_json_unlocked(path)?;
        let next = update(current);
        write_json_unlocked(path, &next)?;
        Ok(next)
    }

    /// Atomic text write. `preserve_mode` restores the original permission
    /// bits after the replace (rename would otherwise reset executables to
    /// umask defaults).
    pub fn write_text(
        &self,
        path: &Path,
        content: &str,
        preserve_mode: bool,
    ) -> Result<(), StoreError> {
        let _lock = lock::acquire(path, self.lock_timeout_ms, self.lock_poll_ms)?;

        let original_perms = if preserve_mode {
            std::fs::metadata(path).ok().map(|m| m.permissions())
        } else {
            None
        };

        backup_if_nonempty(path);
        replace_with_tempfile(path, content.as_bytes())?;

        if let Some(perms) = original_perms {
            let _ = std::fs::set_permissions(path, perms);
        }
        Ok(())
    }
}

fn load_json_unlocked<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    if !path.exists() {
        return Ok(None);
    }
    let bytes = std::fs::read(path)?;
    match serde_json::from_slice(&bytes) {
        Ok(value) => Ok(Some(value)),
        Err(main_err) => {
            let backup = backup_path(path);
            if backup.exists()
                && let Ok(backup_bytes) = std::fs::read(&backup)
                && let Ok(value) = serde_json::from_slice(&backup_bytes)
            {
                warn!(path = %path.display(), "main file corrupt, recovered from backup");
                return Ok(Some(value));
            }
            Err(StoreError::corrupt(path.display().to_string(), main_err))
        }
    }
}

fn write_json_unlocked<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec_pretty(value)
        .map_err(|e| StoreError::serialize(path.display().to_string(), e))?;

    // Back up the previous content only if it still parses: never clobber
    // a good .bak with corrupt bytes.
    if path.exists() && is_valid_json_file(path) {
        if let Err(e) = std::fs::copy(path, backup_path(path)) {
            debug!(path = %path.display(), error = %e, "backup copy failed");
        }
    }

    replace_with_tempfile(path, &bytes)
}

fn replace_with_tempfile(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)?;

    let mut tmp = tempfile::Builder::new()
        .prefix(&format!(
            "{}.",
            path.file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "graft".into())
        ))
        .suffix(".tmp")
        .tempfile_in(parent)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;

    fsync_dir(parent);
    Ok(())
}

/// Best-effort directory fsync so the rename survives a crash.
fn fsync_dir(dir: &Path) {
    #[cfg(unix)]
    {
        if let Ok(handle) = std::fs::File::open(dir) {
            let _ = handle.sync_all();
        }
    }
    #[cfg(not(unix))]
    let _ = dir;
}

fn backup_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    path.with_file_name(format!("{name}{}", constants::BACKUP_SUFFIX))
}

fn backup_if_nonempty(path: &Path) {
    let nonempty = std::fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false);
    if nonempty {
        let _ = std::fs::copy(path, backup_path(path));
    }
}

fn is_valid_json_file(path: &Path) -> bool {
    std::fs::read(path)
        .ok()
        .and_then(|bytes| serde_json::from_slice::<serde_json::Value>(&bytes).ok())
        .is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::collections::BTreeMap;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Counter {
        value: u64,
    }

    #[test]
    fn missing_file_loads_as_none() {
        let tmp = tempfile::tempdir().unwrap();
        let store = DurableStore::default();
        let loaded: Option<Counter> = store.load_json(&tmp.path().join("none.json")).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn write_then_load_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("state.json");
        let store = DurableStore::default();
        store.write_json(&path, &Counter { value: 7 }).unwrap();
        let loaded: Counter = store.load_json(&path).unwrap().unwrap();
        assert_eq!(loaded, Counter { value: 7 });
    }

    #[test]
    fn corrupt_main_file_recovers_from_backup() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("state.json");
        let store = DurableStore::default();
        store.write_json(&path, &Counter { value: 1 }).unwrap();
        store.write_json(&path, &Counter { value: 2 }).unwrap();
        // Second write backed up value=1; now corrupt the main file.
        std::fs::write(&path, b"{not json").unwrap();

        let loaded: Counter = store.load_json(&path).unwrap().unwrap();
        assert_eq!(loaded.value, 1);
    }

    #[test]
    fn corrupt_file_without_backup_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("state.json");
        std::fs::write(&path, b"{not json").unwrap();
        let store = DurableStore::default();
        let err = store.load_json::<Counter>(&path).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }

    #[test]
    fn corrupt_main_never_overwrites_good_backup() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("state.json");
        let store = DurableStore::default();
        store.write_json(&path, &Counter { value: 1 }).unwrap();
        store.write_json(&path, &Counter { value: 2 }).unwrap();
        std::fs::write(&path, b"garbage").unwrap();
        // Writing while main is corrupt must not replace .bak with garbage.
        store.write_json(&path, &Counter { value: 3 }).unwrap();

        let backup: Counter = serde_json::from_slice(
            &std::fs::read(tmp.path().join("state.json.bak")).unwrap(),
        )
        .unwrap();
        assert_eq!(backup.value, 1);
        let loaded: Counter = store.load_json(&path).unwrap().unwrap();
        assert_eq!(loaded.value, 3);
    }

    #[test]
    fn concurrent_read_modify_write_loses_no_updates() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("counter.json");
        let store = DurableStore::new(30_000, 5);
        store.write_json(&path, &Counter { value: 0 }).unwrap();

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                let path = path.clone();
                std::thread::spawn(move || {
                    for _ in 0..4 {
                        store
                            .update_json::<Counter, _>(&path, |current| {
                                let value = current.map(|c| c.value).unwrap_or(0);
                                Counter { value: value + 1 }
                            })
                            .unwrap();
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        let final_value: Counter = store.load_json(&path).unwrap().unwrap();
        assert_eq!(final_value.value, 32);
    }

    #[test]
    fn write_text_preserves_mode_when_asked() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("hook.sh");
        std::fs::write(&path, "#!/bin/sh\n").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        let store = DurableStore::default();
        store.write_text(&path, "#!/bin/sh\necho hi\n", true).unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "#!/bin/sh\necho hi\n");
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o755);
        }
    }

    #[test]
    fn update_json_sees_latest_state_under_lock() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("map.json");
        let store = DurableStore::default();
        store
            .update_json::<BTreeMap<String, u32>, _>(&path, |current| {
                let mut map = current.unwrap_or_default();
                map.insert("a".into(), 1);
                map
            })
            .unwrap();
        let map = store
            .update_json::<BTreeMap<String, u32>, _>(&path, |current| {
                let mut map = current.unwrap_or_default();
                map.insert("b".into(), 2);
                map
            })
            .unwrap();
        assert_eq!(map.len(), 2);
    }
}
