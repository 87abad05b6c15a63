use fs2::FileExt;
use graft_core::constants;
use graft_core::error::StoreError;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Cross-process advisory lock held via a `<file>.lock` sidecar.
///
/// Cooperative only: well-behaved writers acquire it before touching the
/// guarded file. Released on drop.
#[derive(Debug)]
pub struct FileLock {
    file: File,
    path: PathBuf,
}

impl FileLock {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
    }
}

/// Sidecar lock path for a guarded file: `registry.json` → `registry.json.lock`.
pub fn lock_path_for(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| {
            // Degenerate target (e.g. `/`): key the lock on a path hash.
            let digest = blake3::hash(target.to_string_lossy().as_bytes());
            format!("graft-{}", &digest.to_hex()[..16])
        });
    let parent = target.parent().unwrap_or_else(|| Path::new("."));
    parent.join(format!("{name}{}", constants::LOCK_SUFFIX))
}

/// Acquire the advisory lock for `target`, polling up to `timeout_ms`.
///
/// On timeout the caller has mutated nothing; the operation aborts with
/// `StoreError::LockTimeout`.
pub fn acquire(target: &Path, timeout_ms: u64, poll_ms: u64) -> Result<FileLock, StoreError> {
    let lock_path = lock_path_for(target);
    if let Some(parent) = lock_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(&lock_path)?;

    let start = Instant::now();
    loop {
        match file.try_lock_exclusive() {
            Ok(()) => break,
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                let waited = start.elapsed().as_millis() as u64;
                if waited >= timeout_ms {
                    return Err(StoreError::LockTimeout {
                        path: lock_path.display().to_string(),
                        waited_ms: waited,
                    });
                }
                std::thread::sleep(Duration::from_millis(poll_ms));
            }
            Err(err) => return Err(StoreError::Io(err)),
        }
    }

    let _ = file.set_len(0);
    let _ = writeln!(file, "pid={}", std::process::id());
    let _ = writeln!(file, "target={}", target.display());
    let _ = writeln!(file, "timestamp={}", graft_core::time::now_iso8601());
    let _ = file.sync_data();

    Ok(FileLock {
        file,
        path: lock_path,
    })
}
