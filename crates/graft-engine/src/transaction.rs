use graft_core::error::EngineError;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error};

/// What to do to undo one completed mutation.
#[derive(Debug)]
enum UndoRecord {
    /// The path had prior content; restore bytes and permissions.
    Restore {
        path: PathBuf,
        bytes: Vec<u8>,
        perms: fs::Permissions,
    },
    /// The path did not exist before; remove it.
    Remove { path: PathBuf },
}

/// A sequence of file mutations that either all take effect or all get
/// rolled back.
///
/// Each mutation captures its undo record (previous bytes and mode, or
/// "did not exist") *before* touching the destination. On failure the
/// records replay in reverse; partial failures during rollback are logged
/// and rollback continues, restoring as much as possible.
///
/// Dropping an uncommitted transaction rolls it back, so an early `?`
/// return inside [`FileTransaction::run`] never leaves half-applied state.
#[derive(Debug, Default)]
pub struct FileTransaction {
    undo: Vec<UndoRecord>,
    committed: bool,
}

impl FileTransaction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `body` inside a transaction: commit on `Ok`, roll back on `Err`.
    pub fn run<T, E, F>(body: F) -> Result<T, E>
    where
        F: FnOnce(&mut FileTransaction) -> Result<T, E>,
    {
        let mut txn = FileTransaction::new();
        match body(&mut txn) {
            Ok(value) => {
                txn.commit();
                Ok(value)
            }
            Err(e) => {
                txn.rollback();
                Err(e)
            }
        }
    }

    /// Copy `src` over `dst`, creating parent directories as needed.
    pub fn copy_file(&mut self, src: &Path, dst: &Path) -> Result<(), EngineError> {
        let record = self.capture(dst)?;
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| EngineError::transaction(format!("mkdir {}", parent.display()), e))?;
        }
        fs::copy(src, dst).map_err(|e| {
            EngineError::transaction(format!("copy {} -> {}", src.display(), dst.display()), e)
        })?;
        self.undo.push(record);
        debug!(src = %src.display(), dst = %dst.display(), "copied");
        Ok(())
    }

    /// Remove `path` if it exists. Missing files are not an error.
    pub fn delete_file(&mut self, path: &Path) -> Result<(), EngineError> {
        if !path.exists() {
            return Ok(());
        }
        let record = self.capture(path)?;
        fs::remove_file(path)
            .map_err(|e| EngineError::transaction(format!("delete {}", path.display()), e))?;
        self.undo.push(record);
        debug!(path = %path.display(), "deleted");
        Ok(())
    }

    fn capture(&self, path: &Path) -> Result<UndoRecord, EngineError> {
        if path.exists() {
            let bytes = fs::read(path)
                .map_err(|e| EngineError::transaction(format!("snapshot {}", path.display()), e))?;
            let perms = fs::metadata(path)
                .map_err(|e| EngineError::transaction(format!("snapshot {}", path.display()), e))?
                .permissions();
            Ok(UndoRecord::Restore {
                path: path.to_path_buf(),
                bytes,
                perms,
            })
        } else {
            Ok(UndoRecord::Remove {
                path: path.to_path_buf(),
            })
        }
    }

    /// Keep all applied mutations and discard the undo log.
    pub fn commit(mut self) {
        self.undo.clear();
        self.committed = true;
    }

    /// Replay undo records newest first.
    pub fn rollback(&mut self) {
        while let Some(record) = self.undo.pop() {
            match record {
                UndoRecord::Restore { path, bytes, perms } => {
                    if let Some(parent) = path.parent()
                        && let Err(e) = fs::create_dir_all(parent)
                    {
                        error!(path = %path.display(), error = %e, "rollback mkdir failed");
                        continue;
                    }
                    if let Err(e) = fs::write(&path, &bytes) {
                        error!(path = %path.display(), error = %e, "rollback restore failed");
                        continue;
                    }
                    if let Err(e) = fs::set_permissions(&path, perms) {
                        error!(path = %path.display(), error = %e, "rollback chmod failed");
                    }
                }
                UndoRecord::Remove { path } => {
                    if path.exists()
                        && let Err(e) = fs::remove_file(&path)
                    {
                        error!(path = %path.display(), error = %e, "rollback remove failed");
                    }
                }
            }
        }
        self.committed = true;
    }
}

impl Drop for FileTransaction {
    fn drop(&mut self) {
        if !self.committed {
            self.rollback();
        }
    }
}
