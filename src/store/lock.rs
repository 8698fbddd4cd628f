use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::error::{MigrateError, Result};

/// Exclusive lock held next to the target store for the length of a run.
/// Released when dropped.
#[derive(Debug)]
pub struct RunLock {
    file: File,
    path: PathBuf,
}

impl RunLock {
    /// Fails immediately with `MigrateError::Locked` when another run holds it.
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        file.try_lock_exclusive()
            .map_err(|_| MigrateError::Locked(path.display().to_string()))?;

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn release(self) -> Result<()> {
        FileExt::unlock(&self.file)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn second_run_is_locked_out_until_release() {
        let dir = tempdir().unwrap();
        let lock_path = dir.path().join("site.db.lock");

        let lock = RunLock::acquire(&lock_path).unwrap();
        let err = RunLock::acquire(&lock_path).unwrap_err();
        assert_eq!(err.code(), "locked");

        lock.release().unwrap();
        let again = RunLock::acquire(&lock_path).unwrap();
        assert_eq!(again.path(), lock_path);
    }

    #[test]
    fn dropping_the_guard_releases() {
        let dir = tempdir().unwrap();
        let lock_path = dir.path().join("nested").join("run.lock");
        drop(RunLock::acquire(&lock_path).unwrap());
        assert!(RunLock::acquire(&lock_path).is_ok());
    }
}
