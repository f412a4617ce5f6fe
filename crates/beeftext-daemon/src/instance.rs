//! Single-instance lock

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InstanceError {
    #[error("beeftextd is already running (lock held on {0})")]
    AlreadyRunning(PathBuf),

    #[error("Failed to lock {path}: {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Held for the life of the daemon. The kernel drops the lock when the
/// process exits, however it exits.
#[derive(Debug)]
pub struct InstanceLock {
    _lock: Flock<File>,
    path: PathBuf,
}

impl InstanceLock {
    /// Take the lock at `path`, writing our pid into it.
    pub fn acquire(path: &Path) -> Result<Self, InstanceError> {
        let io_error = |source| InstanceError::Lock {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_error)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .map_err(io_error)?;

        let mut lock = match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(lock) => lock,
            Err((_, Errno::EWOULDBLOCK)) => return Err(InstanceError::AlreadyRunning(path.to_path_buf())),
            Err((_, errno)) => return Err(io_error(errno.into())),
        };

        lock.set_len(0).map_err(io_error)?;
        writeln!(lock, "{}", std::process::id()).map_err(io_error)?;

        tracing::debug!("Holding instance lock {}", path.display());
        Ok(Self {
            _lock: lock,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_second_instance_is_refused() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("beeftextd.lock");

        let first = InstanceLock::acquire(&path).unwrap();
        assert_eq!(first.path(), path);
        assert!(matches!(
            InstanceLock::acquire(&path),
            Err(InstanceError::AlreadyRunning(_))
        ));

        drop(first);
        InstanceLock::acquire(&path).unwrap();
    }

    #[test]
    fn test_lock_file_holds_pid() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run/beeftextd.lock");
        let _lock = InstanceLock::acquire(&path).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.trim(), std::process::id().to_string());
    }
}
