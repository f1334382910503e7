//! Per-name run lock: at most one deployment per logical name at a time

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LockError {
    #[error(
        "another deployment of '{name}' is running (PID: {pid}, lock: {})",
        .path.display()
    )]
    Held { name: String, pid: i32, path: PathBuf },

    #[error(
        "lock file {} for '{name}' has no readable PID; remove it if no deployment is running",
        .path.display()
    )]
    Unreadable { name: String, path: PathBuf },

    #[error("failed to manage lock file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Held for the duration of a run; the lock file is removed on drop
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    /// Take the lock for `name` under `dir`, reclaiming it if the PID it
    /// records no longer exists.
    ///
    /// The PID is written to a private file first and then linked into
    /// place, so the lock file never exists without its PID.
    pub fn acquire(dir: &Path, name: &str) -> Result<Self, LockError> {
        std::fs::create_dir_all(dir).map_err(|source| LockError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = dir.join(format!("{}.pid", sanitize(name)));
        let staged = dir.join(format!("{}.pid.{}.tmp", sanitize(name), std::process::id()));
        std::fs::write(&staged, std::process::id().to_string()).map_err(|source| {
            LockError::Io {
                path: staged.clone(),
                source,
            }
        })?;

        let result = Self::link(&staged, path, name);
        std::fs::remove_file(&staged).ok();
        result
    }

    fn link(staged: &Path, path: PathBuf, name: &str) -> Result<Self, LockError> {
        for _ in 0..2 {
            match std::fs::hard_link(staged, &path) {
                Ok(()) => {
                    tracing::debug!(lock = %path.display(), "Run lock acquired");
                    return Ok(Self { path });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => match read_owner(&path) {
                    Owner::Gone => continue,
                    Owner::Pid(pid) if is_running(pid) => {
                        return Err(LockError::Held {
                            name: name.to_string(),
                            pid,
                            path,
                        });
                    }
                    Owner::Pid(pid) => {
                        tracing::warn!(lock = %path.display(), pid, "Reclaiming stale run lock");
                        std::fs::remove_file(&path).ok();
                    }
                    Owner::Unreadable => {
                        return Err(LockError::Unreadable {
                            name: name.to_string(),
                            path,
                        });
                    }
                },
                Err(source) => return Err(LockError::Io { path, source }),
            }
        }

        Err(LockError::Io {
            path,
            source: std::io::Error::new(ErrorKind::AlreadyExists, "lock file keeps reappearing"),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!(lock = %self.path.display(), "Failed to remove run lock: {}", e);
        }
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

enum Owner {
    Pid(i32),
    /// Removed between the failed link and the read
    Gone,
    Unreadable,
}

fn read_owner(path: &Path) -> Owner {
    match std::fs::read_to_string(path) {
        Ok(raw) => raw.trim().parse().map(Owner::Pid).unwrap_or(Owner::Unreadable),
        Err(e) if e.kind() == ErrorKind::NotFound => Owner::Gone,
        Err(_) => Owner::Unreadable,
    }
}

fn is_running(pid: i32) -> bool {
    #[cfg(unix)]
    {
        use nix::errno::Errno;
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        // Signal 0 only checks that the process exists. EPERM means it
        // exists under another user.
        match kill(Pid::from_raw(pid), None) {
            Ok(()) | Err(Errno::EPERM) => true,
            Err(_) => false,
        }
    }

    #[cfg(not(unix))]
    {
        let _ = pid;
        true
    }
}
