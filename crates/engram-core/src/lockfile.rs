//! Role lockfiles.
//!
//! Two writers in the same role against one corpus cause index churn and
//! duplicate events. Each binary takes a role lock at startup
//! (`<root>/.mcp.lock` for the tool server, `<root>/.bridge.lock` for the
//! dashboard bridge) and refuses to start when a live peer holds it. A lock
//! left behind by a dead process is taken over.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EngramError, Result};

#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    pid: u32,
    started_at: DateTime<Utc>,
}

/// Held for the process lifetime; the file is removed on drop.
#[derive(Debug)]
pub struct RoleLock {
    path: PathBuf,
}

impl RoleLock {
    /// Acquire the lock for `role` under `root`.
    pub fn acquire(root: &Path, role: &str) -> Result<Self> {
        let path = root.join(format!(".{role}.lock"));
        let info = LockInfo {
            pid: std::process::id(),
            started_at: Utc::now(),
        };
        let body = serde_json::to_string(&info).map_err(|e| EngramError::internal(e.to_string()))?;

        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(mut file) => {
                use std::io::Write;
                file.write_all(body.as_bytes())?;
                return Ok(Self { path });
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(e) => return Err(e.into()),
        }

        // A lock exists. Live holder: refuse. Dead holder: take over.
        let holder: Option<LockInfo> = std::fs::read_to_string(&path)
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok());
        match holder {
            Some(info) if process_alive(info.pid) => Err(EngramError::conflict(
                "lockfile",
                format!(
                    "another '{role}' process (pid {}) holds {} since {}",
                    info.pid,
                    path.display(),
                    info.started_at
                ),
            )),
            _ => {
                tracing::warn!(path = %path.display(), "replacing stale role lock");
                std::fs::write(&path, body)?;
                Ok(Self { path })
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RoleLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to remove role lock");
            }
        }
    }
}

#[cfg(target_os = "linux")]
fn process_alive(pid: u32) -> bool {
    Path::new(&format!("/proc/{pid}")).exists()
}

/// Without a procfs there is no cheap liveness probe; assume the holder is
/// alive and make the operator remove the file by hand.
#[cfg(not(target_os = "linux"))]
fn process_alive(_pid: u32) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn acquire_writes_and_drop_removes() {
        let dir = TempDir::new().unwrap();
        let lock_path = dir.path().join(".mcp.lock");
        {
            let lock = RoleLock::acquire(dir.path(), "mcp").unwrap();
            assert_eq!(lock.path(), lock_path);
            assert!(lock_path.exists());

            let raw = std::fs::read_to_string(&lock_path).unwrap();
            let info: LockInfo = serde_json::from_str(&raw).unwrap();
            assert_eq!(info.pid, std::process::id());
        }
        assert!(!lock_path.exists(), "lock must be removed on drop");
    }

    #[test]
    fn second_acquire_in_same_role_is_refused() {
        let dir = TempDir::new().unwrap();
        let _held = RoleLock::acquire(dir.path(), "mcp").unwrap();
        let err = RoleLock::acquire(dir.path(), "mcp").unwrap_err();
        assert!(matches!(err, EngramError::Conflict { .. }));
    }

    #[test]
    fn different_roles_coexist() {
        let dir = TempDir::new().unwrap();
        let _mcp = RoleLock::acquire(dir.path(), "mcp").unwrap();
        assert!(RoleLock::acquire(dir.path(), "bridge").is_ok());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn stale_lock_is_taken_over() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".mcp.lock");
        // A pid that cannot exist holds the lock.
        std::fs::write(
            &path,
            r#"{"pid": 4294967294, "started_at": "2024-01-01T00:00:00Z"}"#,
        )
        .unwrap();

        let lock = RoleLock::acquire(dir.path(), "mcp").unwrap();
        let raw = std::fs::read_to_string(lock.path()).unwrap();
        let info: LockInfo = serde_json::from_str(&raw).unwrap();
        assert_eq!(info.pid, std::process::id());
    }

    #[test]
    fn unparseable_lock_is_taken_over() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(".mcp.lock"), "not json").unwrap();
        assert!(RoleLock::acquire(dir.path(), "mcp").is_ok());
    }
}
