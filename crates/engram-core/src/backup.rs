//! Periodic snapshots of the corpus, with rotation and a health probe.
//!
//! A snapshot copies the memory and task trees into
//! `backups/<YYYY-MM-DD_HH-MM-SS>/`; rotation deletes the oldest once the
//! retention cap is exceeded. Destructive bulk operations (dedup apply,
//! batch deletes) take a snapshot first.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::fs;
use tokio::task::JoinHandle;

use crate::config::CorpusPaths;
use crate::error::Result;
use crate::settings::SettingsHandle;

pub struct BackupManager {
    memories: PathBuf,
    tasks: PathBuf,
    backups: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub memory_count: usize,
    pub task_count: usize,
    pub storage_bytes: u64,
    pub backup_count: usize,
    pub last_backup: Option<DateTime<Utc>>,
    pub next_backup: Option<DateTime<Utc>>,
}

impl BackupManager {
    pub fn new(paths: &CorpusPaths) -> Self {
        Self {
            memories: paths.memories.clone(),
            tasks: paths.tasks.clone(),
            backups: paths.backups.clone(),
        }
    }

    /// Snapshot both trees into a dated directory and rotate.
    pub async fn snapshot(&self, max_backups: usize) -> Result<PathBuf> {
        fs::create_dir_all(&self.backups).await?;
        let stamp = Utc::now().format("%Y-%m-%d_%H-%M-%S").to_string();
        let mut target = self.backups.join(&stamp);
        // Two snapshots inside one second get distinct directories.
        let mut attempt = 1;
        while target.exists() {
            attempt += 1;
            target = self.backups.join(format!("{stamp}-{attempt}"));
        }
        fs::create_dir_all(&target).await?;

        copy_tree(&self.memories, &target.join("memories")).await?;
        copy_tree(&self.tasks, &target.join("tasks")).await?;
        tracing::info!(target = %target.display(), "backup snapshot written");

        self.rotate(max_backups).await?;
        Ok(target)
    }

    /// Delete the oldest snapshots above the retention cap.
    pub async fn rotate(&self, max_backups: usize) -> Result<()> {
        let mut snapshots = self.list().await?;
        while snapshots.len() > max_backups.max(1) {
            let oldest = snapshots.remove(0);
            tracing::info!(path = %oldest.display(), "rotating out old backup");
            fs::remove_dir_all(&oldest).await?;
        }
        Ok(())
    }

    /// Snapshot directories, oldest first.
    pub async fn list(&self) -> Result<Vec<PathBuf>> {
        let mut snapshots = Vec::new();
        let mut entries = match fs::read_dir(&self.backups).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(snapshots),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                snapshots.push(entry.path());
            }
        }
        snapshots.sort();
        Ok(snapshots)
    }

    /// Counts, footprint and backup instants for `/api/status` and
    /// `test_tool`.
    pub async fn health(
        &self,
        memory_count: usize,
        task_count: usize,
        interval_sec: u64,
        auto_backup: bool,
    ) -> Result<HealthReport> {
        let storage_bytes =
            tree_size(&self.memories).await? + tree_size(&self.tasks).await?;
        let snapshots = self.list().await?;
        let last_backup = match snapshots.last() {
            Some(path) => {
                let meta = fs::metadata(path).await?;
                meta.modified().ok().map(DateTime::<Utc>::from)
            }
            None => None,
        };
        let next_backup = if auto_backup {
            Some(
                last_backup.unwrap_or_else(Utc::now)
                    + chrono::Duration::seconds(interval_sec as i64),
            )
        } else {
            None
        };
        Ok(HealthReport {
            memory_count,
            task_count,
            storage_bytes,
            backup_count: snapshots.len(),
            last_backup,
            next_backup,
        })
    }
}

/// Run snapshots on the configured interval for as long as the handle
/// lives. Settings are re-read every cycle so a reload takes effect without
/// a restart.
pub fn spawn_scheduler(
    manager: Arc<BackupManager>,
    settings: Arc<SettingsHandle>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let snapshot = settings.current();
            let interval = snapshot.features.backup_interval_sec.max(60);
            tokio::time::sleep(std::time::Duration::from_secs(interval)).await;

            let snapshot = settings.current();
            if !snapshot.features.auto_backup {
                continue;
            }
            if let Err(e) = manager.snapshot(snapshot.features.max_backups).await {
                tracing::warn!(error = %e, "scheduled backup failed");
            }
        }
    })
}

/// Copy markdown and JSON corpus files, preserving the directory shape.
/// Hidden entries (quarantine, lockfiles) stay out of snapshots.
async fn copy_tree(from: &Path, to: &Path) -> Result<()> {
    if !from.exists() {
        return Ok(());
    }
    fs::create_dir_all(to).await?;
    let mut entries = fs::read_dir(from).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') {
            continue;
        }
        let source = entry.path();
        let dest = to.join(&name);
        if entry.file_type().await?.is_dir() {
            Box::pin(copy_tree(&source, &dest)).await?;
        } else if name.ends_with(".md") || name.ends_with(".json") {
            fs::copy(&source, &dest).await?;
        }
    }
    Ok(())
}

async fn tree_size(root: &Path) -> Result<u64> {
    if !root.exists() {
        return Ok(0);
    }
    let mut total = 0;
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                stack.push(entry.path());
            } else {
                total += entry.metadata().await?.len();
            }
        }
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Settings;
    use tempfile::TempDir;

    async fn seeded_paths(dir: &TempDir) -> CorpusPaths {
        let paths = CorpusPaths::resolve(dir.path().to_path_buf(), &Settings::default());
        paths.ensure_layout().unwrap();
        fs::create_dir_all(paths.memories.join("p1")).await.unwrap();
        fs::write(paths.memories.join("p1/a.md"), "---\nid: a\n---\nbody")
            .await
            .unwrap();
        fs::create_dir_all(paths.tasks.join("p1")).await.unwrap();
        fs::write(paths.tasks.join("p1/tasks.json"), "[]").await.unwrap();
        paths
    }

    #[tokio::test]
    async fn snapshot_copies_both_trees() {
        let dir = TempDir::new().unwrap();
        let paths = seeded_paths(&dir).await;
        let manager = BackupManager::new(&paths);

        let target = manager.snapshot(10).await.unwrap();
        assert!(target.join("memories/p1/a.md").exists());
        assert!(target.join("tasks/p1/tasks.json").exists());
    }

    #[tokio::test]
    async fn rotation_keeps_only_the_cap() {
        let dir = TempDir::new().unwrap();
        let paths = seeded_paths(&dir).await;
        let manager = BackupManager::new(&paths);

        for _ in 0..4 {
            manager.snapshot(2).await.unwrap();
        }
        assert_eq!(manager.list().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn health_reports_counts_and_backups() {
        let dir = TempDir::new().unwrap();
        let paths = seeded_paths(&dir).await;
        let manager = BackupManager::new(&paths);
        manager.snapshot(10).await.unwrap();

        let health = manager.health(3, 2, 3600, true).await.unwrap();
        assert_eq!(health.memory_count, 3);
        assert_eq!(health.task_count, 2);
        assert!(health.storage_bytes > 0);
        assert_eq!(health.backup_count, 1);
        assert!(health.last_backup.is_some());
        assert!(health.next_backup.is_some());
    }

    #[tokio::test]
    async fn hidden_entries_stay_out_of_snapshots() {
        let dir = TempDir::new().unwrap();
        let paths = seeded_paths(&dir).await;
        fs::create_dir_all(paths.memories.join(".quarantine"))
            .await
            .unwrap();
        fs::write(paths.memories.join(".quarantine/dup.md"), "x")
            .await
            .unwrap();

        let manager = BackupManager::new(&paths);
        let target = manager.snapshot(10).await.unwrap();
        assert!(!target.join("memories/.quarantine").exists());
    }
}
