//! Engine wiring: one struct owning every subsystem.
//!
//! Both binaries build an [`Engine`] the same way: load settings, resolve
//! the corpus paths, open the stores (scanning the tree), start the watcher
//! and the backup scheduler. Everything hangs off `Arc`s so the dispatcher
//! and the bridge share state without further ceremony.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::backup::{spawn_scheduler, BackupManager, HealthReport};
use crate::bus::ChangeBus;
use crate::config::CorpusPaths;
use crate::error::Result;
use crate::registry::ProjectRegistry;
use crate::selfwrite::SelfWriteRing;
use crate::settings::SettingsHandle;
use crate::store::{MemoryStore, TaskStore};
use crate::watcher::CorpusWatcher;

pub struct Engine {
    pub paths: CorpusPaths,
    pub settings: Arc<SettingsHandle>,
    pub bus: Arc<ChangeBus>,
    pub ring: Arc<SelfWriteRing>,
    pub registry: Arc<ProjectRegistry>,
    pub memories: Arc<MemoryStore>,
    pub tasks: Arc<TaskStore>,
    pub backup: Arc<BackupManager>,
    _watcher: Option<CorpusWatcher>,
    backup_task: Option<JoinHandle<()>>,
}

impl Engine {
    /// Full initialization: watcher and backup scheduler included.
    pub async fn init(root: PathBuf) -> Result<Self> {
        Self::init_with(root, true, true).await
    }

    /// Initialization with the background services switchable; tests and
    /// one-shot invocations don't want a watcher racing their assertions.
    pub async fn init_with(root: PathBuf, watch: bool, schedule_backups: bool) -> Result<Self> {
        let root = if root.as_os_str().is_empty() {
            std::env::current_dir()?
        } else {
            root
        };

        let settings = Arc::new(SettingsHandle::load(CorpusPaths::settings_file(&root))?);
        let snapshot = settings.current();
        let paths = CorpusPaths::resolve(root, &snapshot);
        paths.ensure_layout()?;

        let bus = Arc::new(ChangeBus::new());
        let ring = Arc::new(SelfWriteRing::default());
        let registry = Arc::new(ProjectRegistry::load(paths.registry_file())?);

        let memories = Arc::new(
            MemoryStore::open(
                paths.memories.clone(),
                bus.clone(),
                ring.clone(),
                registry.clone(),
            )
            .await?,
        );
        let tasks = Arc::new(
            TaskStore::open(
                paths.tasks.clone(),
                snapshot.features.task_layout,
                bus.clone(),
                ring.clone(),
                registry.clone(),
            )
            .await?,
        );
        let backup = Arc::new(BackupManager::new(&paths));

        let watcher = if watch {
            match CorpusWatcher::start(
                memories.clone(),
                tasks.clone(),
                settings.clone(),
                bus.clone(),
            ) {
                Ok(watcher) => Some(watcher),
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        "file watcher failed to start; external edits will only surface on rescan"
                    );
                    None
                }
            }
        } else {
            None
        };

        let backup_task =
            schedule_backups.then(|| spawn_scheduler(backup.clone(), settings.clone()));

        Ok(Self {
            paths,
            settings,
            bus,
            ring,
            registry,
            memories,
            tasks,
            backup,
            _watcher: watcher,
            backup_task,
        })
    }

    pub async fn health(&self) -> Result<HealthReport> {
        let snapshot = self.settings.current();
        self.backup
            .health(
                self.memories.count().await,
                self.tasks.count().await,
                snapshot.features.backup_interval_sec,
                snapshot.features.auto_backup,
            )
            .await
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Some(task) = self.backup_task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn init_creates_the_corpus_layout() {
        let dir = TempDir::new().unwrap();
        let engine = Engine::init_with(dir.path().to_path_buf(), false, false)
            .await
            .unwrap();
        assert!(engine.paths.memories.is_dir());
        assert!(engine.paths.tasks.is_dir());
        assert!(engine.paths.data.is_dir());

        let health = engine.health().await.unwrap();
        assert_eq!(health.memory_count, 0);
        assert_eq!(health.task_count, 0);
    }

    #[tokio::test]
    async fn stores_share_the_registry() {
        let dir = TempDir::new().unwrap();
        let engine = Engine::init_with(dir.path().to_path_buf(), false, false)
            .await
            .unwrap();
        engine
            .memories
            .add("note".into(), Some("shared".into()), None, vec![], None, None)
            .await
            .unwrap();
        let projects = engine.registry.list().await;
        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0].0, "shared");
    }
}
