//! File watcher and reconciliation.
//!
//! Watches the memory root, the task root and the settings file for changes
//! made by anything that is not this process (editors, sync clients, the
//! other Engram binary). Events are debounced, checked against the
//! self-write ring, and reconciled into the store indexes, which emit the
//! resulting change events. A periodic full rescan catches anything the
//! per-path events missed.

use std::sync::Arc;
use std::time::Duration;

use notify::RecommendedWatcher;
use notify_debouncer_mini::{new_debouncer, DebouncedEvent, Debouncer};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::bus::{ChangeBus, ChangeEvent, EventKind};
use crate::settings::SettingsHandle;
use crate::store::{MemoryStore, TaskStore};

/// Debounce window per path.
const DEBOUNCE: Duration = Duration::from_millis(500);

/// Interval of the catch-all rescan.
const RESCAN_INTERVAL: Duration = Duration::from_secs(60);

/// Watches the corpus and keeps the in-memory indexes honest.
pub struct CorpusWatcher {
    _debouncer: Debouncer<RecommendedWatcher>,
    process_task: JoinHandle<()>,
    rescan_task: JoinHandle<()>,
}

impl CorpusWatcher {
    pub fn start(
        memories: Arc<MemoryStore>,
        tasks: Arc<TaskStore>,
        settings: Arc<SettingsHandle>,
        bus: Arc<ChangeBus>,
    ) -> Result<Self, notify::Error> {
        let (tx, rx) = mpsc::channel::<Vec<DebouncedEvent>>(100);

        let mut debouncer = new_debouncer(
            DEBOUNCE,
            move |result: Result<Vec<DebouncedEvent>, notify::Error>| match result {
                Ok(events) => {
                    if !events.is_empty() {
                        let _ = tx.blocking_send(events);
                    }
                }
                Err(e) => tracing::warn!(error = %e, "watch error"),
            },
        )?;

        debouncer
            .watcher()
            .watch(memories.root(), notify::RecursiveMode::Recursive)?;
        debouncer
            .watcher()
            .watch(tasks.root(), notify::RecursiveMode::Recursive)?;
        if let Some(data_dir) = settings.path().parent() {
            debouncer
                .watcher()
                .watch(data_dir, notify::RecursiveMode::NonRecursive)?;
        }

        tracing::info!(
            memories = %memories.root().display(),
            tasks = %tasks.root().display(),
            "corpus watcher started"
        );

        let process_task = tokio::spawn(process_events(
            rx,
            memories.clone(),
            tasks.clone(),
            settings,
            bus,
        ));
        let rescan_task = tokio::spawn(periodic_rescan(memories, tasks));

        Ok(Self {
            _debouncer: debouncer,
            process_task,
            rescan_task,
        })
    }
}

impl Drop for CorpusWatcher {
    fn drop(&mut self) {
        self.process_task.abort();
        self.rescan_task.abort();
    }
}

async fn process_events(
    mut rx: mpsc::Receiver<Vec<DebouncedEvent>>,
    memories: Arc<MemoryStore>,
    tasks: Arc<TaskStore>,
    settings: Arc<SettingsHandle>,
    bus: Arc<ChangeBus>,
) {
    while let Some(events) = rx.recv().await {
        for event in events {
            let path = event.path.clone();
            if is_hidden_or_temp(&path) {
                continue;
            }

            if path == settings.path() {
                reload_settings(&settings, &bus);
                continue;
            }

            let result = if memories.owns(&path) {
                if path.exists() {
                    memories.reconcile_upsert(&path).await
                } else {
                    memories.reconcile_remove(&path).await
                }
            } else if tasks.owns(&path) {
                if path.exists() {
                    tasks.reconcile_upsert(&path).await
                } else {
                    tasks.reconcile_remove(&path).await
                }
            } else {
                continue;
            };

            if let Err(e) = result {
                tracing::warn!(path = %path.display(), error = %e, "reconciliation failed");
            }
        }
    }
}

fn reload_settings(settings: &SettingsHandle, bus: &ChangeBus) {
    match settings.reload() {
        Ok(fresh) => {
            tracing::info!("settings reloaded");
            let payload = serde_json::to_value(fresh.as_ref()).unwrap_or(serde_json::Value::Null);
            bus.publish(
                ChangeEvent::new(EventKind::SettingsChanged, "settings", "").with_payload(payload),
            );
        }
        Err(e) => tracing::warn!(error = %e, "settings reload failed; keeping previous snapshot"),
    }
}

async fn periodic_rescan(memories: Arc<MemoryStore>, tasks: Arc<TaskStore>) {
    let mut interval = tokio::time::interval(RESCAN_INTERVAL);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    interval.tick().await; // first tick fires immediately; skip it
    loop {
        interval.tick().await;
        if let Err(e) = memories.reconcile_full_scan().await {
            tracing::warn!(error = %e, "memory rescan failed");
        }
        if let Err(e) = tasks.reconcile_full_scan().await {
            tracing::warn!(error = %e, "task rescan failed");
        }
    }
}

/// Hidden files, quarantine content and atomic-write temp files are never
/// reconciled. Only the leaf name and its immediate directory are checked;
/// the corpus root itself may legitimately live under a dotted path. The
/// stores additionally reject hidden project directories on their own.
fn is_hidden_or_temp(path: &std::path::Path) -> bool {
    let leaf_hidden = path
        .file_name()
        .map(|n| n.to_string_lossy().starts_with('.'))
        .unwrap_or(true);
    let dir_hidden = path
        .parent()
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().starts_with('.'))
        .unwrap_or(false);
    let temp = path
        .extension()
        .map(|e| e.to_string_lossy() == "tmp")
        .unwrap_or(false);
    leaf_hidden || dir_hidden || temp
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Category, Memory, MemoryStatus, Priority};
    use crate::registry::ProjectRegistry;
    use crate::selfwrite::SelfWriteRing;
    use engram_fs::frontmatter;
    use std::path::PathBuf;
    use tempfile::TempDir;
    use tokio::fs;

    struct Fixture {
        _dir: TempDir,
        memories: Arc<MemoryStore>,
        tasks: Arc<TaskStore>,
        settings: Arc<SettingsHandle>,
        bus: Arc<ChangeBus>,
        memory_root: PathBuf,
    }

    async fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let bus = Arc::new(ChangeBus::new());
        let ring = Arc::new(SelfWriteRing::default());
        let registry =
            Arc::new(ProjectRegistry::load(dir.path().join("projects-registry.json")).unwrap());
        let data = dir.path().join("data");
        fs::create_dir_all(&data).await.unwrap();
        let settings = Arc::new(SettingsHandle::load(data.join("settings.json")).unwrap());
        let memory_root = dir.path().join("memories");
        let memories = Arc::new(
            MemoryStore::open(memory_root.clone(), bus.clone(), ring.clone(), registry.clone())
                .await
                .unwrap(),
        );
        let tasks = Arc::new(
            TaskStore::open(
                dir.path().join("tasks"),
                crate::store::TaskLayoutKind::Flat,
                bus.clone(),
                ring.clone(),
                registry,
            )
            .await
            .unwrap(),
        );
        Fixture {
            _dir: dir,
            memories,
            tasks,
            settings,
            bus,
            memory_root,
        }
    }

    #[tokio::test]
    async fn watcher_starts_successfully() {
        let f = fixture().await;
        let watcher = CorpusWatcher::start(
            f.memories.clone(),
            f.tasks.clone(),
            f.settings.clone(),
            f.bus.clone(),
        );
        assert!(watcher.is_ok());
    }

    #[tokio::test]
    async fn external_memory_file_produces_added_event() {
        let f = fixture().await;
        let mut sub = f.bus.subscribe();
        let _watcher = CorpusWatcher::start(
            f.memories.clone(),
            f.tasks.clone(),
            f.settings.clone(),
            f.bus.clone(),
        )
        .unwrap();

        let external = Memory::new(
            "dropped in from outside".into(),
            "p2".into(),
            Category::Personal,
            vec![],
            Priority::Medium,
            MemoryStatus::Active,
        );
        let doc = external.to_document();
        let dir = f.memory_root.join("p2");
        fs::create_dir_all(&dir).await.unwrap();
        fs::write(
            dir.join(external.file_name()),
            frontmatter::serialize(&doc.metadata, &doc.body),
        )
        .await
        .unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), sub.recv())
            .await
            .expect("watcher must surface the external file")
            .unwrap();
        assert_eq!(event.kind, EventKind::MemoryAdded);
        assert_eq!(event.id, external.id);
        assert_eq!(
            f.memories.list(Some("p2"), None).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn own_writes_do_not_echo_events() {
        let f = fixture().await;
        let _watcher = CorpusWatcher::start(
            f.memories.clone(),
            f.tasks.clone(),
            f.settings.clone(),
            f.bus.clone(),
        )
        .unwrap();

        let mut sub = f.bus.subscribe();
        let memory = f
            .memories
            .add("self write".into(), Some("p1".into()), None, vec![], None, None)
            .await
            .unwrap();

        // The synchronous add event arrives; the watcher echo must not.
        let first = sub.recv().await.unwrap();
        assert_eq!(first.kind, EventKind::MemoryAdded);
        assert_eq!(first.id, memory.id);

        let echo = tokio::time::timeout(Duration::from_millis(1500), sub.recv()).await;
        assert!(echo.is_err(), "self-write must be suppressed, got {:?}", echo);
    }

    #[test]
    fn hidden_and_temp_paths_are_ignored() {
        assert!(is_hidden_or_temp(std::path::Path::new(
            "/root/memories/.quarantine/x.md"
        )));
        assert!(is_hidden_or_temp(std::path::Path::new(
            "/root/memories/p/abc123.tmp"
        )));
        assert!(!is_hidden_or_temp(std::path::Path::new(
            "/root/memories/p/note.md"
        )));
    }
}
