//! Layout A: one `tasks.json` array per project.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::fs;

use engram_fs::write_atomic;

use crate::error::{EngramError, Result};
use crate::model::{hash_content, Task};
use crate::selfwrite::SelfWriteRing;

use super::LayoutBackend;

pub(crate) struct FlatLayout {
    root: PathBuf,
    ring: Arc<SelfWriteRing>,
}

impl FlatLayout {
    pub(crate) fn new(root: PathBuf, ring: Arc<SelfWriteRing>) -> Self {
        Self { root, ring }
    }

    fn project_file(&self, project: &str) -> PathBuf {
        self.root.join(project).join("tasks.json")
    }
}

#[async_trait]
impl LayoutBackend for FlatLayout {
    async fn load_all(&self) -> Result<Vec<Task>> {
        let mut tasks = Vec::new();
        let mut projects = fs::read_dir(&self.root).await?;
        while let Some(project) = projects.next_entry().await? {
            if !project.file_type().await?.is_dir() {
                continue;
            }
            let name = project.file_name().to_string_lossy().to_string();
            if name.starts_with('.') {
                continue;
            }
            let path = project.path().join("tasks.json");
            let raw = match fs::read_to_string(&path).await {
                Ok(raw) => raw,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            match serde_json::from_str::<Vec<Task>>(&raw) {
                Ok(parsed) => {
                    for mut task in parsed {
                        // The directory is authoritative for the project.
                        task.project = name.clone();
                        tasks.push(task);
                    }
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "malformed tasks.json skipped");
                }
            }
        }
        Ok(tasks)
    }

    async fn persist_project(&self, project: &str, tasks: &[Task]) -> Result<()> {
        let path = self.project_file(project);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(tasks)
            .map_err(|e| EngramError::internal(e.to_string()))?;
        self.ring.record_write(&path, &hash_content(&json));
        write_atomic(&path, &json).await?;
        Ok(())
    }
}
