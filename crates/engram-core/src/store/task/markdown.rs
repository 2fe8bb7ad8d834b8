//! Layout B: one `task-<id>.md` file per task, frontmatter plus body.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::fs;

use engram_fs::{frontmatter, write_atomic};

use crate::error::Result;
use crate::model::{hash_content, Task};
use crate::selfwrite::SelfWriteRing;

use super::LayoutBackend;

pub(crate) struct MarkdownLayout {
    root: PathBuf,
    ring: Arc<SelfWriteRing>,
}

impl MarkdownLayout {
    pub(crate) fn new(root: PathBuf, ring: Arc<SelfWriteRing>) -> Self {
        Self { root, ring }
    }
}

#[async_trait]
impl LayoutBackend for MarkdownLayout {
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

            let mut files = fs::read_dir(project.path()).await?;
            while let Some(file) = files.next_entry().await? {
                let file_name = file.file_name().to_string_lossy().to_string();
                if !file_name.starts_with("task-") || !file_name.ends_with(".md") {
                    continue;
                }
                let path = file.path();
                let raw = match fs::read_to_string(&path).await {
                    Ok(raw) => raw,
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "unreadable task file skipped");
                        continue;
                    }
                };
                let doc = match frontmatter::parse(&raw) {
                    Ok(doc) => doc,
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "malformed task file skipped");
                        continue;
                    }
                };
                match Task::from_document(&doc, &name) {
                    Ok(task) => tasks.push(task),
                    Err(reason) => {
                        tracing::warn!(path = %path.display(), %reason, "invalid task file skipped");
                    }
                }
            }
        }
        Ok(tasks)
    }

    async fn persist_project(&self, project: &str, tasks: &[Task]) -> Result<()> {
        let dir = self.root.join(project);
        fs::create_dir_all(&dir).await?;

        let desired: HashMap<String, String> = tasks
            .iter()
            .map(|task| {
                let doc = task.to_document();
                (
                    task.file_name(),
                    frontmatter::serialize(&doc.metadata, &doc.body),
                )
            })
            .collect();

        // Remove files for tasks that no longer exist.
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if !name.starts_with("task-") || !name.ends_with(".md") {
                continue;
            }
            if !desired.contains_key(&name) {
                self.ring.record_delete(&entry.path());
                match fs::remove_file(entry.path()).await {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }

        // Write changed files only; untouched tasks keep their mtime.
        for (name, raw) in desired {
            let path = dir.join(&name);
            if let Ok(existing) = fs::read_to_string(&path).await {
                if existing == raw {
                    continue;
                }
            }
            self.ring.record_write(&path, &hash_content(&raw));
            write_atomic(&path, &raw).await?;
        }
        Ok(())
    }
}
