//! Project registry persistence.
//!
//! A small JSON map of every project slug the corpus has seen, with creation
//! time and optional metadata. Updated whenever a store first touches a new
//! project; duplicate detection is case-insensitive so `Foo` and `foo` stay
//! one project.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use engram_fs::write_atomic;

use crate::error::{EngramError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectEntry {
    pub created: DateTime<Utc>,
    #[serde(default = "default_stages")]
    pub default_stages: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn default_stages() -> Vec<String> {
    ["todo", "in_progress", "done", "blocked"]
        .map(str::to_string)
        .to_vec()
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    projects: BTreeMap<String, ProjectEntry>,
}

pub struct ProjectRegistry {
    path: PathBuf,
    inner: Mutex<RegistryFile>,
}

impl ProjectRegistry {
    pub fn load(path: PathBuf) -> Result<Self> {
        let file = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw)
                .map_err(|e| EngramError::parse(path.display().to_string(), e.to_string()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => RegistryFile::default(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            inner: Mutex::new(file),
        })
    }

    /// Record `slug` if unseen and return its canonical form. A slug that
    /// differs only by case resolves to the already-registered spelling.
    pub async fn ensure(&self, slug: &str) -> Result<String> {
        let mut file = self.inner.lock().await;
        if let Some(existing) = file
            .projects
            .keys()
            .find(|k| k.eq_ignore_ascii_case(slug))
            .cloned()
        {
            return Ok(existing);
        }
        file.projects.insert(
            slug.to_string(),
            ProjectEntry {
                created: Utc::now(),
                default_stages: default_stages(),
                description: None,
            },
        );
        self.persist(&file).await?;
        Ok(slug.to_string())
    }

    pub async fn list(&self) -> Vec<(String, ProjectEntry)> {
        self.inner
            .lock()
            .await
            .projects
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    async fn persist(&self, file: &RegistryFile) -> Result<()> {
        let json = serde_json::to_string_pretty(file)
            .map_err(|e| EngramError::internal(e.to_string()))?;
        write_atomic(&self.path, &json).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn registers_new_projects_once() {
        let dir = TempDir::new().unwrap();
        let registry = ProjectRegistry::load(dir.path().join("projects-registry.json")).unwrap();

        assert_eq!(registry.ensure("alpha").await.unwrap(), "alpha");
        assert_eq!(registry.ensure("alpha").await.unwrap(), "alpha");
        assert_eq!(registry.list().await.len(), 1);
    }

    #[tokio::test]
    async fn case_insensitive_duplicates_resolve_to_first_spelling() {
        let dir = TempDir::new().unwrap();
        let registry = ProjectRegistry::load(dir.path().join("projects-registry.json")).unwrap();

        assert_eq!(registry.ensure("Alpha").await.unwrap(), "Alpha");
        assert_eq!(registry.ensure("alpha").await.unwrap(), "Alpha");
        assert_eq!(registry.list().await.len(), 1);
    }

    #[tokio::test]
    async fn registry_survives_a_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("projects-registry.json");
        {
            let registry = ProjectRegistry::load(path.clone()).unwrap();
            registry.ensure("alpha").await.unwrap();
        }
        let reloaded = ProjectRegistry::load(path).unwrap();
        let projects = reloaded.list().await;
        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0].0, "alpha");
        assert_eq!(projects[0].1.default_stages[0], "todo");
    }
}
