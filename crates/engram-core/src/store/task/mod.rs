//! Task store: CRUD with hierarchy rules over two interchangeable layouts.
//!
//! Layout A keeps one `tasks.json` array per project; layout B keeps one
//! `task-<id>.md` file per task. Both sit behind [`LayoutBackend`] and
//! present identical semantics; the active layout is fixed at startup and
//! mixing artifacts of both under one root is refused.

mod flat;
mod markdown;

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::{Mutex, RwLock};

use engram_fs::slug::sanitize_project;

use crate::bus::{ChangeBus, ChangeEvent, EventKind};
use crate::error::{EngramError, Result};
use crate::model::{now_second, Task, TaskDraft, TaskLevel, TaskPatch, TaskStatus};
use crate::registry::ProjectRegistry;
use crate::selfwrite::SelfWriteRing;

pub(crate) use flat::FlatLayout;
pub(crate) use markdown::MarkdownLayout;

/// Hard cap on `list` results, matching the memory store.
pub const MAX_LIST_LIMIT: usize = 1000;

/// Which on-disk task layout is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskLayoutKind {
    #[default]
    Flat,
    Markdown,
}

/// Persistence seam between the store and a concrete layout.
#[async_trait]
pub(crate) trait LayoutBackend: Send + Sync {
    /// Load every task under the root, project field coerced to its
    /// directory name.
    async fn load_all(&self) -> Result<Vec<Task>>;

    /// Persist the full task set of one project, removing stale artifacts.
    async fn persist_project(&self, project: &str, tasks: &[Task]) -> Result<()>;
}

#[derive(Default)]
struct TaskIndex {
    by_id: HashMap<String, Task>,
    by_project: HashMap<String, HashSet<String>>,
    children: HashMap<String, HashSet<String>>,
    /// Highest serial seen per project; never decreases.
    serials: HashMap<String, u64>,
}

impl TaskIndex {
    fn insert(&mut self, task: Task) {
        self.remove(&task.id);
        self.by_project
            .entry(task.project.clone())
            .or_default()
            .insert(task.id.clone());
        if let Some(parent) = &task.parent_id {
            self.children
                .entry(parent.clone())
                .or_default()
                .insert(task.id.clone());
        }
        let serial = self.serials.entry(task.project.clone()).or_default();
        *serial = (*serial).max(task.serial);
        self.by_id.insert(task.id.clone(), task);
    }

    fn remove(&mut self, id: &str) -> Option<Task> {
        let task = self.by_id.remove(id)?;
        if let Some(ids) = self.by_project.get_mut(&task.project) {
            ids.remove(id);
            if ids.is_empty() {
                self.by_project.remove(&task.project);
            }
        }
        if let Some(parent) = &task.parent_id {
            if let Some(ids) = self.children.get_mut(parent) {
                ids.remove(id);
                if ids.is_empty() {
                    self.children.remove(parent);
                }
            }
        }
        self.children.remove(id);
        Some(task)
    }

    fn next_serial(&self, project: &str) -> u64 {
        self.serials.get(project).copied().unwrap_or(0) + 1
    }

    fn project_tasks(&self, project: &str) -> Vec<Task> {
        let mut tasks: Vec<Task> = self
            .by_project
            .get(project)
            .into_iter()
            .flatten()
            .filter_map(|id| self.by_id.get(id))
            .cloned()
            .collect();
        tasks.sort_by_key(|t| t.serial);
        tasks
    }
}

/// Listing filters for `list_tasks`.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub project: Option<String>,
    pub status: Option<TaskStatus>,
    pub category: Option<crate::model::Category>,
    pub parent_id: Option<String>,
    pub limit: Option<usize>,
}

/// `get_task_context` result: the task and its neighborhood.
#[derive(Debug, Clone, Serialize)]
pub struct TaskContext {
    pub task: Task,
    pub parent: Option<Task>,
    pub siblings: Vec<Task>,
    pub children: Vec<Task>,
    /// Up to ten other recently-updated tasks in the same project.
    pub related: Vec<Task>,
}

pub struct TaskStore {
    root: PathBuf,
    kind: TaskLayoutKind,
    backend: Box<dyn LayoutBackend>,
    bus: Arc<ChangeBus>,
    ring: Arc<SelfWriteRing>,
    registry: Arc<ProjectRegistry>,
    index: RwLock<TaskIndex>,
    write_gate: Mutex<()>,
}

impl TaskStore {
    pub async fn open(
        root: PathBuf,
        kind: TaskLayoutKind,
        bus: Arc<ChangeBus>,
        ring: Arc<SelfWriteRing>,
        registry: Arc<ProjectRegistry>,
    ) -> Result<Self> {
        fs::create_dir_all(&root).await?;
        refuse_mixed_layout(&root, kind).await?;

        let backend: Box<dyn LayoutBackend> = match kind {
            TaskLayoutKind::Flat => Box::new(FlatLayout::new(root.clone(), ring.clone())),
            TaskLayoutKind::Markdown => Box::new(MarkdownLayout::new(root.clone(), ring.clone())),
        };

        let store = Self {
            root,
            kind,
            backend,
            bus,
            ring,
            registry,
            index: RwLock::new(TaskIndex::default()),
            write_gate: Mutex::new(()),
        };
        store.rebuild_index().await?;
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn layout(&self) -> TaskLayoutKind {
        self.kind
    }

    /// Create a task, validating hierarchy constraints, and emit
    /// `task-added`.
    pub async fn create(&self, mut draft: TaskDraft) -> Result<Task> {
        if draft.title.trim().is_empty() {
            return Err(EngramError::invalid_input("title", "must not be empty"));
        }
        for connection in &draft.memory_connections {
            if !(0.0..=1.0).contains(&connection.relevance) {
                return Err(EngramError::invalid_input(
                    "memory_connections",
                    "relevance must be within [0, 1]",
                ));
            }
        }
        let slug = sanitize_project(&draft.project);
        draft.project = self.registry.ensure(&slug).await?;

        let _gate = self.write_gate.lock().await;
        let (task, project_tasks) = {
            let mut index = self.index.write().await;
            validate_parent(
                &index,
                &draft.project,
                draft.parent_id.as_deref(),
                draft.level,
                None,
            )?;
            let serial = index.next_serial(&draft.project);
            let task = Task::from_draft(draft, serial);
            index.insert(task.clone());
            let project_tasks = index.project_tasks(&task.project);
            (task, project_tasks)
        };

        if let Err(e) = self.backend.persist_project(&task.project, &project_tasks).await {
            // Roll the index back so memory and disk stay consistent.
            self.index.write().await.remove(&task.id);
            return Err(e);
        }

        self.bus.publish(
            ChangeEvent::new(EventKind::TaskAdded, &task.id, &task.project)
                .with_payload(task_payload(&task)),
        );
        Ok(task)
    }

    /// Partial update. `created` is immutable, `updated` refreshes, parent
    /// and level changes revalidate the hierarchy.
    pub async fn update(&self, id: &str, patch: TaskPatch) -> Result<Task> {
        if patch.is_empty() {
            return Err(EngramError::invalid_input("patch", "no fields to update"));
        }
        if let Some(title) = &patch.title {
            if title.trim().is_empty() {
                return Err(EngramError::invalid_input("title", "must not be empty"));
            }
        }
        if let Some(connections) = &patch.memory_connections {
            for connection in connections {
                if !(0.0..=1.0).contains(&connection.relevance) {
                    return Err(EngramError::invalid_input(
                        "memory_connections",
                        "relevance must be within [0, 1]",
                    ));
                }
            }
        }

        let _gate = self.write_gate.lock().await;
        let mut task = {
            let index = self.index.read().await;
            index
                .by_id
                .get(id)
                .cloned()
                .ok_or_else(|| EngramError::not_found(id))?
        };

        if let Some(title) = patch.title {
            task.title = title;
        }
        if let Some(description) = patch.description {
            task.description = description;
        }
        if let Some(status) = patch.status {
            task.status = status;
        }
        if let Some(priority) = patch.priority {
            task.priority = priority;
        }
        if let Some(category) = patch.category {
            task.category = category;
        }
        if let Some(tags) = patch.tags {
            task.tags = crate::model::normalize_tags(tags);
        }
        if let Some(level) = patch.level {
            task.level = Some(level);
        }
        if let Some(connections) = patch.memory_connections {
            task.memory_connections = connections;
        }
        if let Some(parent_id) = patch.parent_id {
            task.parent_id = parent_id;
        }

        {
            let index = self.index.read().await;
            validate_parent(
                &index,
                &task.project,
                task.parent_id.as_deref(),
                task.level,
                Some(&task.id),
            )?;
        }

        task.updated = now_second();

        let project_tasks = {
            let mut index = self.index.write().await;
            index.insert(task.clone());
            index.project_tasks(&task.project)
        };
        self.backend.persist_project(&task.project, &project_tasks).await?;

        self.bus.publish(
            ChangeEvent::new(EventKind::TaskUpdated, &task.id, &task.project)
                .with_payload(task_payload(&task)),
        );
        Ok(task)
    }

    /// Delete a task. With `cascade`, children go too (depth first);
    /// without it, a task that still has children is a conflict.
    pub async fn delete(&self, id: &str, cascade: bool) -> Result<()> {
        let _gate = self.write_gate.lock().await;

        let (removed, project) = {
            let mut index = self.index.write().await;
            let task = index
                .by_id
                .get(id)
                .cloned()
                .ok_or_else(|| EngramError::not_found(id))?;

            let child_count = index.children.get(id).map_or(0, HashSet::len);
            if child_count > 0 && !cascade {
                return Err(EngramError::conflict(
                    "cascade",
                    format!("task has {child_count} subtask(s); pass cascade=true"),
                ));
            }

            // Depth-first so children report deleted before their parents.
            let mut order = Vec::new();
            collect_descendants(&index, id, &mut order);
            order.push(id.to_string());

            let mut removed = Vec::new();
            for victim in order {
                if let Some(task) = index.remove(&victim) {
                    removed.push(task);
                }
            }
            (removed, task.project)
        };

        let project_tasks = self.index.read().await.project_tasks(&project);
        self.backend.persist_project(&project, &project_tasks).await?;

        for task in removed {
            self.bus
                .publish(ChangeEvent::new(EventKind::TaskDeleted, &task.id, &task.project));
        }
        Ok(())
    }

    /// Most-recently-updated-first listing.
    pub async fn list(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        if let Some(limit) = filter.limit {
            if limit > MAX_LIST_LIMIT {
                return Err(EngramError::invalid_input(
                    "limit",
                    format!("must be <= {MAX_LIST_LIMIT}"),
                ));
            }
        }
        let limit = filter.limit.unwrap_or(MAX_LIST_LIMIT);

        let index = self.index.read().await;
        let mut tasks: Vec<Task> = index
            .by_id
            .values()
            .filter(|t| {
                filter.project.as_deref().is_none_or(|p| t.project == p)
                    && filter.status.is_none_or(|s| t.status == s)
                    && filter.category.is_none_or(|c| t.category == c)
                    && filter
                        .parent_id
                        .as_deref()
                        .is_none_or(|p| t.parent_id.as_deref() == Some(p))
            })
            .cloned()
            .collect();
        drop(index);

        tasks.sort_by(|a, b| b.updated.cmp(&a.updated).then_with(|| a.id.cmp(&b.id)));
        tasks.truncate(limit);
        Ok(tasks)
    }

    pub async fn get(&self, id: &str) -> Result<Task> {
        self.index
            .read()
            .await
            .by_id
            .get(id)
            .cloned()
            .ok_or_else(|| EngramError::not_found(id))
    }

    /// The task plus parent, siblings, children and up to ten other tasks
    /// from the same project.
    pub async fn get_context(&self, id: &str) -> Result<TaskContext> {
        let index = self.index.read().await;
        let task = index
            .by_id
            .get(id)
            .cloned()
            .ok_or_else(|| EngramError::not_found(id))?;

        let parent = task
            .parent_id
            .as_ref()
            .and_then(|pid| index.by_id.get(pid))
            .cloned();

        let mut siblings: Vec<Task> = index
            .by_project
            .get(&task.project)
            .into_iter()
            .flatten()
            .filter_map(|tid| index.by_id.get(tid))
            .filter(|t| t.id != task.id && t.parent_id == task.parent_id)
            .cloned()
            .collect();
        siblings.sort_by_key(|t| t.serial);

        let mut children: Vec<Task> = index
            .children
            .get(id)
            .into_iter()
            .flatten()
            .filter_map(|tid| index.by_id.get(tid))
            .cloned()
            .collect();
        children.sort_by_key(|t| t.serial);

        let nearby: HashSet<&str> = std::iter::once(task.id.as_str())
            .chain(parent.iter().map(|t| t.id.as_str()))
            .chain(siblings.iter().map(|t| t.id.as_str()))
            .chain(children.iter().map(|t| t.id.as_str()))
            .collect();
        let mut related: Vec<Task> = index
            .by_project
            .get(&task.project)
            .into_iter()
            .flatten()
            .filter_map(|tid| index.by_id.get(tid))
            .filter(|t| !nearby.contains(t.id.as_str()))
            .cloned()
            .collect();
        related.sort_by(|a, b| b.updated.cmp(&a.updated).then_with(|| a.id.cmp(&b.id)));
        related.truncate(10);

        Ok(TaskContext {
            task,
            parent,
            siblings,
            children,
            related,
        })
    }

    pub async fn count(&self) -> usize {
        self.index.read().await.by_id.len()
    }

    /// Full rescan of the task root, replacing the index.
    pub async fn rebuild_index(&self) -> Result<()> {
        let tasks = self.backend.load_all().await?;
        let mut fresh = TaskIndex::default();
        for task in tasks {
            if fresh.by_id.contains_key(&task.id) {
                tracing::warn!(id = %task.id, "duplicate task id skipped");
                continue;
            }
            fresh.insert(task);
        }
        *self.index.write().await = fresh;
        Ok(())
    }

    /// Convert every project under `root` from one layout to the other,
    /// deleting the old artifacts. Returns the number of migrated tasks.
    pub async fn migrate(
        root: &Path,
        from: TaskLayoutKind,
        to: TaskLayoutKind,
        ring: Arc<SelfWriteRing>,
    ) -> Result<usize> {
        if from == to {
            return Ok(0);
        }
        let source: Box<dyn LayoutBackend> = match from {
            TaskLayoutKind::Flat => Box::new(FlatLayout::new(root.to_path_buf(), ring.clone())),
            TaskLayoutKind::Markdown => {
                Box::new(MarkdownLayout::new(root.to_path_buf(), ring.clone()))
            }
        };
        let target: Box<dyn LayoutBackend> = match to {
            TaskLayoutKind::Flat => Box::new(FlatLayout::new(root.to_path_buf(), ring.clone())),
            TaskLayoutKind::Markdown => {
                Box::new(MarkdownLayout::new(root.to_path_buf(), ring.clone()))
            }
        };

        let tasks = source.load_all().await?;
        let mut by_project: HashMap<String, Vec<Task>> = HashMap::new();
        for task in tasks {
            by_project.entry(task.project.clone()).or_default().push(task);
        }

        let mut migrated = 0;
        for (project, mut tasks) in by_project {
            tasks.sort_by_key(|t| t.serial);
            migrated += tasks.len();
            target.persist_project(&project, &tasks).await?;
            remove_layout_artifacts(root, &project, from, &ring).await?;
        }
        Ok(migrated)
    }

    // ---- reconciliation (used by the watcher) ----------------------------

    /// Is `path` a task artifact this store owns?
    pub fn owns(&self, path: &Path) -> bool {
        if !path.starts_with(&self.root) {
            return false;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        match self.kind {
            TaskLayoutKind::Flat => name == "tasks.json",
            TaskLayoutKind::Markdown => name.starts_with("task-") && name.ends_with(".md"),
        }
    }

    /// External create/modify of a task artifact.
    pub async fn reconcile_upsert(&self, path: &Path) -> Result<()> {
        let raw = match fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        if self.ring.matches_write(path, &crate::model::hash_content(&raw)) {
            return Ok(());
        }
        let Some(project) = self.project_of(path) else {
            return Ok(());
        };

        match self.kind {
            TaskLayoutKind::Flat => {
                let parsed: Vec<Task> = match serde_json::from_str::<Vec<Task>>(&raw) {
                    Ok(tasks) => tasks
                        .into_iter()
                        .map(|mut t| {
                            t.project = project.clone();
                            t
                        })
                        .collect(),
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "skipping malformed tasks.json");
                        return Ok(());
                    }
                };
                self.apply_project_snapshot(&project, parsed).await;
            }
            TaskLayoutKind::Markdown => {
                let doc = match engram_fs::frontmatter::parse(&raw) {
                    Ok(doc) => doc,
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "skipping malformed task file");
                        return Ok(());
                    }
                };
                let task = match Task::from_document(&doc, &project) {
                    Ok(task) => task,
                    Err(reason) => {
                        tracing::warn!(path = %path.display(), %reason, "skipping invalid task file");
                        return Ok(());
                    }
                };
                let existing = self.index.read().await.by_id.get(&task.id).cloned();
                let mut index = self.index.write().await;
                index.insert(task.clone());
                drop(index);
                match existing {
                    None => self.bus.publish(
                        ChangeEvent::new(EventKind::TaskAdded, &task.id, &task.project)
                            .with_payload(task_payload(&task)),
                    ),
                    Some(previous) if previous != task => self.bus.publish(
                        ChangeEvent::new(EventKind::TaskUpdated, &task.id, &task.project)
                            .with_payload(task_payload(&task)),
                    ),
                    Some(_) => {}
                }
            }
        }
        Ok(())
    }

    /// External deletion of a task artifact.
    pub async fn reconcile_remove(&self, path: &Path) -> Result<()> {
        if self.ring.matches_delete(path) {
            return Ok(());
        }
        let Some(project) = self.project_of(path) else {
            return Ok(());
        };
        match self.kind {
            TaskLayoutKind::Flat => {
                // The whole project file is gone.
                self.apply_project_snapshot(&project, Vec::new()).await;
            }
            TaskLayoutKind::Markdown => {
                let Some(id) = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .and_then(|n| n.strip_prefix("task-"))
                    .and_then(|n| n.strip_suffix(".md"))
                else {
                    return Ok(());
                };
                let removed = self.index.write().await.remove(id);
                if let Some(task) = removed {
                    self.bus
                        .publish(ChangeEvent::new(EventKind::TaskDeleted, &task.id, &task.project));
                }
            }
        }
        Ok(())
    }

    /// Periodic sweep against the tree.
    pub async fn reconcile_full_scan(&self) -> Result<()> {
        let fresh = self.backend.load_all().await?;
        let mut seen = HashSet::new();
        let mut by_project: HashMap<String, Vec<Task>> = HashMap::new();
        for task in fresh {
            if seen.insert(task.id.clone()) {
                by_project.entry(task.project.clone()).or_default().push(task);
            }
        }

        let known_projects: Vec<String> = {
            let index = self.index.read().await;
            index.by_project.keys().cloned().collect()
        };
        for project in known_projects {
            by_project.entry(project).or_default();
        }

        for (project, tasks) in by_project {
            self.apply_project_snapshot(&project, tasks).await;
        }
        Ok(())
    }

    // ---- internals -------------------------------------------------------

    /// Replace one project's indexed tasks with a disk snapshot, emitting
    /// the difference as events.
    async fn apply_project_snapshot(&self, project: &str, tasks: Vec<Task>) {
        let mut added = Vec::new();
        let mut updated = Vec::new();
        let mut deleted = Vec::new();
        {
            let mut index = self.index.write().await;
            let fresh_ids: HashSet<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
            let stale: Vec<String> = index
                .by_project
                .get(project)
                .into_iter()
                .flatten()
                .filter(|id| !fresh_ids.contains(id.as_str()))
                .cloned()
                .collect();
            for id in stale {
                if let Some(task) = index.remove(&id) {
                    deleted.push(task);
                }
            }
            for task in tasks {
                match index.by_id.get(&task.id) {
                    None => {
                        index.insert(task.clone());
                        added.push(task);
                    }
                    Some(existing) if *existing != task => {
                        index.insert(task.clone());
                        updated.push(task);
                    }
                    Some(_) => {}
                }
            }
        }

        for task in added {
            self.bus.publish(
                ChangeEvent::new(EventKind::TaskAdded, &task.id, &task.project)
                    .with_payload(task_payload(&task)),
            );
        }
        for task in updated {
            self.bus.publish(
                ChangeEvent::new(EventKind::TaskUpdated, &task.id, &task.project)
                    .with_payload(task_payload(&task)),
            );
        }
        for task in deleted {
            self.bus
                .publish(ChangeEvent::new(EventKind::TaskDeleted, &task.id, &task.project));
        }
    }

    fn project_of(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.root).ok()?;
        let mut components = rel.components();
        let project = components.next()?.as_os_str().to_str()?.to_string();
        if components.next().is_none() || components.next().is_some() {
            return None;
        }
        if project.starts_with('.') {
            return None;
        }
        Some(project)
    }
}

fn collect_descendants(index: &TaskIndex, id: &str, out: &mut Vec<String>) {
    if let Some(children) = index.children.get(id) {
        let mut children: Vec<&String> = children.iter().collect();
        children.sort();
        for child in children {
            collect_descendants(index, child, out);
            out.push(child.clone());
        }
    }
}

/// Hierarchy validation shared by create and update.
///
/// * the parent must exist in the same project;
/// * the level ladder (`subtask < task < epic < master`) only admits a child
///   directly under the level above it;
/// * reparenting must not create a cycle.
fn validate_parent(
    index: &TaskIndex,
    project: &str,
    parent_id: Option<&str>,
    level: Option<TaskLevel>,
    self_id: Option<&str>,
) -> Result<()> {
    let Some(parent_id) = parent_id else {
        return Ok(());
    };

    if Some(parent_id) == self_id {
        return Err(EngramError::conflict("parent_id", "a task cannot parent itself"));
    }

    let parent = index
        .by_id
        .get(parent_id)
        .ok_or_else(|| EngramError::conflict("parent_id", format!("parent '{parent_id}' does not exist")))?;
    if parent.project != project {
        return Err(EngramError::conflict(
            "parent_id",
            format!("parent '{parent_id}' belongs to project '{}'", parent.project),
        ));
    }

    if let Some(level) = level {
        match level.required_parent() {
            None => {
                return Err(EngramError::conflict(
                    "parent_id",
                    "a master task cannot have a parent",
                ));
            }
            Some(required) => {
                if parent.level != Some(required) {
                    return Err(EngramError::conflict(
                        "parent_id",
                        format!(
                            "a {} may only nest under a {}, parent is {}",
                            level.as_str(),
                            required.as_str(),
                            parent.level.map_or("unleveled", TaskLevel::as_str),
                        ),
                    ));
                }
            }
        }
    }

    // Walk up from the parent; reaching self means the patch closes a loop.
    if let Some(self_id) = self_id {
        let mut cursor = Some(parent_id.to_string());
        let mut hops = 0;
        while let Some(current) = cursor {
            if current == self_id {
                return Err(EngramError::conflict("parent_id", "change would create a cycle"));
            }
            hops += 1;
            if hops > index.by_id.len() {
                return Err(EngramError::conflict("parent_id", "parent chain does not terminate"));
            }
            cursor = index.by_id.get(&current).and_then(|t| t.parent_id.clone());
        }
    }
    Ok(())
}

async fn refuse_mixed_layout(root: &Path, kind: TaskLayoutKind) -> Result<()> {
    let mut projects = fs::read_dir(root).await?;
    while let Some(project) = projects.next_entry().await? {
        if !project.file_type().await?.is_dir() {
            continue;
        }
        let dir_name = project.file_name().to_string_lossy().to_string();
        if dir_name.starts_with('.') {
            continue;
        }
        let mut files = fs::read_dir(project.path()).await?;
        while let Some(file) = files.next_entry().await? {
            let name = file.file_name().to_string_lossy().to_string();
            let foreign = match kind {
                TaskLayoutKind::Flat => name.starts_with("task-") && name.ends_with(".md"),
                TaskLayoutKind::Markdown => name == "tasks.json",
            };
            if foreign {
                return Err(EngramError::conflict(
                    "task_layout",
                    format!(
                        "project '{dir_name}' contains artifacts of the other task layout; run a migration first"
                    ),
                ));
            }
        }
    }
    Ok(())
}

async fn remove_layout_artifacts(
    root: &Path,
    project: &str,
    layout: TaskLayoutKind,
    ring: &SelfWriteRing,
) -> Result<()> {
    let dir = root.join(project);
    match layout {
        TaskLayoutKind::Flat => {
            let path = dir.join("tasks.json");
            ring.record_delete(&path);
            match fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        TaskLayoutKind::Markdown => {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let name = entry.file_name().to_string_lossy().to_string();
                if name.starts_with("task-") && name.ends_with(".md") {
                    ring.record_delete(&entry.path());
                    fs::remove_file(entry.path()).await?;
                }
            }
        }
    }
    Ok(())
}

fn task_payload(task: &Task) -> serde_json::Value {
    serde_json::to_value(task).unwrap_or(serde_json::Value::Null)
}
