//! Memory store: one markdown file per memory, indexed in memory.
//!
//! The file tree is the source of truth; the index is derived and
//! rebuildable at any time. Writers serialize on a store-level gate while
//! readers share the index lock, so `list`/`search` run concurrently with
//! each other but never observe a half-applied mutation.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs;
use tokio::sync::{Mutex, RwLock};

use engram_fs::frontmatter;
use engram_fs::slug::sanitize_project;
use engram_fs::write_atomic;

use crate::bus::{ChangeBus, ChangeEvent, EventKind};
use crate::error::{EngramError, Result};
use crate::model::{hash_content, now_second, Category, Memory, MemoryPatch, MemoryStatus, Priority};
use crate::registry::ProjectRegistry;
use crate::search::{search as run_search, SearchQuery};
use crate::selfwrite::SelfWriteRing;
use crate::settings::SearchSettings;

/// Hard cap on `list` results.
pub const MAX_LIST_LIMIT: usize = 1000;

/// Hard cap on memory content length.
pub const MAX_CONTENT_LEN: usize = 100_000;

/// Directory (under the memory root) where duplicate-id files are moved.
const QUARANTINE_DIR: &str = ".quarantine";

#[derive(Default)]
struct MemoryIndex {
    by_id: HashMap<String, Memory>,
    path_of: HashMap<String, PathBuf>,
    id_at: HashMap<PathBuf, String>,
    by_project: HashMap<String, HashSet<String>>,
    by_tag: HashMap<String, HashSet<String>>,
}

impl MemoryIndex {
    fn insert(&mut self, memory: Memory, path: PathBuf) {
        self.remove(&memory.id);
        if let Some(previous) = self.id_at.get(&path).cloned() {
            if previous != memory.id {
                self.remove(&previous);
            }
        }
        self.by_project
            .entry(memory.project.clone())
            .or_default()
            .insert(memory.id.clone());
        for tag in &memory.tags {
            self.by_tag
                .entry(tag.clone())
                .or_default()
                .insert(memory.id.clone());
        }
        self.id_at.insert(path.clone(), memory.id.clone());
        self.path_of.insert(memory.id.clone(), path);
        self.by_id.insert(memory.id.clone(), memory);
    }

    fn remove(&mut self, id: &str) -> Option<(Memory, PathBuf)> {
        let memory = self.by_id.remove(id)?;
        let path = self.path_of.remove(id)?;
        self.id_at.remove(&path);
        if let Some(ids) = self.by_project.get_mut(&memory.project) {
            ids.remove(id);
            if ids.is_empty() {
                self.by_project.remove(&memory.project);
            }
        }
        for tag in &memory.tags {
            if let Some(ids) = self.by_tag.get_mut(tag) {
                ids.remove(id);
                if ids.is_empty() {
                    self.by_tag.remove(tag);
                }
            }
        }
        Some((memory, path))
    }
}

/// One duplicate-content group in a dedup plan.
#[derive(Debug, Clone, serde::Serialize)]
pub struct DedupGroup {
    pub content_hash: String,
    /// The oldest record of the group; it survives.
    pub keep: String,
    pub remove: Vec<String>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct DedupReport {
    pub groups: Vec<DedupGroup>,
    pub applied: bool,
    pub removed: usize,
}

pub struct MemoryStore {
    root: PathBuf,
    bus: Arc<ChangeBus>,
    ring: Arc<SelfWriteRing>,
    registry: Arc<ProjectRegistry>,
    index: RwLock<MemoryIndex>,
    /// Serializes writers; readers only contend on the index lock.
    write_gate: Mutex<()>,
}

impl MemoryStore {
    pub async fn open(
        root: PathBuf,
        bus: Arc<ChangeBus>,
        ring: Arc<SelfWriteRing>,
        registry: Arc<ProjectRegistry>,
    ) -> Result<Self> {
        fs::create_dir_all(&root).await?;
        let store = Self {
            root,
            bus,
            ring,
            registry,
            index: RwLock::new(MemoryIndex::default()),
            write_gate: Mutex::new(()),
        };
        store.rebuild_index().await?;
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Store a new memory. Assigns id, timestamps and content hash, writes
    /// the file atomically, indexes it and emits `memory-added`.
    pub async fn add(
        &self,
        content: String,
        project: Option<String>,
        category: Option<Category>,
        tags: Vec<String>,
        priority: Option<Priority>,
        status: Option<MemoryStatus>,
    ) -> Result<Memory> {
        if content.trim().is_empty() {
            return Err(EngramError::invalid_input("content", "must not be empty"));
        }
        if content.len() > MAX_CONTENT_LEN {
            return Err(EngramError::invalid_input(
                "content",
                format!("exceeds {MAX_CONTENT_LEN} bytes"),
            ));
        }

        let slug = sanitize_project(project.as_deref().unwrap_or_default());
        let project = self.registry.ensure(&slug).await?;

        let memory = Memory::new(
            content,
            project,
            category.unwrap_or_default(),
            tags,
            priority.unwrap_or_default(),
            status.unwrap_or_default(),
        );

        let _gate = self.write_gate.lock().await;
        let path = self.record_path(&memory);
        self.write_record(&memory, &path).await?;
        self.index.write().await.insert(memory.clone(), path);

        self.bus.publish(
            ChangeEvent::new(EventKind::MemoryAdded, &memory.id, &memory.project)
                .with_payload(record_payload(&memory)),
        );
        Ok(memory)
    }

    /// Fetch a memory by id, bumping its access counters write-through.
    pub async fn get(&self, id: &str) -> Result<Memory> {
        let _gate = self.write_gate.lock().await;
        let (mut memory, path) = {
            let index = self.index.read().await;
            let memory = index.by_id.get(id).ok_or_else(|| EngramError::not_found(id))?;
            let path = index
                .path_of
                .get(id)
                .cloned()
                .ok_or_else(|| EngramError::not_found(id))?;
            (memory.clone(), path)
        };

        memory.access_count += 1;
        memory.last_accessed = now_second();
        self.write_record(&memory, &path).await?;
        self.index.write().await.insert(memory.clone(), path);
        Ok(memory)
    }

    /// Newest-first listing. Ties break on id so the order is stable.
    pub async fn list(&self, project: Option<&str>, limit: Option<usize>) -> Result<Vec<Memory>> {
        if let Some(limit) = limit {
            if limit > MAX_LIST_LIMIT {
                return Err(EngramError::invalid_input(
                    "limit",
                    format!("must be <= {MAX_LIST_LIMIT}"),
                ));
            }
        }
        let limit = limit.unwrap_or(MAX_LIST_LIMIT);

        let index = self.index.read().await;
        let mut records: Vec<Memory> = match project {
            Some(project) => index
                .by_project
                .get(project)
                .into_iter()
                .flatten()
                .filter_map(|id| index.by_id.get(id))
                .cloned()
                .collect(),
            None => index.by_id.values().cloned().collect(),
        };
        drop(index);

        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.id.cmp(&b.id)));
        records.truncate(limit);
        Ok(records)
    }

    /// Ranked search over the index. Hits get an in-memory access bump; the
    /// files are not rewritten (index-tree parity is defined modulo the
    /// access counters).
    pub async fn search(
        &self,
        query: &SearchQuery,
        tuning: &SearchSettings,
    ) -> Result<Vec<(Memory, f64)>> {
        let index = self.index.read().await;
        let records: Vec<&Memory> = index.by_id.values().collect();
        let hits: Vec<(Memory, f64)> = run_search(&records, query, tuning, now_second())
            .into_iter()
            .map(|(m, score)| (m.clone(), score))
            .collect();
        drop(index);

        if !hits.is_empty() {
            let now = now_second();
            let mut index = self.index.write().await;
            for (memory, _) in &hits {
                if let Some(entry) = index.by_id.get_mut(&memory.id) {
                    entry.access_count += 1;
                    entry.last_accessed = now;
                }
            }
        }
        Ok(hits)
    }

    /// Partial update. `id`, `timestamp` and `content_hash` are
    /// system-managed; a project change moves the file to the new directory.
    pub async fn update(&self, id: &str, patch: MemoryPatch) -> Result<Memory> {
        if patch.is_empty() {
            return Err(EngramError::invalid_input("patch", "no fields to update"));
        }
        if let Some(content) = &patch.content {
            if content.trim().is_empty() {
                return Err(EngramError::invalid_input("content", "must not be empty"));
            }
            if content.len() > MAX_CONTENT_LEN {
                return Err(EngramError::invalid_input(
                    "content",
                    format!("exceeds {MAX_CONTENT_LEN} bytes"),
                ));
            }
        }

        let _gate = self.write_gate.lock().await;
        let (mut memory, old_path) = {
            let index = self.index.read().await;
            let memory = index.by_id.get(id).ok_or_else(|| EngramError::not_found(id))?;
            let path = index
                .path_of
                .get(id)
                .cloned()
                .ok_or_else(|| EngramError::not_found(id))?;
            (memory.clone(), path)
        };

        let mut content_changed = false;
        if let Some(content) = patch.content {
            content_changed = content != memory.content;
            memory.content = content;
        }
        if let Some(category) = patch.category {
            memory.category = category;
        }
        if let Some(tags) = patch.tags {
            memory.tags = crate::model::normalize_tags(tags);
        }
        if let Some(priority) = patch.priority {
            memory.priority = priority;
        }
        if let Some(status) = patch.status {
            memory.status = status;
        }
        if let Some(related) = patch.related_memories {
            memory.related_memories = related;
        }
        if content_changed {
            memory.refresh_derived();
        }

        let mut path = old_path.clone();
        if let Some(project) = patch.project {
            let slug = sanitize_project(&project);
            if slug != memory.project {
                memory.project = self.registry.ensure(&slug).await?;
                path = self.record_path(&memory);
            }
        }

        self.write_record(&memory, &path).await?;
        if path != old_path {
            self.ring.record_delete(&old_path);
            match fs::remove_file(&old_path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        self.index.write().await.insert(memory.clone(), path);

        self.bus.publish(
            ChangeEvent::new(EventKind::MemoryUpdated, &memory.id, &memory.project)
                .with_payload(record_payload(&memory)),
        );
        Ok(memory)
    }

    /// Remove the file, evict the index entry and emit `memory-deleted`.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let _gate = self.write_gate.lock().await;
        let removed = self.index.write().await.remove(id);
        let Some((memory, path)) = removed else {
            return Err(EngramError::not_found(id));
        };

        self.ring.record_delete(&path);
        match fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        self.bus
            .publish(ChangeEvent::new(EventKind::MemoryDeleted, &memory.id, &memory.project));
        Ok(())
    }

    /// Group by content hash and plan removals: each group keeps its oldest
    /// record. Files are only touched when `apply` is set.
    pub async fn dedup(&self, apply: bool) -> Result<DedupReport> {
        let mut by_hash: HashMap<String, Vec<(chrono::DateTime<chrono::Utc>, String)>> =
            HashMap::new();
        {
            let index = self.index.read().await;
            for memory in index.by_id.values() {
                by_hash
                    .entry(memory.content_hash.clone())
                    .or_default()
                    .push((memory.timestamp, memory.id.clone()));
            }
        }

        let mut groups: Vec<DedupGroup> = by_hash
            .into_iter()
            .filter(|(_, members)| members.len() > 1)
            .map(|(content_hash, mut members)| {
                members.sort();
                let keep = members[0].1.clone();
                let remove = members[1..].iter().map(|(_, id)| id.clone()).collect();
                DedupGroup {
                    content_hash,
                    keep,
                    remove,
                }
            })
            .collect();
        groups.sort_by(|a, b| a.content_hash.cmp(&b.content_hash));

        let mut removed = 0;
        if apply {
            for group in &groups {
                for id in &group.remove {
                    match self.delete(id).await {
                        Ok(()) => removed += 1,
                        Err(EngramError::NotFound { .. }) => {}
                        Err(e) => return Err(e),
                    }
                }
            }
        }

        Ok(DedupReport {
            groups,
            applied: apply,
            removed,
        })
    }

    /// Full rescan of the file tree, replacing the index. Duplicate ids are
    /// resolved by keeping the lexicographically-first filename and moving
    /// the rest into the quarantine directory.
    pub async fn rebuild_index(&self) -> Result<()> {
        let _gate = self.write_gate.lock().await;
        let fresh = self.scan_tree(true).await?;
        *self.index.write().await = fresh;
        Ok(())
    }

    pub async fn count(&self) -> usize {
        self.index.read().await.by_id.len()
    }

    pub async fn projects(&self) -> Vec<String> {
        let mut projects: Vec<String> =
            self.index.read().await.by_project.keys().cloned().collect();
        projects.sort();
        projects
    }

    /// Read without bumping access counters (internal consumers).
    pub async fn peek(&self, id: &str) -> Option<Memory> {
        self.index.read().await.by_id.get(id).cloned()
    }

    // ---- reconciliation (used by the watcher) ----------------------------

    /// An external create/modify event for `path`. Self-writes are dropped
    /// against the ring; everything else reconciles the index and emits the
    /// matching event.
    pub async fn reconcile_upsert(&self, path: &Path) -> Result<()> {
        let raw = match fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        if self.ring.matches_write(path, &hash_content(&raw)) {
            return Ok(());
        }
        let Some(project) = self.project_of(path) else {
            return Ok(());
        };

        let doc = match frontmatter::parse(&raw) {
            Ok(doc) => doc,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping malformed memory file");
                return Ok(());
            }
        };
        let memory = match Memory::from_document(&doc, &project) {
            Ok(memory) => memory,
            Err(reason) => {
                tracing::warn!(path = %path.display(), %reason, "skipping invalid memory file");
                return Ok(());
            }
        };

        let mut index = self.index.write().await;
        let previous_id = index.id_at.get(path).cloned();
        match previous_id {
            Some(old_id) if old_id == memory.id => {
                let unchanged = index
                    .by_id
                    .get(&old_id)
                    .map(|existing| records_equivalent(existing, &memory))
                    .unwrap_or(false);
                index.insert(memory.clone(), path.to_path_buf());
                drop(index);
                if !unchanged {
                    self.bus.publish(
                        ChangeEvent::new(EventKind::MemoryUpdated, &memory.id, &memory.project)
                            .with_payload(record_payload(&memory)),
                    );
                }
            }
            Some(old_id) => {
                // The file now carries a different id: delete + add.
                let old = index.remove(&old_id);
                index.insert(memory.clone(), path.to_path_buf());
                drop(index);
                if let Some((old_memory, _)) = old {
                    self.bus.publish(ChangeEvent::new(
                        EventKind::MemoryDeleted,
                        &old_memory.id,
                        &old_memory.project,
                    ));
                }
                self.bus.publish(
                    ChangeEvent::new(EventKind::MemoryAdded, &memory.id, &memory.project)
                        .with_payload(record_payload(&memory)),
                );
            }
            None => {
                if index.by_id.contains_key(&memory.id) {
                    tracing::warn!(
                        id = %memory.id,
                        path = %path.display(),
                        "duplicate id appeared at a second path; ignoring the newcomer"
                    );
                    return Ok(());
                }
                index.insert(memory.clone(), path.to_path_buf());
                drop(index);
                self.bus.publish(
                    ChangeEvent::new(EventKind::MemoryAdded, &memory.id, &memory.project)
                        .with_payload(record_payload(&memory)),
                );
            }
        }
        Ok(())
    }

    /// An external deletion event for `path`.
    pub async fn reconcile_remove(&self, path: &Path) -> Result<()> {
        if self.ring.matches_delete(path) {
            return Ok(());
        }
        let removed = {
            let mut index = self.index.write().await;
            let id = index.id_at.get(path).cloned();
            id.and_then(|id| index.remove(&id))
        };
        if let Some((memory, _)) = removed {
            self.bus
                .publish(ChangeEvent::new(EventKind::MemoryDeleted, &memory.id, &memory.project));
        }
        Ok(())
    }

    /// Periodic sweep: rescan the tree and emit events for anything the
    /// per-path watcher missed.
    pub async fn reconcile_full_scan(&self) -> Result<()> {
        let fresh = self.scan_tree(false).await?;

        let mut added = Vec::new();
        let mut updated = Vec::new();
        let mut deleted = Vec::new();
        {
            let mut index = self.index.write().await;
            for (id, memory) in &fresh.by_id {
                match index.by_id.get(id) {
                    None => added.push(memory.clone()),
                    Some(existing) if !records_equivalent(existing, memory) => {
                        updated.push(memory.clone())
                    }
                    Some(_) => continue,
                }
            }
            let missing: Vec<String> = index
                .by_id
                .keys()
                .filter(|id| !fresh.by_id.contains_key(*id))
                .cloned()
                .collect();
            for id in &missing {
                if let Some((memory, _)) = index.remove(id) {
                    deleted.push(memory);
                }
            }
            for memory in added.iter().chain(updated.iter()) {
                if let Some(path) = fresh.path_of.get(&memory.id) {
                    index.insert(memory.clone(), path.clone());
                }
            }
        }

        for memory in added {
            self.bus.publish(
                ChangeEvent::new(EventKind::MemoryAdded, &memory.id, &memory.project)
                    .with_payload(record_payload(&memory)),
            );
        }
        for memory in updated {
            self.bus.publish(
                ChangeEvent::new(EventKind::MemoryUpdated, &memory.id, &memory.project)
                    .with_payload(record_payload(&memory)),
            );
        }
        for memory in deleted {
            self.bus
                .publish(ChangeEvent::new(EventKind::MemoryDeleted, &memory.id, &memory.project));
        }
        Ok(())
    }

    /// Is `path` a memory file this store owns?
    pub fn owns(&self, path: &Path) -> bool {
        path.starts_with(&self.root)
            && path.extension().map(|e| e == "md").unwrap_or(false)
            && self.project_of(path).is_some()
    }

    // ---- internals -------------------------------------------------------

    fn record_path(&self, memory: &Memory) -> PathBuf {
        self.root.join(&memory.project).join(memory.file_name())
    }

    /// Project slug for a file directly under `<root>/<project>/`. Hidden
    /// directories (quarantine included) don't count.
    fn project_of(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.root).ok()?;
        let mut components = rel.components();
        let project = components.next()?.as_os_str().to_str()?.to_string();
        // Exactly <project>/<file>.md
        if components.next().is_none() || components.next().is_some() {
            return None;
        }
        if project.starts_with('.') {
            return None;
        }
        Some(project)
    }

    async fn write_record(&self, memory: &Memory, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let doc = memory.to_document();
        let raw = frontmatter::serialize(&doc.metadata, &doc.body);
        // Record before writing so the watcher can never race the ring.
        self.ring.record_write(path, &hash_content(&raw));
        write_atomic(path, &raw).await?;
        Ok(())
    }

    /// Walk `<root>/<project>/*.md` in lexicographic order and build a fresh
    /// index. With `quarantine` set, files repeating an already-seen id are
    /// moved aside; otherwise they are skipped.
    async fn scan_tree(&self, quarantine: bool) -> Result<MemoryIndex> {
        let mut index = MemoryIndex::default();

        let mut projects = Vec::new();
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') {
                continue;
            }
            if entry.file_type().await?.is_dir() {
                projects.push(name);
            }
        }
        projects.sort();

        for project in projects {
            let dir = self.root.join(&project);
            let mut files = Vec::new();
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let name = entry.file_name().to_string_lossy().to_string();
                if name.starts_with('.') || !name.ends_with(".md") {
                    continue;
                }
                if entry.file_type().await?.is_file() {
                    files.push(name);
                }
            }
            files.sort();

            for name in files {
                let path = dir.join(&name);
                let raw = match fs::read_to_string(&path).await {
                    Ok(raw) => raw,
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "unreadable memory file skipped");
                        continue;
                    }
                };
                let doc = match frontmatter::parse(&raw) {
                    Ok(doc) => doc,
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "malformed memory file skipped");
                        continue;
                    }
                };
                let memory = match Memory::from_document(&doc, &project) {
                    Ok(memory) => memory,
                    Err(reason) => {
                        tracing::warn!(path = %path.display(), %reason, "invalid memory file skipped");
                        continue;
                    }
                };

                if index.by_id.contains_key(&memory.id) {
                    tracing::warn!(id = %memory.id, path = %path.display(), "duplicate memory id");
                    if quarantine {
                        self.quarantine_file(&project, &path).await;
                    }
                    continue;
                }
                index.insert(memory, path);
            }
        }
        Ok(index)
    }

    async fn quarantine_file(&self, project: &str, path: &Path) {
        let quarantine = self.root.join(QUARANTINE_DIR);
        if let Err(e) = fs::create_dir_all(&quarantine).await {
            tracing::warn!(error = %e, "cannot create quarantine directory");
            return;
        }
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "unknown.md".to_string());
        let target = quarantine.join(format!("{project}--{file_name}"));
        self.ring.record_delete(path);
        if let Err(e) = fs::rename(path, &target).await {
            tracing::warn!(path = %path.display(), error = %e, "failed to quarantine duplicate");
        } else {
            tracing::warn!(path = %path.display(), target = %target.display(), "quarantined duplicate memory file");
        }
    }
}

fn record_payload(memory: &Memory) -> serde_json::Value {
    serde_json::to_value(memory).unwrap_or(serde_json::Value::Null)
}

/// Equality ignoring the access counters, which legitimately drift between
/// the index and the tree.
fn records_equivalent(a: &Memory, b: &Memory) -> bool {
    a.id == b.id
        && a.timestamp == b.timestamp
        && a.content == b.content
        && a.project == b.project
        && a.category == b.category
        && a.tags == b.tags
        && a.priority == b.priority
        && a.status == b.status
        && a.related_memories == b.related_memories
        && a.content_hash == b.content_hash
}
