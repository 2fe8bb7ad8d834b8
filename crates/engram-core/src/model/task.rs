//! The task record and its hierarchy rules.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use engram_fs::frontmatter::{Document, Frontmatter, Scalar};

use super::{format_instant, normalize_tags, now_second, parse_instant, Category};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Todo,
    InProgress,
    Done,
    Blocked,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Todo => "todo",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Done => "done",
            TaskStatus::Blocked => "blocked",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "todo" => Some(TaskStatus::Todo),
            "in_progress" => Some(TaskStatus::InProgress),
            "done" => Some(TaskStatus::Done),
            "blocked" => Some(TaskStatus::Blocked),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl TaskPriority {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskPriority::Low => "low",
            TaskPriority::Medium => "medium",
            TaskPriority::High => "high",
            TaskPriority::Urgent => "urgent",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(TaskPriority::Low),
            "medium" => Some(TaskPriority::Medium),
            "high" => Some(TaskPriority::High),
            "urgent" => Some(TaskPriority::Urgent),
            _ => None,
        }
    }
}

/// Hierarchy level for the four-tier task model. When present, a child may
/// only nest directly under the level above it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum TaskLevel {
    Master,
    Epic,
    Task,
    Subtask,
}

impl TaskLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskLevel::Master => "master",
            TaskLevel::Epic => "epic",
            TaskLevel::Task => "task",
            TaskLevel::Subtask => "subtask",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "master" => Some(TaskLevel::Master),
            "epic" => Some(TaskLevel::Epic),
            "task" => Some(TaskLevel::Task),
            "subtask" => Some(TaskLevel::Subtask),
            _ => None,
        }
    }

    /// The only level allowed as direct parent of `self`.
    pub fn required_parent(self) -> Option<TaskLevel> {
        match self {
            TaskLevel::Master => None,
            TaskLevel::Epic => Some(TaskLevel::Master),
            TaskLevel::Task => Some(TaskLevel::Epic),
            TaskLevel::Subtask => Some(TaskLevel::Task),
        }
    }
}

/// A link from a task to a supporting memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MemoryConnection {
    pub memory_id: String,
    pub connection_type: String,
    /// Relevance in `[0, 1]`.
    pub relevance: f64,
}

/// A work item. Persisted either as an entry of the project's `tasks.json`
/// array or as its own `task-<id>.md` file, depending on the layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    /// Short human-facing identifier, monotonic per project.
    pub serial: u64,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: TaskPriority,
    pub project: String,
    #[serde(default)]
    pub category: Category,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub memory_connections: Vec<MemoryConnection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<TaskLevel>,
}

/// Input for `create_task`.
#[derive(Debug, Clone, Default)]
pub struct TaskDraft {
    pub title: String,
    pub description: String,
    pub project: String,
    pub category: Option<Category>,
    pub tags: Vec<String>,
    pub priority: TaskPriority,
    pub parent_id: Option<String>,
    pub level: Option<TaskLevel>,
    pub memory_connections: Vec<MemoryConnection>,
}

/// Partial update accepted by `update_task`. `parent_id` is doubly optional
/// so a patch can distinguish "leave alone" from "clear".
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub category: Option<Category>,
    pub tags: Option<Vec<String>>,
    #[serde(default, with = "double_option")]
    #[schemars(with = "Option<String>")]
    pub parent_id: Option<Option<String>>,
    pub level: Option<TaskLevel>,
    pub memory_connections: Option<Vec<MemoryConnection>>,
}

/// Serde helper: absent ⇒ `None`, `null` ⇒ `Some(None)`, value ⇒ `Some(Some(v))`.
mod double_option {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn deserialize<'de, D>(de: D) -> Result<Option<Option<String>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(de).map(Some)
    }

    pub fn serialize<S>(value: &Option<Option<String>>, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(inner) => inner.serialize(s),
            None => s.serialize_none(),
        }
    }
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.status.is_none()
            && self.priority.is_none()
            && self.category.is_none()
            && self.tags.is_none()
            && self.parent_id.is_none()
            && self.level.is_none()
            && self.memory_connections.is_none()
    }
}

impl Task {
    pub fn from_draft(draft: TaskDraft, serial: u64) -> Self {
        let now = now_second();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            serial,
            title: draft.title,
            description: draft.description,
            status: TaskStatus::Todo,
            priority: draft.priority,
            project: draft.project,
            category: draft.category.unwrap_or(Category::Work),
            tags: normalize_tags(draft.tags),
            created: now,
            updated: now,
            parent_id: draft.parent_id,
            memory_connections: draft.memory_connections,
            level: draft.level,
        }
    }

    pub fn file_name(&self) -> String {
        format!("task-{}.md", self.id)
    }

    pub fn to_document(&self) -> Document {
        let mut metadata = Frontmatter::new();
        metadata.insert("id".into(), Scalar::Str(self.id.clone()));
        metadata.insert("serial".into(), Scalar::Int(self.serial as i64));
        metadata.insert("title".into(), Scalar::Str(self.title.clone()));
        metadata.insert("status".into(), Scalar::Str(self.status.as_str().into()));
        metadata.insert("priority".into(), Scalar::Str(self.priority.as_str().into()));
        metadata.insert("project".into(), Scalar::Str(self.project.clone()));
        metadata.insert("category".into(), Scalar::Str(self.category.as_str().into()));
        metadata.insert("tags".into(), Scalar::List(self.tags.clone()));
        metadata.insert("created".into(), Scalar::Str(format_instant(self.created)));
        metadata.insert("updated".into(), Scalar::Str(format_instant(self.updated)));
        if let Some(parent) = &self.parent_id {
            metadata.insert("parent_id".into(), Scalar::Str(parent.clone()));
        }
        if let Some(level) = self.level {
            metadata.insert("level".into(), Scalar::Str(level.as_str().into()));
        }
        if !self.memory_connections.is_empty() {
            metadata.insert(
                "memory_connections".into(),
                Scalar::List(
                    self.memory_connections
                        .iter()
                        .map(encode_connection)
                        .collect(),
                ),
            );
        }
        Document {
            metadata,
            body: self.description.clone(),
        }
    }

    pub fn from_document(doc: &Document, directory_project: &str) -> Result<Self, String> {
        let meta = &doc.metadata;
        let id = meta
            .get("id")
            .and_then(Scalar::as_str)
            .filter(|s| !s.is_empty())
            .ok_or("missing 'id' field")?
            .to_string();
        let title = meta
            .get("title")
            .and_then(Scalar::as_str)
            .ok_or("missing 'title' field")?
            .to_string();
        let created = meta
            .get("created")
            .and_then(Scalar::as_str)
            .and_then(parse_instant)
            .ok_or("missing or invalid 'created' field")?;
        let updated = meta
            .get("updated")
            .and_then(Scalar::as_str)
            .and_then(parse_instant)
            .unwrap_or(created);

        let serial = meta
            .get("serial")
            .and_then(Scalar::as_int)
            .unwrap_or(0)
            .max(0) as u64;

        let status = match meta.get("status").and_then(Scalar::as_str) {
            Some(s) => TaskStatus::parse(s).ok_or_else(|| format!("unknown status '{s}'"))?,
            None => TaskStatus::default(),
        };
        let priority = match meta.get("priority").and_then(Scalar::as_str) {
            Some(s) => TaskPriority::parse(s).ok_or_else(|| format!("unknown priority '{s}'"))?,
            None => TaskPriority::default(),
        };
        let category = match meta.get("category").and_then(Scalar::as_str) {
            Some(s) => Category::parse(s).ok_or_else(|| format!("unknown category '{s}'"))?,
            None => Category::Work,
        };
        let level = match meta.get("level").and_then(Scalar::as_str) {
            Some(s) => Some(TaskLevel::parse(s).ok_or_else(|| format!("unknown level '{s}'"))?),
            None => None,
        };

        let tags = meta
            .get("tags")
            .and_then(Scalar::as_list)
            .map(|t| normalize_tags(t.to_vec()))
            .unwrap_or_default();

        let memory_connections = meta
            .get("memory_connections")
            .and_then(Scalar::as_list)
            .map(|items| items.iter().filter_map(|s| decode_connection(s)).collect())
            .unwrap_or_default();

        let parent_id = meta
            .get("parent_id")
            .and_then(Scalar::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        Ok(Self {
            id,
            serial,
            title,
            description: doc.body.clone(),
            status,
            priority,
            project: directory_project.to_string(),
            category,
            tags,
            created,
            updated,
            parent_id,
            memory_connections,
            level,
        })
    }
}

/// Connections flatten into the list grammar as `memory_id|type|relevance`.
fn encode_connection(c: &MemoryConnection) -> String {
    format!("{}|{}|{:.3}", c.memory_id, c.connection_type, c.relevance)
}

fn decode_connection(s: &str) -> Option<MemoryConnection> {
    let mut parts = s.splitn(3, '|');
    let memory_id = parts.next()?.to_string();
    let connection_type = parts.next()?.to_string();
    let relevance = parts.next()?.parse::<f64>().ok()?.clamp(0.0, 1.0);
    Some(MemoryConnection {
        memory_id,
        connection_type,
        relevance,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(title: &str) -> TaskDraft {
        TaskDraft {
            title: title.into(),
            description: "details".into(),
            project: "engram".into(),
            priority: TaskPriority::High,
            ..TaskDraft::default()
        }
    }

    #[test]
    fn new_tasks_start_in_todo() {
        let task = Task::from_draft(draft("Ship parser"), 1);
        assert_eq!(task.status, TaskStatus::Todo);
        assert_eq!(task.serial, 1);
        assert_eq!(task.created, task.updated);
    }

    #[test]
    fn level_parenting_rules() {
        assert_eq!(TaskLevel::Epic.required_parent(), Some(TaskLevel::Master));
        assert_eq!(TaskLevel::Task.required_parent(), Some(TaskLevel::Epic));
        assert_eq!(TaskLevel::Subtask.required_parent(), Some(TaskLevel::Task));
        assert_eq!(TaskLevel::Master.required_parent(), None);
    }

    #[test]
    fn markdown_document_round_trip() {
        let mut task = Task::from_draft(draft("Ship parser"), 3);
        task.parent_id = Some("parent-id".into());
        task.level = Some(TaskLevel::Task);
        task.memory_connections.push(MemoryConnection {
            memory_id: "mem-1".into(),
            connection_type: "research".into(),
            relevance: 0.75,
        });

        let doc = task.to_document();
        let raw = engram_fs::frontmatter::serialize(&doc.metadata, &doc.body);
        let parsed = engram_fs::frontmatter::parse(&raw).unwrap();
        let back = Task::from_document(&parsed, "engram").unwrap();
        assert_eq!(back, task);
    }

    #[test]
    fn json_round_trip_for_flat_layout() {
        let task = Task::from_draft(draft("Ship parser"), 7);
        let json = serde_json::to_string(&task).unwrap();
        let back: Task = serde_json::from_str(&json).unwrap();
        assert_eq!(back, task);
    }

    #[test]
    fn patch_distinguishes_clearing_parent_from_leaving_it() {
        let absent: TaskPatch = serde_json::from_str(r#"{"title": "x"}"#).unwrap();
        assert_eq!(absent.parent_id, None);

        let cleared: TaskPatch = serde_json::from_str(r#"{"parent_id": null}"#).unwrap();
        assert_eq!(cleared.parent_id, Some(None));

        let set: TaskPatch = serde_json::from_str(r#"{"parent_id": "abc"}"#).unwrap();
        assert_eq!(set.parent_id, Some(Some("abc".into())));
    }

    #[test]
    fn connection_encoding_survives_round_trip() {
        let c = MemoryConnection {
            memory_id: "id-1".into(),
            connection_type: "reference".into(),
            relevance: 0.5,
        };
        let decoded = decode_connection(&encode_connection(&c)).unwrap();
        assert_eq!(decoded.memory_id, c.memory_id);
        assert!((decoded.relevance - 0.5).abs() < 1e-9);
    }
}
