//! Create a task.

use std::sync::Arc;

use schemars::JsonSchema;
use serde::Deserialize;

use crate::dispatch::{schema_of, typed_handler, Layer, ToolDef, ToolOutput};
use crate::engine::Engine;
use crate::error::Result;
use crate::model::{Category, MemoryConnection, TaskDraft, TaskLevel, TaskPriority};

use super::{record_json, validate_tags};

#[derive(Debug, Deserialize, JsonSchema)]
pub struct Params {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Project slug the task belongs to.
    pub project: String,
    #[serde(default)]
    pub category: Option<Category>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    /// One of: low, medium, high, urgent.
    #[serde(default)]
    pub priority: Option<TaskPriority>,
    /// Parent task id; must exist in the same project.
    #[serde(default)]
    pub parent_id: Option<String>,
    /// Hierarchy level (master/epic/task/subtask). A task may only nest
    /// directly under the level above it.
    #[serde(default)]
    pub level: Option<TaskLevel>,
    /// Links to supporting memories with a relevance in [0, 1].
    #[serde(default)]
    pub memory_connections: Option<Vec<MemoryConnection>>,
}

pub(crate) fn def() -> ToolDef {
    ToolDef {
        name: "create_task",
        description: "Create a task (status starts at todo). Supports the master/epic/task/subtask hierarchy and links to supporting memories.",
        layer: Layer::Tasks,
        schema: schema_of::<Params>(),
        handler: Some(typed_handler(execute)),
    }
}

async fn execute(engine: Arc<Engine>, params: Params) -> Result<ToolOutput> {
    let tags = params.tags.unwrap_or_default();
    validate_tags(&tags)?;

    let task = engine
        .tasks
        .create(TaskDraft {
            title: params.title,
            description: params.description.unwrap_or_default(),
            project: params.project,
            category: params.category,
            tags,
            priority: params.priority.unwrap_or_default(),
            parent_id: params.parent_id,
            level: params.level,
            memory_connections: params.memory_connections.unwrap_or_default(),
        })
        .await?;

    Ok(ToolOutput::text(format!(
        "✅ Task #{} created (id={}, project={})",
        task.serial, task.id, task.project
    ))
    .with_data(record_json(&task)))
}
