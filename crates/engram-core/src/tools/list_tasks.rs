//! List tasks, most recently updated first.

use std::sync::Arc;

use schemars::JsonSchema;
use serde::Deserialize;

use crate::dispatch::{schema_of, typed_handler, Layer, ToolDef, ToolOutput};
use crate::engine::Engine;
use crate::error::Result;
use crate::model::{Category, TaskStatus};
use crate::store::TaskFilter;

use super::record_json;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct Params {
    #[serde(default)]
    pub project: Option<String>,
    /// One of: todo, in_progress, done, blocked.
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub category: Option<Category>,
    /// Only direct children of this task.
    #[serde(default)]
    pub parent_id: Option<String>,
    /// Maximum records to return (1–1000).
    #[serde(default)]
    pub limit: Option<usize>,
}

pub(crate) fn def() -> ToolDef {
    ToolDef {
        name: "list_tasks",
        description: "List tasks sorted by last update, with project/status/category/parent filters.",
        layer: Layer::Tasks,
        schema: schema_of::<Params>(),
        handler: Some(typed_handler(execute)),
    }
}

async fn execute(engine: Arc<Engine>, params: Params) -> Result<ToolOutput> {
    let tasks = engine
        .tasks
        .list(&TaskFilter {
            project: params.project,
            status: params.status,
            category: params.category,
            parent_id: params.parent_id,
            limit: params.limit,
        })
        .await?;

    let mut lines = vec![format!("🗂️ {} task(s)", tasks.len())];
    for task in tasks.iter().take(20) {
        lines.push(format!(
            "- [{}] #{} {} ({}, {})",
            task.status.as_str(),
            task.serial,
            task.title,
            task.project,
            task.priority.as_str(),
        ));
    }
    if tasks.len() > 20 {
        lines.push(format!("… and {} more", tasks.len() - 20));
    }

    Ok(ToolOutput::text(lines.join("\n")).with_data(record_json(&tasks)))
}
