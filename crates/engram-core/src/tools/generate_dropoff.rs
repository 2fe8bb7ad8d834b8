//! Session handoff document.

use std::sync::Arc;

use schemars::JsonSchema;
use serde::Deserialize;

use crate::dispatch::{schema_of, typed_handler, Layer, ToolDef, ToolOutput};
use crate::dropoff;
use crate::engine::Engine;
use crate::error::Result;
use crate::store::TaskFilter;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct Params {
    /// One paragraph describing where this session left off.
    #[serde(default)]
    pub session_summary: Option<String>,
    /// How many recent memories to include (default 5).
    #[serde(default)]
    pub recent_memory_count: Option<usize>,
    /// How many recently-updated tasks to include (default 10).
    #[serde(default)]
    pub recent_task_count: Option<usize>,
}

pub(crate) fn def() -> ToolDef {
    ToolDef {
        name: "generate_dropoff",
        description: "Write a markdown session-handoff document with the most recent memories, the freshest tasks and host info. Read-only apart from the dropoff file itself.",
        layer: Layer::Session,
        schema: schema_of::<Params>(),
        handler: Some(typed_handler(execute)),
    }
}

async fn execute(engine: Arc<Engine>, params: Params) -> Result<ToolOutput> {
    let memory_count = params
        .recent_memory_count
        .unwrap_or(dropoff::DEFAULT_RECENT_MEMORIES)
        .min(50);
    let task_count = params
        .recent_task_count
        .unwrap_or(dropoff::DEFAULT_RECENT_TASKS)
        .min(50);
    let summary = params
        .session_summary
        .unwrap_or_else(|| "(no summary provided)".to_string());

    let memories = engine.memories.list(None, Some(memory_count)).await?;
    let tasks = engine
        .tasks
        .list(&TaskFilter {
            limit: Some(task_count),
            ..TaskFilter::default()
        })
        .await?;

    let (path, _body) =
        dropoff::generate(&engine.paths.dropoffs, &summary, &memories, &tasks).await?;

    Ok(ToolOutput::text(format!(
        "📝 Session dropoff written to {} ({} memories, {} tasks)",
        path.display(),
        memories.len(),
        tasks.len()
    ))
    .with_data(serde_json::json!({
        "path": path.display().to_string(),
        "memory_count": memories.len(),
        "task_count": tasks.len(),
    })))
}
