//! Store a new memory.

use std::sync::Arc;

use schemars::JsonSchema;
use serde::Deserialize;

use crate::dispatch::{schema_of, typed_handler, Layer, ToolDef, ToolOutput};
use crate::engine::Engine;
use crate::error::Result;
use crate::model::{Category, MemoryStatus, Priority};

use super::{record_json, validate_tags};

#[derive(Debug, Deserialize, JsonSchema)]
pub struct Params {
    /// The memory content (markdown). First line doubles as the title.
    pub content: String,
    /// Project slug; free-form names are sanitized, empty falls back to "default".
    #[serde(default)]
    pub project: Option<String>,
    /// One of: personal, work, code, research, conversations, preferences.
    #[serde(default)]
    pub category: Option<Category>,
    /// Short labels; lowercased and de-duplicated.
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub status: Option<MemoryStatus>,
}

pub(crate) fn def() -> ToolDef {
    ToolDef {
        name: "add_memory",
        description: "Store a durable memory as a markdown file. Use for facts, decisions and context worth keeping across sessions. Returns the assigned id.",
        layer: Layer::Core,
        schema: schema_of::<Params>(),
        handler: Some(typed_handler(execute)),
    }
}

async fn execute(engine: Arc<Engine>, params: Params) -> Result<ToolOutput> {
    let tags = params.tags.unwrap_or_default();
    validate_tags(&tags)?;

    let memory = engine
        .memories
        .add(
            params.content,
            params.project,
            params.category,
            tags,
            params.priority,
            params.status,
        )
        .await?;

    Ok(ToolOutput::text(format!(
        "✅ Memory stored (id={}, project={}, complexity={})",
        memory.id, memory.project, memory.complexity
    ))
    .with_data(record_json(&memory)))
}
