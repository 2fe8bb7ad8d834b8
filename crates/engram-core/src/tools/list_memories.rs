//! List memories, newest first.

use std::sync::Arc;

use schemars::JsonSchema;
use serde::Deserialize;

use crate::dispatch::{schema_of, typed_handler, Layer, ToolDef, ToolOutput};
use crate::engine::Engine;
use crate::error::Result;

use super::record_json;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct Params {
    /// Restrict to one project slug.
    #[serde(default)]
    pub project: Option<String>,
    /// Maximum records to return (1–1000).
    #[serde(default)]
    pub limit: Option<usize>,
}

pub(crate) fn def() -> ToolDef {
    ToolDef {
        name: "list_memories",
        description: "List memories newest-first, optionally scoped to a project.",
        layer: Layer::Core,
        schema: schema_of::<Params>(),
        handler: Some(typed_handler(execute)),
    }
}

async fn execute(engine: Arc<Engine>, params: Params) -> Result<ToolOutput> {
    let memories = engine
        .memories
        .list(params.project.as_deref(), params.limit)
        .await?;

    let mut lines = vec![format!("📚 {} memories", memories.len())];
    for memory in memories.iter().take(20) {
        lines.push(format!(
            "- {} [{}] {} ({})",
            memory.timestamp.format("%Y-%m-%d"),
            memory.project,
            memory.title_line(),
            memory.id,
        ));
    }
    if memories.len() > 20 {
        lines.push(format!("… and {} more", memories.len() - 20));
    }

    Ok(ToolOutput::text(lines.join("\n")).with_data(record_json(&memories)))
}
