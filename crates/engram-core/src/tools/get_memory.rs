//! Fetch one memory by id.

use std::sync::Arc;

use schemars::JsonSchema;
use serde::Deserialize;

use crate::dispatch::{schema_of, typed_handler, Layer, ToolDef, ToolOutput};
use crate::engine::Engine;
use crate::error::Result;

use super::record_json;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct Params {
    /// The memory id returned by add_memory or search_memories.
    pub id: String,
}

pub(crate) fn def() -> ToolDef {
    ToolDef {
        name: "get_memory",
        description: "Read a memory's full content and metadata by id. Bumps its access counters.",
        layer: Layer::Core,
        schema: schema_of::<Params>(),
        handler: Some(typed_handler(execute)),
    }
}

async fn execute(engine: Arc<Engine>, params: Params) -> Result<ToolOutput> {
    let memory = engine.memories.get(&params.id).await?;
    let text = format!(
        "📄 {} (project={}, category={}, accessed {} times)\n\n{}",
        memory.title_line(),
        memory.project,
        memory.category.as_str(),
        memory.access_count,
        memory.content
    );
    Ok(ToolOutput::text(text).with_data(record_json(&memory)))
}
