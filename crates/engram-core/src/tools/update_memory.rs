//! Partial memory update.

use std::sync::Arc;

use schemars::JsonSchema;
use serde::Deserialize;

use crate::dispatch::{schema_of, typed_handler, Layer, ToolDef, ToolOutput};
use crate::engine::Engine;
use crate::error::Result;
use crate::model::MemoryPatch;

use super::{record_json, validate_tags};

#[derive(Debug, Deserialize, JsonSchema)]
pub struct Params {
    /// The memory to change.
    pub id: String,
    /// Fields to change; anything omitted stays as-is. `id`, `timestamp`
    /// and `content_hash` are system-managed.
    #[serde(flatten)]
    pub patch: MemoryPatch,
}

pub(crate) fn def() -> ToolDef {
    ToolDef {
        name: "update_memory",
        description: "Update a memory's content or metadata in place. The content hash is recomputed on content changes; changing the project moves the file.",
        layer: Layer::Admin,
        schema: schema_of::<Params>(),
        handler: Some(typed_handler(execute)),
    }
}

async fn execute(engine: Arc<Engine>, params: Params) -> Result<ToolOutput> {
    if let Some(tags) = &params.patch.tags {
        validate_tags(tags)?;
    }
    let memory = engine.memories.update(&params.id, params.patch).await?;
    Ok(ToolOutput::text(format!(
        "✅ Memory updated (id={}, project={})",
        memory.id, memory.project
    ))
    .with_data(record_json(&memory)))
}
