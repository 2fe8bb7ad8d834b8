//! Delete one memory.

use std::sync::Arc;

use schemars::JsonSchema;
use serde::Deserialize;

use crate::dispatch::{schema_of, typed_handler, Layer, ToolDef, ToolOutput};
use crate::engine::Engine;
use crate::error::Result;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct Params {
    /// The memory to remove. The file is deleted; there is no tombstone.
    pub id: String,
}

pub(crate) fn def() -> ToolDef {
    ToolDef {
        name: "delete_memory",
        description: "Permanently delete a memory by id.",
        layer: Layer::Core,
        schema: schema_of::<Params>(),
        handler: Some(typed_handler(execute)),
    }
}

async fn execute(engine: Arc<Engine>, params: Params) -> Result<ToolOutput> {
    engine.memories.delete(&params.id).await?;
    Ok(ToolOutput::text(format!("🗑️ Memory {} deleted", params.id)))
}
