//! Connectivity and health diagnostic.

use std::sync::Arc;

use schemars::JsonSchema;
use serde::Deserialize;

use crate::dispatch::{schema_of, typed_handler, Layer, ToolDef, ToolOutput};
use crate::engine::Engine;
use crate::error::Result;

use super::record_json;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct Params {}

pub(crate) fn def() -> ToolDef {
    ToolDef {
        name: "test_tool",
        description: "Verify the server is responding and report corpus health: record counts, storage footprint and backup status.",
        layer: Layer::Session,
        schema: schema_of::<Params>(),
        handler: Some(typed_handler(execute)),
    }
}

async fn execute(engine: Arc<Engine>, _params: Params) -> Result<ToolOutput> {
    let health = engine.health().await?;
    Ok(ToolOutput::text(format!(
        "✅ Engram operational: {} memories, {} tasks, {} KiB on disk, {} backup(s)",
        health.memory_count,
        health.task_count,
        health.storage_bytes / 1024,
        health.backup_count,
    ))
    .with_data(record_json(&health)))
}
