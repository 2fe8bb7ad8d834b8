//! Bulk memory deletion.

use std::sync::Arc;

use schemars::JsonSchema;
use serde::Deserialize;

use crate::dispatch::{schema_of, typed_handler, Layer, ToolDef, ToolOutput};
use crate::engine::Engine;
use crate::error::{EngramError, Result};

const MAX_BATCH: usize = 500;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct Params {
    /// Ids to delete, at most 500 per call.
    pub ids: Vec<String>,
}

pub(crate) fn def() -> ToolDef {
    ToolDef {
        name: "batch_delete_memories",
        description: "Delete many memories in one call. A backup snapshot is taken first; ids that no longer exist are reported, not fatal.",
        layer: Layer::Admin,
        schema: schema_of::<Params>(),
        handler: Some(typed_handler(execute)),
    }
}

async fn execute(engine: Arc<Engine>, params: Params) -> Result<ToolOutput> {
    if params.ids.is_empty() {
        return Err(EngramError::invalid_input("ids", "must not be empty"));
    }
    if params.ids.len() > MAX_BATCH {
        return Err(EngramError::invalid_input(
            "ids",
            format!("at most {MAX_BATCH} ids per call"),
        ));
    }

    let max = engine.settings.current().features.max_backups;
    engine.backup.snapshot(max).await?;

    let mut deleted = 0;
    let mut missing = Vec::new();
    for id in &params.ids {
        match engine.memories.delete(id).await {
            Ok(()) => deleted += 1,
            Err(EngramError::NotFound { .. }) => missing.push(id.clone()),
            Err(e) => return Err(e),
        }
    }

    Ok(ToolOutput::text(format!(
        "🗑️ Deleted {deleted} memories{}",
        if missing.is_empty() {
            String::new()
        } else {
            format!("; {} id(s) were already gone", missing.len())
        }
    ))
    .with_data(serde_json::json!({ "deleted": deleted, "missing": missing })))
}
