//! Partial task update.

use std::sync::Arc;

use schemars::JsonSchema;
use serde::Deserialize;

use crate::dispatch::{schema_of, typed_handler, Layer, ToolDef, ToolOutput};
use crate::engine::Engine;
use crate::error::Result;
use crate::model::TaskPatch;

use super::{record_json, validate_tags};

#[derive(Debug, Deserialize, JsonSchema)]
pub struct Params {
    /// The task to change.
    pub id: String,
    /// Fields to change; omitted fields stay as-is. `created` is immutable,
    /// `updated` refreshes automatically. Set `parent_id` to null to detach.
    #[serde(flatten)]
    pub patch: TaskPatch,
}

pub(crate) fn def() -> ToolDef {
    ToolDef {
        name: "update_task",
        description: "Update a task's fields. Status transitions are unrestricted; parent and level changes are validated against the hierarchy rules.",
        layer: Layer::Tasks,
        schema: schema_of::<Params>(),
        handler: Some(typed_handler(execute)),
    }
}

async fn execute(engine: Arc<Engine>, params: Params) -> Result<ToolOutput> {
    if let Some(tags) = &params.patch.tags {
        validate_tags(tags)?;
    }
    let task = engine.tasks.update(&params.id, params.patch).await?;
    Ok(ToolOutput::text(format!(
        "✅ Task #{} updated (status={})",
        task.serial,
        task.status.as_str()
    ))
    .with_data(record_json(&task)))
}
