//! Delete a task, optionally with its subtree.

use std::sync::Arc;

use schemars::JsonSchema;
use serde::Deserialize;

use crate::dispatch::{schema_of, typed_handler, Layer, ToolDef, ToolOutput};
use crate::engine::Engine;
use crate::error::Result;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct Params {
    /// The task to remove.
    pub id: String,
    /// Also delete all descendants. Without this, deleting a task that
    /// still has children is refused.
    #[serde(default)]
    pub cascade: Option<bool>,
}

pub(crate) fn def() -> ToolDef {
    ToolDef {
        name: "delete_task",
        description: "Delete a task. Pass cascade=true to remove its whole subtree; otherwise tasks with children are refused.",
        layer: Layer::Tasks,
        schema: schema_of::<Params>(),
        handler: Some(typed_handler(execute)),
    }
}

async fn execute(engine: Arc<Engine>, params: Params) -> Result<ToolOutput> {
    engine
        .tasks
        .delete(&params.id, params.cascade.unwrap_or(false))
        .await?;
    Ok(ToolOutput::text(format!("🗑️ Task {} deleted", params.id)))
}
