//! The tool catalog.
//!
//! One module per tool; each exposes a `def()` building its catalog entry
//! (name, description, layer, input schema, handler). The dispatcher owns
//! the layer state; everything here is stateless over the engine.

mod add_memory;
mod batch_delete_memories;
mod create_task;
mod dedup_memories;
mod delete_memory;
mod delete_task;
mod generate_dropoff;
mod get_memory;
mod get_task_context;
mod layers;
mod list_memories;
mod list_tasks;
mod search_memories;
mod test_tool;
mod update_memory;
mod update_task;

use crate::dispatch::ToolDef;
use crate::error::{EngramError, Result};

/// The full catalog, in advertisement order. `mcp.max_tools` truncates from
/// the back, so the core memory tools come first.
pub fn catalog() -> Vec<ToolDef> {
    vec![
        add_memory::def(),
        get_memory::def(),
        list_memories::def(),
        search_memories::def(),
        update_memory::def(),
        delete_memory::def(),
        create_task::def(),
        update_task::def(),
        list_tasks::def(),
        get_task_context::def(),
        delete_task::def(),
        generate_dropoff::def(),
        test_tool::def(),
        dedup_memories::def(),
        batch_delete_memories::def(),
        layers::list_available_layers_def(),
        layers::activate_layer_def(),
        layers::deactivate_layer_def(),
    ]
}

/// Shared bound checks for tag arrays.
pub(crate) fn validate_tags(tags: &[String]) -> Result<()> {
    if tags.len() > 32 {
        return Err(EngramError::invalid_input("tags", "at most 32 tags"));
    }
    if let Some(long) = tags.iter().find(|t| t.len() > 64) {
        return Err(EngramError::invalid_input(
            "tags",
            format!("tag '{long}' exceeds 64 characters"),
        ));
    }
    Ok(())
}

pub(crate) fn record_json<T: serde::Serialize>(value: &T) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or(serde_json::Value::Null)
}
