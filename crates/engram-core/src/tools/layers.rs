//! Layer meta-tools.
//!
//! These three entries advertise the layer controls; the dispatcher
//! intercepts their names and resolves them against its own state, so the
//! defs carry no handler.

use schemars::JsonSchema;
use serde::Deserialize;

use crate::dispatch::{schema_of, Layer, ToolDef};

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListLayersParams {}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct LayerParams {
    /// One of: core, tasks, session, admin.
    pub layer: String,
}

pub(crate) fn list_available_layers_def() -> ToolDef {
    ToolDef {
        name: "list_available_layers",
        description: "Show every tool layer and whether it is currently active.",
        layer: Layer::Meta,
        schema: schema_of::<ListLayersParams>(),
        handler: None,
    }
}

pub(crate) fn activate_layer_def() -> ToolDef {
    ToolDef {
        name: "activate_layer",
        description: "Activate a tool layer, adding its tools to the advertised catalog.",
        layer: Layer::Meta,
        schema: schema_of::<LayerParams>(),
        handler: None,
    }
}

pub(crate) fn deactivate_layer_def() -> ToolDef {
    ToolDef {
        name: "deactivate_layer",
        description: "Deactivate a tool layer, hiding its tools until re-activated.",
        layer: Layer::Meta,
        schema: schema_of::<LayerParams>(),
        handler: None,
    }
}
