//! Duplicate detection and cleanup.

use std::sync::Arc;

use schemars::JsonSchema;
use serde::Deserialize;

use crate::dispatch::{schema_of, typed_handler, Layer, ToolDef, ToolOutput};
use crate::engine::Engine;
use crate::error::Result;

use super::record_json;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct Params {
    /// When false (default) only a plan is returned; when true the plan is
    /// executed after a safety snapshot.
    #[serde(default)]
    pub apply: Option<bool>,
}

pub(crate) fn def() -> ToolDef {
    ToolDef {
        name: "dedup_memories",
        description: "Group memories by content hash and plan removals keeping the oldest of each group. Pass apply=true to execute the plan (a backup snapshot is taken first).",
        layer: Layer::Admin,
        schema: schema_of::<Params>(),
        handler: Some(typed_handler(execute)),
    }
}

async fn execute(engine: Arc<Engine>, params: Params) -> Result<ToolOutput> {
    let apply = params.apply.unwrap_or(false);
    if apply {
        let max = engine.settings.current().features.max_backups;
        engine.backup.snapshot(max).await?;
    }

    let report = engine.memories.dedup(apply).await?;
    let planned: usize = report.groups.iter().map(|g| g.remove.len()).sum();
    let text = if report.groups.is_empty() {
        "✨ No duplicate memories found.".to_string()
    } else if apply {
        format!(
            "🧹 Removed {} duplicate(s) across {} group(s); oldest of each group kept.",
            report.removed,
            report.groups.len()
        )
    } else {
        format!(
            "📋 Dedup plan: {} group(s), {} removal(s). Re-run with apply=true to execute.",
            report.groups.len(),
            planned
        )
    };
    Ok(ToolOutput::text(text).with_data(record_json(&report)))
}
