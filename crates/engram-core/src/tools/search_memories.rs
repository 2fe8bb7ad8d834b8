//! Ranked memory search.

use std::sync::Arc;

use schemars::JsonSchema;
use serde::Deserialize;

use crate::dispatch::{schema_of, typed_handler, Layer, ToolDef, ToolOutput};
use crate::engine::Engine;
use crate::error::Result;
use crate::model::{Category, MemoryStatus};
use crate::search::SearchQuery;

const DEFAULT_RESULTS: usize = 10;
const MAX_RESULTS: usize = 100;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct Params {
    /// What you are looking for. Whitespace-separated terms are matched
    /// case-insensitively against content, title and tags.
    pub query: String,
    #[serde(default)]
    pub project: Option<String>,
    /// Require all of these tags.
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub category: Option<Category>,
    #[serde(default)]
    pub status: Option<MemoryStatus>,
    /// Allow the approximate-match fallback when exact matches are scarce
    /// (default true).
    #[serde(default)]
    pub fuzzy: Option<bool>,
    /// Maximum hits to return (default 10, cap 100).
    #[serde(default)]
    pub limit: Option<usize>,
}

pub(crate) fn def() -> ToolDef {
    ToolDef {
        name: "search_memories",
        description: "Search memories with substring and tag filters plus a fuzzy fallback, ranked by a composite of recency, relevance, interaction and importance.",
        layer: Layer::Core,
        schema: schema_of::<Params>(),
        handler: Some(typed_handler(execute)),
    }
}

async fn execute(engine: Arc<Engine>, params: Params) -> Result<ToolOutput> {
    let query = SearchQuery {
        text: params.query.clone(),
        project: params.project,
        tags: params.tags.unwrap_or_default(),
        category: params.category,
        status: params.status,
        fuzzy: params.fuzzy.unwrap_or(true),
    };
    let tuning = engine.settings.current().search.clone();

    let mut hits = engine.memories.search(&query, &tuning).await?;
    hits.truncate(params.limit.unwrap_or(DEFAULT_RESULTS).min(MAX_RESULTS));

    if hits.is_empty() {
        return Ok(ToolOutput::text(format!(
            "No memories matched '{}'.",
            params.query
        ))
        .with_data(serde_json::json!([])));
    }

    let mut lines = vec![format!(
        "🔍 {} result(s) for '{}':",
        hits.len(),
        params.query
    )];
    for (rank, (memory, score)) in hits.iter().enumerate() {
        lines.push(format!(
            "{}. [{score:.2}] {} ({}, {}, {})",
            rank + 1,
            memory.title_line(),
            memory.id,
            memory.project,
            memory.timestamp.format("%Y-%m-%d"),
        ));
    }

    let data: Vec<serde_json::Value> = hits
        .iter()
        .map(|(memory, score)| {
            serde_json::json!({
                "id": memory.id,
                "score": score,
                "project": memory.project,
                "title": memory.title_line(),
                "tags": memory.tags,
            })
        })
        .collect();

    Ok(ToolOutput::text(lines.join("\n")).with_data(serde_json::Value::Array(data)))
}
