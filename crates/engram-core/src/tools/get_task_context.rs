//! A task plus its neighborhood.

use std::sync::Arc;

use schemars::JsonSchema;
use serde::Deserialize;

use crate::dispatch::{schema_of, typed_handler, Layer, ToolDef, ToolOutput};
use crate::engine::Engine;
use crate::error::Result;
use crate::model::Task;

use super::record_json;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct Params {
    /// The task to contextualize.
    pub id: String,
}

pub(crate) fn def() -> ToolDef {
    ToolDef {
        name: "get_task_context",
        description: "Fetch a task together with its parent, siblings, direct children and up to ten other tasks from the same project.",
        layer: Layer::Tasks,
        schema: schema_of::<Params>(),
        handler: Some(typed_handler(execute)),
    }
}

async fn execute(engine: Arc<Engine>, params: Params) -> Result<ToolOutput> {
    let context = engine.tasks.get_context(&params.id).await?;

    let mut lines = vec![format!(
        "🧭 Task #{} {} [{}]",
        context.task.serial,
        context.task.title,
        context.task.status.as_str()
    )];
    if let Some(parent) = &context.parent {
        lines.push(format!("  parent: {}", one_liner(parent)));
    }
    push_section(&mut lines, "siblings", &context.siblings);
    push_section(&mut lines, "children", &context.children);
    push_section(&mut lines, "also in project", &context.related);

    Ok(ToolOutput::text(lines.join("\n")).with_data(record_json(&context)))
}

fn push_section(lines: &mut Vec<String>, label: &str, tasks: &[Task]) {
    if tasks.is_empty() {
        return;
    }
    lines.push(format!("  {label}:"));
    for task in tasks {
        lines.push(format!("    - {}", one_liner(task)));
    }
}

fn one_liner(task: &Task) -> String {
    format!("#{} {} [{}]", task.serial, task.title, task.status.as_str())
}
