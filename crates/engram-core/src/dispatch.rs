//! Tool dispatch: a registry of named operations with input schemas.
//!
//! The catalog is a static list of `{name, schema, layer, handler}` entries;
//! the set of *advertised* tools is dynamic. Layers (`core`, `tasks`,
//! `session`, `admin`) can be activated and deactivated at runtime through
//! the always-available meta tools, and `mcp.max_tools` caps the advertised
//! list. Handlers run under a soft timeout; on expiry the call returns a
//! `timeout` error while the store operation runs to completion.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::engine::Engine;
use crate::error::{EngramError, Result};

/// What a tool hands back: a human-facing line plus an optional machine
/// record.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub text: String,
    pub data: Option<serde_json::Value>,
}

impl ToolOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<ToolOutput>> + Send>>;
pub type Handler = Arc<dyn Fn(Arc<Engine>, serde_json::Value) -> HandlerFuture + Send + Sync>;

/// Catalog layers. `Meta` is not a real layer: the layer-management tools
/// live there and can never be deactivated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layer {
    Meta,
    Core,
    Tasks,
    Session,
    Admin,
}

impl Layer {
    /// The layers a client may toggle.
    pub const ACTIVATABLE: [Layer; 4] = [Layer::Core, Layer::Tasks, Layer::Session, Layer::Admin];

    pub fn as_str(self) -> &'static str {
        match self {
            Layer::Meta => "meta",
            Layer::Core => "core",
            Layer::Tasks => "tasks",
            Layer::Session => "session",
            Layer::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "core" => Some(Layer::Core),
            "tasks" => Some(Layer::Tasks),
            "session" => Some(Layer::Session),
            "admin" => Some(Layer::Admin),
            _ => None,
        }
    }
}

/// One catalog entry. Meta tools carry no handler; the dispatcher resolves
/// them against its own layer state.
pub struct ToolDef {
    pub name: &'static str,
    pub description: &'static str,
    pub layer: Layer,
    pub schema: serde_json::Value,
    pub handler: Option<Handler>,
}

/// Advertised shape of a tool, as `tools/list` reports it.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: serde_json::Value,
}

pub struct Dispatcher {
    engine: Arc<Engine>,
    tools: Vec<ToolDef>,
    active: RwLock<HashSet<Layer>>,
}

impl Dispatcher {
    pub fn new(engine: Arc<Engine>) -> Self {
        let settings = engine.settings.current();
        let mut active: HashSet<Layer> = HashSet::new();
        active.insert(Layer::Meta);
        if settings.mcp.default_layers.is_empty() {
            active.extend(Layer::ACTIVATABLE);
        } else {
            for name in &settings.mcp.default_layers {
                match Layer::parse(name) {
                    Some(layer) => {
                        active.insert(layer);
                    }
                    None => tracing::warn!(layer = %name, "unknown layer in mcp.default_layers"),
                }
            }
        }

        Self {
            engine,
            tools: crate::tools::catalog(),
            active: RwLock::new(active),
        }
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Tools in active layers, capped by `mcp.max_tools`.
    pub fn list_tools(&self) -> Vec<ToolDescriptor> {
        let active = self.active.read().unwrap_or_else(|e| e.into_inner());
        let max_tools = self.engine.settings.current().mcp.max_tools;
        let mut advertised: Vec<ToolDescriptor> = self
            .tools
            .iter()
            .filter(|tool| active.contains(&tool.layer))
            .map(|tool| ToolDescriptor {
                name: tool.name.to_string(),
                description: tool.description.to_string(),
                input_schema: tool.schema.clone(),
            })
            .collect();
        if let Some(cap) = max_tools {
            advertised.truncate(cap);
        }
        advertised
    }

    pub fn active_layers(&self) -> Vec<&'static str> {
        let active = self.active.read().unwrap_or_else(|e| e.into_inner());
        let mut layers: Vec<&'static str> = Layer::ACTIVATABLE
            .iter()
            .filter(|l| active.contains(l))
            .map(|l| l.as_str())
            .collect();
        layers.sort_unstable();
        layers
    }

    pub fn activate_layer(&self, name: &str) -> Result<()> {
        let layer = Layer::parse(name)
            .ok_or_else(|| EngramError::invalid_input("layer", format!("unknown layer '{name}'")))?;
        self.active
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(layer);
        Ok(())
    }

    pub fn deactivate_layer(&self, name: &str) -> Result<()> {
        let layer = Layer::parse(name)
            .ok_or_else(|| EngramError::invalid_input("layer", format!("unknown layer '{name}'")))?;
        self.active
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&layer);
        Ok(())
    }

    /// Validate and run one tool call.
    pub async fn dispatch(&self, name: &str, arguments: serde_json::Value) -> Result<ToolOutput> {
        // Meta tools first: they mutate dispatcher state and never time out.
        match name {
            "list_available_layers" => return Ok(self.describe_layers()),
            "activate_layer" => {
                let layer = layer_argument(&arguments)?;
                self.activate_layer(&layer)?;
                return Ok(ToolOutput::text(format!("✅ Layer '{layer}' activated"))
                    .with_data(serde_json::json!({ "active": self.active_layers() })));
            }
            "deactivate_layer" => {
                let layer = layer_argument(&arguments)?;
                self.deactivate_layer(&layer)?;
                return Ok(ToolOutput::text(format!("✅ Layer '{layer}' deactivated"))
                    .with_data(serde_json::json!({ "active": self.active_layers() })));
            }
            _ => {}
        }

        let tool = self
            .tools
            .iter()
            .find(|tool| tool.name == name)
            .ok_or_else(|| EngramError::ToolNotFound {
                name: name.to_string(),
            })?;

        {
            let active = self.active.read().unwrap_or_else(|e| e.into_inner());
            if !active.contains(&tool.layer) {
                return Err(EngramError::ToolNotFound {
                    name: format!(
                        "{name} (layer '{}' inactive; call activate_layer first)",
                        tool.layer.as_str()
                    ),
                });
            }
        }

        let handler = tool
            .handler
            .as_ref()
            .ok_or_else(|| EngramError::internal(format!("tool '{name}' has no handler")))?
            .clone();

        let settings = self.engine.settings.current();
        let seconds = settings
            .mcp
            .tool_timeouts
            .get(name)
            .copied()
            .unwrap_or(settings.mcp.tool_timeout_sec)
            .max(1);

        // The handler runs in its own task: a timeout abandons the caller,
        // not the store operation, which is the store's atomic unit.
        let task = tokio::spawn(handler(self.engine.clone(), arguments));
        match tokio::time::timeout(Duration::from_secs(seconds), task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(EngramError::internal(format!(
                "tool '{name}' panicked: {join_error}"
            ))),
            Err(_) => Err(EngramError::Timeout { seconds }),
        }
    }

    fn describe_layers(&self) -> ToolOutput {
        let active = self.active_layers();
        let lines: Vec<String> = Layer::ACTIVATABLE
            .iter()
            .map(|layer| {
                let state = if active.contains(&layer.as_str()) {
                    "active"
                } else {
                    "inactive"
                };
                format!("- {} ({state})", layer.as_str())
            })
            .collect();
        ToolOutput::text(format!("Available layers:\n{}", lines.join("\n")))
            .with_data(serde_json::json!({ "active": active }))
    }
}

fn layer_argument(arguments: &serde_json::Value) -> Result<String> {
    arguments
        .get("layer")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| EngramError::invalid_input("layer", "expected a string field 'layer'"))
}

/// Wrap a typed `async fn(engine, params)` into an untyped [`Handler`],
/// turning deserialization failures into `invalid-input`.
pub(crate) fn typed_handler<P, F, Fut>(f: F) -> Handler
where
    P: DeserializeOwned + Send + 'static,
    F: Fn(Arc<Engine>, P) -> Fut + Send + Sync + Copy + 'static,
    Fut: Future<Output = Result<ToolOutput>> + Send + 'static,
{
    Arc::new(move |engine, arguments| {
        Box::pin(async move {
            let params: P = serde_json::from_value(arguments)
                .map_err(|e| EngramError::invalid_input("arguments", e.to_string()))?;
            f(engine, params).await
        })
    })
}

/// JSON schema for a tool's parameter struct.
pub(crate) fn schema_of<P: schemars::JsonSchema>() -> serde_json::Value {
    serde_json::to_value(schemars::schema_for!(P))
        .unwrap_or_else(|_| serde_json::json!({ "type": "object" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn dispatcher(dir: &TempDir) -> Dispatcher {
        let engine = Arc::new(
            Engine::init_with(dir.path().to_path_buf(), false, false)
                .await
                .unwrap(),
        );
        Dispatcher::new(engine)
    }

    #[tokio::test]
    async fn catalog_advertises_the_canonical_tools() {
        let dir = TempDir::new().unwrap();
        let d = dispatcher(&dir).await;
        let names: Vec<String> = d.list_tools().into_iter().map(|t| t.name).collect();
        for expected in [
            "add_memory",
            "get_memory",
            "list_memories",
            "search_memories",
            "delete_memory",
            "create_task",
            "update_task",
            "list_tasks",
            "get_task_context",
            "delete_task",
            "generate_dropoff",
            "test_tool",
            "list_available_layers",
            "activate_layer",
        ] {
            assert!(names.iter().any(|n| n == expected), "missing tool {expected}");
        }
    }

    #[tokio::test]
    async fn unknown_tool_is_tool_not_found() {
        let dir = TempDir::new().unwrap();
        let d = dispatcher(&dir).await;
        let err = d.dispatch("no_such_tool", serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, EngramError::ToolNotFound { .. }));
    }

    #[tokio::test]
    async fn schema_violation_is_invalid_input() {
        let dir = TempDir::new().unwrap();
        let d = dispatcher(&dir).await;
        // content must be a string
        let err = d
            .dispatch("add_memory", serde_json::json!({ "content": 42 }))
            .await
            .unwrap_err();
        assert!(matches!(err, EngramError::InvalidInput { .. }));
    }

    #[tokio::test]
    async fn deactivated_layer_hides_its_tools() {
        let dir = TempDir::new().unwrap();
        let d = dispatcher(&dir).await;

        d.dispatch("deactivate_layer", serde_json::json!({ "layer": "tasks" }))
            .await
            .unwrap();
        let names: Vec<String> = d.list_tools().into_iter().map(|t| t.name).collect();
        assert!(!names.iter().any(|n| n == "create_task"));

        let err = d
            .dispatch("create_task", serde_json::json!({ "title": "x", "project": "p" }))
            .await
            .unwrap_err();
        assert!(matches!(err, EngramError::ToolNotFound { .. }));

        d.dispatch("activate_layer", serde_json::json!({ "layer": "tasks" }))
            .await
            .unwrap();
        assert!(d
            .dispatch("create_task", serde_json::json!({ "title": "x", "project": "p" }))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn default_layers_setting_restricts_startup_set() {
        let dir = TempDir::new().unwrap();
        let data = dir.path().join("data");
        std::fs::create_dir_all(&data).unwrap();
        std::fs::write(
            data.join("settings.json"),
            r#"{"mcp": {"default_layers": ["core"]}}"#,
        )
        .unwrap();

        let d = dispatcher(&dir).await;
        assert_eq!(d.active_layers(), vec!["core"]);
        let names: Vec<String> = d.list_tools().into_iter().map(|t| t.name).collect();
        assert!(names.iter().any(|n| n == "add_memory"));
        assert!(!names.iter().any(|n| n == "create_task"));
    }

    #[tokio::test]
    async fn max_tools_caps_the_advertised_list() {
        let dir = TempDir::new().unwrap();
        let data = dir.path().join("data");
        std::fs::create_dir_all(&data).unwrap();
        std::fs::write(data.join("settings.json"), r#"{"mcp": {"max_tools": 3}}"#).unwrap();

        let d = dispatcher(&dir).await;
        assert_eq!(d.list_tools().len(), 3);
    }

    #[tokio::test]
    async fn end_to_end_add_and_list_through_dispatch() {
        let dir = TempDir::new().unwrap();
        let d = dispatcher(&dir).await;

        let out = d
            .dispatch(
                "add_memory",
                serde_json::json!({ "content": "Remember X", "project": "p1", "tags": ["t"] }),
            )
            .await
            .unwrap();
        assert!(out.text.contains("✅"));
        let id = out.data.as_ref().unwrap()["id"].as_str().unwrap().to_string();

        let listed = d
            .dispatch("list_memories", serde_json::json!({ "project": "p1" }))
            .await
            .unwrap();
        let records = listed.data.unwrap();
        assert!(records.as_array().unwrap().iter().any(|m| m["id"] == id.as_str()));
    }
}
