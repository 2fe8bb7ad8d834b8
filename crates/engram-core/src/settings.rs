//! Process-wide settings.
//!
//! Loaded once from `<root>/data/settings.json`, overridden by environment
//! variables, and republished as a fresh snapshot whenever the file changes
//! on disk. Readers hold an `Arc<Settings>` snapshot; writers swap the whole
//! object, so a reload never tears a reader mid-request.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::error::{EngramError, Result};
use crate::store::task::TaskLayoutKind;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    /// Override for the memory root (else env `MEMORY_DIR`, else `<root>/memories`).
    pub memory_dir: Option<PathBuf>,
    /// Override for the task root (else env `TASK_DIR`, else `<root>/tasks`).
    pub task_dir: Option<PathBuf>,
    pub server: ServerSettings,
    pub features: FeatureSettings,
    pub mcp: McpSettings,
    pub logging: LoggingSettings,
    pub search: SearchSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Preferred dashboard port; the bridge walks forward from here.
    pub port: u16,
    /// Bind host. Anything that is not loopback is refused at startup.
    pub host: String,
    /// Allowed CORS origins for the dashboard API.
    pub cors_origins: Vec<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: 3001,
            host: "127.0.0.1".to_string(),
            cors_origins: vec![
                "http://localhost:3001".to_string(),
                "http://127.0.0.1:3001".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureSettings {
    pub auto_backup: bool,
    pub backup_interval_sec: u64,
    pub max_backups: usize,
    pub enable_websocket: bool,
    pub semantic_search_provider: SemanticProvider,
    /// Task persistence layout, fixed at startup.
    pub task_layout: TaskLayoutKind,
}

impl Default for FeatureSettings {
    fn default() -> Self {
        Self {
            auto_backup: true,
            backup_interval_sec: 3600,
            max_backups: 10,
            enable_websocket: true,
            semantic_search_provider: SemanticProvider::None,
            task_layout: TaskLayoutKind::Flat,
        }
    }
}

/// Recognized but inert: embedding backends are an external collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SemanticProvider {
    #[default]
    None,
    Ollama,
    Xenova,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct McpSettings {
    /// Cap on the number of advertised tools (`None` = unlimited).
    pub max_tools: Option<usize>,
    /// Layers pre-activated at startup. Empty means all layers.
    pub default_layers: Vec<String>,
    /// Soft timeout applied to every tool call.
    pub tool_timeout_sec: u64,
    /// Per-tool timeout overrides, keyed by tool name.
    pub tool_timeouts: BTreeMap<String, u64>,
}

impl Default for McpSettings {
    fn default() -> Self {
        Self {
            max_tools: None,
            default_layers: Vec::new(),
            tool_timeout_sec: 30,
            tool_timeouts: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: LogLevel,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        }
    }
}

/// Composite score weights and fuzzy-pass tuning for memory search.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub recency_weight: f64,
    pub relevance_weight: f64,
    pub interaction_weight: f64,
    pub importance_weight: f64,
    /// Fuzzy pass runs when exact candidates fall below this count.
    pub fuzzy_candidate_threshold: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            recency_weight: 0.30,
            relevance_weight: 0.25,
            interaction_weight: 0.25,
            importance_weight: 0.20,
            fuzzy_candidate_threshold: 5,
        }
    }
}

impl Settings {
    /// Load settings from a JSON file, falling back to defaults when the
    /// file is absent, then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let mut settings = match std::fs::read_to_string(path) {
            Ok(raw) => serde_json::from_str(&raw).map_err(|e| {
                EngramError::parse(path.display().to_string(), e.to_string())
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Settings::default(),
            Err(e) => return Err(e.into()),
        };
        settings.apply_env_overrides();
        Ok(settings)
    }

    /// Environment variables win over file settings.
    fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("MEMORY_DIR") {
            if !dir.is_empty() {
                self.memory_dir = Some(PathBuf::from(dir));
            }
        }
        if let Ok(dir) = std::env::var("TASK_DIR") {
            if !dir.is_empty() {
                self.task_dir = Some(PathBuf::from(dir));
            }
        }
        // Under an AI client, anything chatty on stderr is noise; both flags
        // clamp logging down to errors.
        if env_flag("MCP_QUIET") || env_flag("MCP_MODE") {
            self.logging.level = LogLevel::Error;
        }
    }
}

fn env_flag(name: &str) -> bool {
    matches!(
        std::env::var(name).as_deref(),
        Ok("true") | Ok("1") | Ok("yes")
    )
}

/// Copy-on-write settings holder shared across subsystems.
pub struct SettingsHandle {
    path: PathBuf,
    current: RwLock<Arc<Settings>>,
}

impl SettingsHandle {
    pub fn load(path: PathBuf) -> Result<Self> {
        let settings = Settings::load(&path)?;
        Ok(Self {
            path,
            current: RwLock::new(Arc::new(settings)),
        })
    }

    /// The settings file path this handle watches.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Take a snapshot. Cheap; the snapshot stays valid across reloads.
    pub fn current(&self) -> Arc<Settings> {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Re-read the file and publish a new snapshot.
    pub fn reload(&self) -> Result<Arc<Settings>> {
        let fresh = Arc::new(Settings::load(&self.path)?);
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = fresh.clone();
        Ok(fresh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_match_documented_values() {
        let s = Settings::default();
        assert_eq!(s.server.port, 3001);
        assert_eq!(s.server.host, "127.0.0.1");
        assert!(s.features.auto_backup);
        assert_eq!(s.features.backup_interval_sec, 3600);
        assert_eq!(s.features.max_backups, 10);
        assert_eq!(s.mcp.tool_timeout_sec, 30);
        assert_eq!(s.search.fuzzy_candidate_threshold, 5);
        let total = s.search.recency_weight
            + s.search.relevance_weight
            + s.search.interaction_weight
            + s.search.importance_weight;
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let settings = Settings::load(&dir.path().join("settings.json")).unwrap();
        assert_eq!(settings.server.port, 3001);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"server": {"port": 4100}}"#).unwrap();
        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.server.port, 4100);
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.features.max_backups, 10);
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(Settings::load(&path).is_err());
    }

    #[test]
    fn handle_publishes_new_snapshot_on_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        let handle = SettingsHandle::load(path.clone()).unwrap();
        assert_eq!(handle.current().server.port, 3001);

        std::fs::write(&path, r#"{"server": {"port": 4200}}"#).unwrap();
        handle.reload().unwrap();
        assert_eq!(handle.current().server.port, 4200);
    }
}
