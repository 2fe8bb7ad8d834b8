//! Engram stdio JSON-RPC server.
//!
//! Speaks the tool protocol on stdin/stdout for an AI client. All logging
//! goes to stderr; stdout carries protocol frames only. Exit codes: 0 on a
//! clean shutdown, 1 on a fatal initialization error, 2 when the peer
//! violates the protocol.

use std::path::PathBuf;
use std::sync::Arc;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use engram_core::config::CorpusPaths;
use engram_core::dispatch::Dispatcher;
use engram_core::lockfile::RoleLock;
use engram_core::settings::Settings;
use engram_core::Engine;

mod transport;

/// Settings (with the MCP_QUIET / MCP_MODE overrides already applied) seed
/// the default level; RUST_LOG still wins.
fn init_logging(root: &std::path::Path) {
    let default_level = Settings::load(&CorpusPaths::settings_file(root))
        .map(|s| s.logging.level.as_str())
        .unwrap_or("info");
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();
}

fn corpus_root() -> PathBuf {
    let root = std::env::var_os("ENGRAM_ROOT")
        .map(PathBuf::from)
        .unwrap_or_default();
    if root.as_os_str().is_empty() {
        std::env::current_dir().unwrap_or_default()
    } else {
        root
    }
}

#[tokio::main]
async fn main() {
    let root = corpus_root();
    init_logging(&root);

    let engine = match Engine::init(root).await {
        Ok(engine) => Arc::new(engine),
        Err(e) => {
            tracing::error!(error = %e, "fatal: engine initialization failed");
            std::process::exit(1);
        }
    };

    // One writer per role per corpus; a live peer is fatal.
    let _lock = match RoleLock::acquire(&engine.paths.root, "mcp") {
        Ok(lock) => lock,
        Err(e) => {
            tracing::error!(error = %e, "fatal: corpus already served by another engram-mcp");
            std::process::exit(1);
        }
    };

    let dispatcher = Dispatcher::new(engine);
    tracing::info!(
        tools = dispatcher.list_tools().len(),
        "engram-mcp serving on stdio"
    );

    let code = transport::run(&dispatcher).await;
    // process::exit skips destructors; release the role lock by hand.
    drop(_lock);
    std::process::exit(code);
}
