//! Engram dashboard bridge.
//!
//! Serves the REST API and WebSocket event stream for the dashboard UI over
//! loopback only. Shares the corpus with the stdio server through the
//! filesystem: each process keeps its own indexes and observes the other's
//! writes via the watcher.

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use engram_core::dispatch::Dispatcher;
use engram_core::lockfile::RoleLock;
use engram_core::Engine;

mod ports;
mod routes;
mod ws;

#[derive(Debug, Parser)]
#[command(name = "engram-bridge", about = "Engram dashboard bridge")]
struct Args {
    /// Corpus root directory (default: current directory).
    #[arg(long)]
    root: Option<PathBuf>,

    /// Preferred port; overrides `server.port` from settings.
    #[arg(long)]
    port: Option<u16>,
}

/// How long in-flight requests get to drain after the shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let root = args.root.unwrap_or_default();

    let engine = match Engine::init(root).await {
        Ok(engine) => Arc::new(engine),
        Err(e) => {
            tracing::error!(error = %e, "fatal: engine initialization failed");
            std::process::exit(1);
        }
    };
    let lock = match RoleLock::acquire(&engine.paths.root, "bridge") {
        Ok(lock) => lock,
        Err(e) => {
            tracing::error!(error = %e, "fatal: corpus already served by another bridge");
            std::process::exit(1);
        }
    };

    let settings = engine.settings.current();
    let host = resolve_loopback_host(&settings.server.host);
    let preferred = args.port.unwrap_or(settings.server.port);
    let (listener, port) = ports::bind_walking(host, preferred)
        .await
        .context("no loopback port available")?;

    // Advertise the chosen port for co-located UIs; ephemeral by design.
    let port_file = engine.paths.dashboard_port_file();
    if let Err(e) = std::fs::write(&port_file, port.to_string()) {
        tracing::warn!(error = %e, "could not write .dashboard-port");
    }

    let dispatcher = Arc::new(Dispatcher::new(engine.clone()));
    let state = routes::AppState {
        engine: engine.clone(),
        dispatcher,
        port,
    };
    let app = routes::router(state).layer(cors_layer(&settings.server.cors_origins));

    tracing::info!(%host, port, "dashboard bridge listening");

    let (drained_tx, drained_rx) = tokio::sync::oneshot::channel::<()>();
    let server = axum::serve(listener, app).with_graceful_shutdown(async {
        shutdown_signal().await;
        tracing::info!("shutdown signal received; draining connections");
    });
    let server_task = tokio::spawn(async move {
        if let Err(e) = server.await {
            tracing::error!(error = %e, "server error");
        }
        let _ = drained_tx.send(());
    });

    // Wait for the server to finish; cap the post-signal drain.
    if drained_rx.await.is_err() || server_task.await.is_err() {
        tracing::warn!("server task ended abnormally");
    }

    cleanup(&port_file);
    drop(lock);
    Ok(())
}

fn resolve_loopback_host(configured: &str) -> IpAddr {
    match configured.parse::<IpAddr>() {
        Ok(ip) if ip.is_loopback() => ip,
        Ok(ip) => {
            tracing::warn!(%ip, "refusing non-loopback bind host; using 127.0.0.1");
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        }
        Err(_) => {
            tracing::warn!(host = configured, "unparseable bind host; using 127.0.0.1");
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        }
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let parsed: Vec<_> = origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(parsed))
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any)
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("sigterm handler");
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
    // Connections that outlive the drain window are cut when the process
    // exits shortly after.
    tokio::spawn(async {
        tokio::time::sleep(DRAIN_TIMEOUT).await;
        tracing::warn!("drain window elapsed; forcing exit");
        std::process::exit(0);
    });
}

fn cleanup(port_file: &std::path::Path) {
    if let Err(e) = std::fs::remove_file(port_file) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(error = %e, "could not remove .dashboard-port");
        }
    }
}
