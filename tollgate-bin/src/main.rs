use anyhow::Result;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tollgate_bin::{cmdsock, config};
use tollgate_core::{AccessControl, Config, SessionEngine, SessionStore};
use tollgate_net::{AccessClient, NeighborWatcher};
use tracing::{info, warn};

/// Rebuilds the engine from the status file, or fresh if there is none.
fn load_status(config: &Config, access: Arc<dyn AccessControl>) -> Result<SessionEngine> {
    let presence = config.presence_sources.clone();
    if let Some(path) = &config.statusfile {
        if Path::new(path).exists() {
            info!("loading status from {}", path);
            let data = fs::read(path)?;
            let store: SessionStore = serde_json::from_slice(&data)?;
            return Ok(SessionEngine::with_store(store, access, presence));
        }
    }
    Ok(SessionEngine::new(access, presence))
}

async fn save_status(config: &Config, engine: &SessionEngine) -> Result<()> {
    if let Some(path) = &config.statusfile {
        info!("saving status to {}", path);
        let store = engine.snapshot().await;
        let data = serde_json::to_vec_pretty(&store)?;
        fs::write(path, data)?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = match config::load_config() {
        Ok(config) => Arc::new(config),
        Err(e) => {
            eprintln!("Error loading config: {:#}", e);
            std::process::exit(1);
        }
    };
    tracing_subscriber::fmt()
        .with_max_level(config.loglevel.as_level())
        .init();

    info!("starting tollgated");

    let key = match config::require_access_key(&config) {
        Ok(key) => key,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    };

    let access = Arc::new(AccessClient::new(
        &config.access_host,
        config.access_port,
        key,
        Duration::from_secs(config.access_timeout_secs),
    ));
    let engine = Arc::new(load_status(&config, access)?);

    let listener = tokio::net::TcpListener::bind(&config.http_listen).await?;
    tokio::spawn(tollgate_http::server::run_server(
        listener,
        engine.clone(),
    ));

    if let Some(path) = &config.cmdsocket {
        tokio::spawn(cmdsock::run_cmdsock_listener(path.clone(), engine.clone()));
    }

    let interval = Duration::from_secs(config.neighbor_interval_secs);
    if config.watch_ipv4 {
        let watcher = NeighborWatcher::arp(&config.neighbor_device);
        tokio::spawn(watcher.run(engine.clone(), interval));
    }
    if config.watch_ipv6 {
        let watcher = NeighborWatcher::nd(&config.neighbor_device);
        tokio::spawn(watcher.run(engine.clone(), interval));
    }

    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("received SIGINT"),
        _ = sigterm.recv() => info!("received SIGTERM"),
    }

    info!("shutting down");
    if let Err(e) = save_status(&config, &engine).await {
        warn!("failed to save status: {:#}", e);
    }

    Ok(())
}
