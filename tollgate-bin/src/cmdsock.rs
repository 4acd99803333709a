//! Local admin socket: one JSON command per connection, half-close after
//! the response.

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tollgate_core::SessionEngine;
use tollgate_ipc::admin::{Command, Response};
use tracing::{error, info, warn};

async fn handle_connection(mut stream: UnixStream, engine: Arc<SessionEngine>) -> Result<()> {
    let mut buffer = Vec::new();
    stream.read_to_end(&mut buffer).await?;

    let response = match serde_json::from_slice::<Command>(&buffer) {
        Ok(Command::List) => Response::List(engine.list_sessions().await),
        Err(e) => {
            warn!("failed to deserialize admin command: {}", e);
            Response::Error(format!("deserialization failed: {}", e))
        }
    };

    let serialized = serde_json::to_vec(&response)?;
    stream.write_all(&serialized).await?;
    stream.shutdown().await?;

    Ok(())
}

pub async fn run_cmdsock_listener(path: String, engine: Arc<SessionEngine>) -> Result<()> {
    let socket_path = Path::new(&path);

    // Remove the socket file if it already exists
    if socket_path.exists() {
        std::fs::remove_file(socket_path)?;
    }

    let listener = UnixListener::bind(&path)?;
    info!("admin socket listening on {}", path);

    loop {
        match listener.accept().await {
            Ok((stream, _addr)) => {
                let engine = engine.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, engine).await {
                        error!("error handling admin connection: {}", e);
                    }
                });
            }
            Err(e) => {
                error!("admin socket accept error: {}", e);
            }
        }
    }
}
