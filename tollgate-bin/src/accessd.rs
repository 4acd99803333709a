//! The enforcement frontend: validates signed commands arriving over TCP
//! and applies them to the packet filter. Runs a single-threaded reactor,
//! no async runtime.

use anyhow::Result;
use std::sync::Arc;
use tollgate_bin::config;
use tollgate_net::{AccessProtocol, PacketFilter, Reactor};
use tracing::info;

fn main() -> Result<()> {
    let config = config::load_config()?;
    tracing_subscriber::fmt()
        .with_max_level(config.loglevel.as_level())
        .init();

    info!("starting tollgate-accessd");

    let key = config::require_access_key(&config)?;

    let gateway = Arc::new(PacketFilter::new());
    let protocol = Arc::new(AccessProtocol::new(
        key,
        config.replay_window_secs,
        gateway,
    ));

    let mut reactor = Reactor::new()?;
    reactor.listen(config.access_listen.parse()?, protocol)?;
    reactor.run()?;
    Ok(())
}
