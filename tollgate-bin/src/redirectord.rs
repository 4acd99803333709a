//! The HTTP redirector: bounces unauthorized clients to the portal splash
//! page, tagging their MAC from the neighbor table. Runs a single-threaded
//! reactor, no async runtime.

use anyhow::Result;
use std::sync::Arc;
use tollgate_bin::config;
use tollgate_net::neighbor::SystemNeighbors;
use tollgate_net::{Reactor, RedirectProtocol};
use tracing::info;

fn main() -> Result<()> {
    let config = config::load_config()?;
    tracing_subscriber::fmt()
        .with_max_level(config.loglevel.as_level())
        .init();

    info!("starting tollgate-redirectord");

    let protocol = Arc::new(RedirectProtocol::new(
        &config.splash_url,
        Arc::new(SystemNeighbors),
    ));

    let mut reactor = Reactor::new()?;
    reactor.listen(config.redirect_listen.parse()?, protocol)?;
    reactor.run()?;
    Ok(())
}
