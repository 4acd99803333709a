//! Periodic ARP/ND watchers: diff the kernel neighbor table against the
//! previous snapshot and feed the changes to the session engine as
//! address-session start/end events.

use std::collections::HashSet;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tollgate_core::{SessionEngine, SessionSource};
use tracing::{debug, warn};

use crate::neighbor::{self, IpFamily};

pub struct NeighborWatcher {
    source: SessionSource,
    family: IpFamily,
    device: String,
    known: HashSet<(tollgate_core::MacAddress, IpAddr)>,
}

fn split_ip(ip: IpAddr) -> (Option<Ipv4Addr>, Option<Ipv6Addr>) {
    match ip {
        IpAddr::V4(v4) => (Some(v4), None),
        IpAddr::V6(v6) => (None, Some(v6)),
    }
}

impl NeighborWatcher {
    /// Watches the IPv4 neighbor table, reporting `arp` sessions.
    pub fn arp(device: &str) -> Self {
        NeighborWatcher {
            source: SessionSource::Arp,
            family: IpFamily::V4,
            device: device.to_string(),
            known: HashSet::new(),
        }
    }

    /// Watches the IPv6 neighbor table, reporting `nd` sessions.
    pub fn nd(device: &str) -> Self {
        NeighborWatcher {
            source: SessionSource::Nd,
            family: IpFamily::V6,
            device: device.to_string(),
            known: HashSet::new(),
        }
    }

    /// One poll cycle: entries that vanished end their sessions, new ones
    /// start sessions. The first cycle seeds the known set, starting
    /// sessions for everything already present.
    pub async fn poll_once(&mut self, engine: &SessionEngine) -> io::Result<()> {
        let current: HashSet<_> = neighbor::current_neighbors(self.family, &self.device)?
            .into_iter()
            .collect();
        let now = Utc::now().naive_utc();
        for (mac, ip) in self.known.difference(&current) {
            debug!("{} neighbor {} {} vanished", self.source, mac, ip);
            let (ipv4, ipv6) = split_ip(*ip);
            engine
                .address_session_ended(self.source, *mac, now, ipv4, ipv6)
                .await;
        }
        for (mac, ip) in current.difference(&self.known) {
            debug!("{} neighbor {} {} appeared", self.source, mac, ip);
            let (ipv4, ipv6) = split_ip(*ip);
            engine
                .address_session_started(self.source, *mac, now, ipv4, ipv6)
                .await;
        }
        self.known = current;
        Ok(())
    }

    /// Polls forever at the given interval. A failed poll is logged and
    /// retried on the next tick.
    pub async fn run(mut self, engine: Arc<SessionEngine>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if let Err(e) = self.poll_once(&engine).await {
                warn!("{} watcher poll failed: {}", self.source, e);
            }
        }
    }
}
