pub mod access;
pub mod firewall;
pub mod neighbor;
pub mod reactor;
pub mod redirect;
pub mod watcher;

pub use access::{AccessClient, AccessProtocol};
pub use firewall::{EnforcementGateway, PacketFilter};
pub use neighbor::NeighborResolver;
pub use reactor::{Protocol, Reactor};
pub use redirect::RedirectProtocol;
pub use watcher::NeighborWatcher;
