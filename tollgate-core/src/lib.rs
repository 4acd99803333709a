pub mod config;
pub mod error;
pub mod mac;
pub mod session;

pub use config::{Config, LogLevel};
pub use error::{EnforcementFailure, InvalidAddressFormat, SessionError};
pub use mac::MacAddress;
pub use session::{
    AddressSession, AddressSessionId, SessionEngine, SessionRow, SessionSource, SessionStore,
    UserSession, UserSessionId,
};

use async_trait::async_trait;

/// Issues grant/revoke commands toward the enforcement point.
///
/// The production implementation speaks the signed command protocol to the
/// access daemon; tests substitute a recording stub.
#[async_trait]
pub trait AccessControl: Send + Sync {
    async fn grant(&self, mac: MacAddress) -> Result<(), EnforcementFailure>;
    async fn revoke(&self, mac: MacAddress) -> Result<(), EnforcementFailure>;
}
