//! The enforcement frontend protocol and the signed-command client.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tollgate_core::{AccessControl, EnforcementFailure, MacAddress};
use tollgate_ipc::envelope::{self, Action, ProtocolError};
use tollgate_ipc::netstring;
use tracing::{info, warn};

use crate::firewall::EnforcementGateway;
use crate::reactor::Protocol;

/// Reactor protocol variant for the access daemon: validates one signed
/// envelope per connection and forwards the bare command to the gateway.
pub struct AccessProtocol {
    key: Vec<u8>,
    window_secs: i64,
    gateway: Arc<dyn EnforcementGateway>,
}

impl AccessProtocol {
    pub fn new(key: Vec<u8>, window_secs: i64, gateway: Arc<dyn EnforcementGateway>) -> Self {
        AccessProtocol {
            key,
            window_secs,
            gateway,
        }
    }
}

/// Rejection category reported to the peer. Deliberately generic: the
/// response never describes which validation internals tripped.
fn rejection_reason(err: &ProtocolError) -> &'static str {
    match err {
        ProtocolError::BadSignatureEncoding | ProtocolError::BadSignature => "Bad signature",
        ProtocolError::InvalidAction => "Invalid action",
        ProtocolError::InvalidAddressFormat(_) => "Invalid address",
        ProtocolError::InvalidTimestamp => "Invalid timestamp",
        ProtocolError::ReplayWindowExceeded => "Time out of sync",
        ProtocolError::Frame(_) => "Malformed request",
    }
}

impl Protocol for AccessProtocol {
    fn request_complete(&self, buf: &[u8]) -> bool {
        netstring::is_complete(buf)
    }

    fn build_response(&self, buf: &[u8], peer: SocketAddr) -> Vec<u8> {
        match envelope::validate(&self.key, buf, self.window_secs) {
            Ok(command) => {
                info!(
                    "valid request from {} to {} {}",
                    peer, command.action, command.mac
                );
                match self.gateway.apply(command.action, command.mac) {
                    Ok(()) => envelope::ok_response(),
                    Err(e) => {
                        warn!("enforcement failed for {} {}: {}", command.action, command.mac, e);
                        envelope::error_response(&e.0)
                    }
                }
            }
            // Framing failures mean no well-formed request was ever
            // observed; close without a response.
            Err(ProtocolError::Frame(e)) => {
                warn!("malformed request from {}: {}", peer, e);
                Vec::new()
            }
            Err(e) => {
                warn!("rejected request from {}: {}", peer, e);
                envelope::error_response(rejection_reason(&e))
            }
        }
    }
}

/// Sends signed grant/revoke commands to the access daemon, one exchange
/// per connection.
pub struct AccessClient {
    host: String,
    port: u16,
    key: Vec<u8>,
    timeout: Duration,
}

impl AccessClient {
    pub fn new(host: &str, port: u16, key: Vec<u8>, timeout: Duration) -> Self {
        AccessClient {
            host: host.to_string(),
            port,
            key,
            timeout,
        }
    }

    async fn exchange(&self, message: &[u8]) -> std::io::Result<Vec<u8>> {
        let stream = TcpStream::connect((self.host.as_str(), self.port)).await?;
        stream.set_nodelay(true)?;
        let mut stream = stream;
        stream.write_all(message).await?;
        stream.shutdown().await?;
        let mut response = Vec::new();
        stream.read_to_end(&mut response).await?;
        Ok(response)
    }

    async fn send(&self, action: Action, mac: MacAddress) -> Result<(), EnforcementFailure> {
        let message = envelope::build(&self.key, action, mac);
        let response = tokio::time::timeout(self.timeout, self.exchange(&message))
            .await
            .map_err(|_| EnforcementFailure(format!("timed out sending {action} for {mac}")))?
            .map_err(|e| EnforcementFailure(format!("sending {action} for {mac}: {e}")))?;
        match envelope::decode_response(&response)
            .map_err(|e| EnforcementFailure(format!("unreadable response: {e}")))?
        {
            Ok(()) => Ok(()),
            Err(text) => Err(EnforcementFailure(text)),
        }
    }
}

#[async_trait]
impl AccessControl for AccessClient {
    async fn grant(&self, mac: MacAddress) -> Result<(), EnforcementFailure> {
        self.send(Action::Grant, mac).await
    }

    async fn revoke(&self, mac: MacAddress) -> Result<(), EnforcementFailure> {
        self.send(Action::Revoke, mac).await
    }
}
