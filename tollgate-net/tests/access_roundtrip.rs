use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use chrono::Utc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tollgate_core::{AccessControl, EnforcementFailure, MacAddress};
use tollgate_ipc::envelope::{self, Action};
use tollgate_net::{AccessClient, AccessProtocol, EnforcementGateway, Reactor};

const KEY: &[u8] = b"\xd7\xb4\xaa\x1f\x5a\x5e\x8c\x93\x80\xa6\xcc\x43\x7d\x86\x54\xf1";

#[derive(Default)]
struct RecordingGateway {
    applied: Mutex<Vec<(Action, MacAddress)>>,
    fail: bool,
}

impl RecordingGateway {
    fn failing() -> Self {
        RecordingGateway {
            fail: true,
            ..Default::default()
        }
    }

    fn applied(&self) -> Vec<(Action, MacAddress)> {
        self.applied.lock().unwrap().clone()
    }
}

impl EnforcementGateway for RecordingGateway {
    fn apply(&self, action: Action, mac: MacAddress) -> Result<(), EnforcementFailure> {
        if self.fail {
            return Err(EnforcementFailure("filter unavailable".to_string()));
        }
        self.applied.lock().unwrap().push((action, mac));
        Ok(())
    }
}

fn mac1() -> MacAddress {
    "aa:bb:cc:dd:ee:ff".parse().unwrap()
}

fn spawn_access_daemon(gateway: Arc<RecordingGateway>) -> SocketAddr {
    let protocol = Arc::new(AccessProtocol::new(KEY.to_vec(), 60, gateway));
    let mut reactor = Reactor::new().unwrap();
    let addr = reactor
        .listen("127.0.0.1:0".parse().unwrap(), protocol)
        .unwrap();
    thread::spawn(move || {
        let _ = reactor.run();
    });
    addr
}

fn client_for(addr: SocketAddr, key: &[u8]) -> AccessClient {
    AccessClient::new("127.0.0.1", addr.port(), key.to_vec(), Duration::from_secs(5))
}

/// Sends raw bytes the way the client would and returns the decoded
/// response.
async fn send_raw(addr: SocketAddr, message: &[u8]) -> Result<(), String> {
    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    stream.write_all(message).await.unwrap();
    stream.shutdown().await.unwrap();
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    envelope::decode_response(&response).unwrap()
}

#[tokio::test]
async fn grant_and_revoke_round_trip() {
    let gateway = Arc::new(RecordingGateway::default());
    let addr = spawn_access_daemon(gateway.clone());
    let client = client_for(addr, KEY);

    client.grant(mac1()).await.unwrap();
    client.revoke(mac1()).await.unwrap();
    assert_eq!(
        gateway.applied(),
        vec![(Action::Grant, mac1()), (Action::Revoke, mac1())]
    );
}

#[tokio::test]
async fn wrong_key_is_rejected_and_not_applied() {
    let gateway = Arc::new(RecordingGateway::default());
    let addr = spawn_access_daemon(gateway.clone());
    let client = client_for(addr, b"wrong key");

    let err = client.grant(mac1()).await.unwrap_err();
    assert!(err.0.contains("Bad signature"), "got: {}", err.0);
    assert!(gateway.applied().is_empty());
}

#[tokio::test]
async fn stale_envelope_is_rejected() {
    let gateway = Arc::new(RecordingGateway::default());
    let addr = spawn_access_daemon(gateway.clone());

    let stale = Utc::now().naive_utc() - chrono::Duration::seconds(90);
    let message = envelope::build_at(KEY, Action::Grant, mac1(), stale);
    let response = send_raw(addr, &message).await;
    assert_eq!(response, Err("ERROR Time out of sync".to_string()));
    assert!(gateway.applied().is_empty());
}

#[tokio::test]
async fn future_envelope_is_rejected() {
    let gateway = Arc::new(RecordingGateway::default());
    let addr = spawn_access_daemon(gateway.clone());

    let skewed = Utc::now().naive_utc() + chrono::Duration::seconds(90);
    let message = envelope::build_at(KEY, Action::Grant, mac1(), skewed);
    let response = send_raw(addr, &message).await;
    assert_eq!(response, Err("ERROR Time out of sync".to_string()));
}

#[tokio::test]
async fn gateway_failure_surfaces_as_error_response() {
    let gateway = Arc::new(RecordingGateway::failing());
    let addr = spawn_access_daemon(gateway);
    let client = client_for(addr, KEY);

    let err = client.grant(mac1()).await.unwrap_err();
    assert!(err.0.contains("filter unavailable"), "got: {}", err.0);
}
