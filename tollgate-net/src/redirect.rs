//! Reactor protocol variant for the HTTP redirector: answer any request
//! with a 302 to the portal splash page, tagging the client's MAC and the
//! URL it was trying to reach.

use std::net::SocketAddr;
use std::sync::Arc;

use chrono::Utc;
use tracing::warn;
use url::form_urlencoded;

use crate::neighbor::NeighborResolver;
use crate::reactor::Protocol;

pub struct RedirectProtocol {
    splash_url: String,
    resolver: Arc<dyn NeighborResolver>,
}

impl RedirectProtocol {
    pub fn new(splash_url: &str, resolver: Arc<dyn NeighborResolver>) -> Self {
        RedirectProtocol {
            splash_url: splash_url.to_string(),
            resolver,
        }
    }
}

/// Reconstructs the URL the client asked for from the request line and the
/// Host header.
fn original_url(request: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(request);
    let mut lines = text.lines();
    let request_line = lines.next()?;
    let mut parts = request_line.split_whitespace();
    let _method = parts.next()?;
    let path = parts.next()?;
    let host = lines
        .map(str::trim_end)
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("host").then(|| value.trim())
        })?;
    Some(format!("http://{host}{path}"))
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

impl Protocol for RedirectProtocol {
    fn request_complete(&self, buf: &[u8]) -> bool {
        buf.windows(3).any(|w| w == b"\n\r\n") || buf.windows(2).any(|w| w == b"\n\n")
    }

    fn build_response(&self, buf: &[u8], peer: SocketAddr) -> Vec<u8> {
        let Some(mac) = self.resolver.mac_for(peer.ip()) else {
            warn!("MAC for {} not found", peer.ip());
            return Vec::new();
        };
        let mut location = format!("{}?mac={}", self.splash_url, mac.raw_hex());
        if let Some(orig) = original_url(buf) {
            let encoded: String = form_urlencoded::byte_serialize(orig.as_bytes()).collect();
            location.push_str("&origurl=");
            location.push_str(&encoded);
        }
        let body = format!(
            "<html><head>\n<title>Redirect</title>\n</head><body>\n<h1>Redirect</h1>\n\
             <p>You are being redirected to <a href=\"{}\">here</a>.</p>\n</body></html>\n",
            html_escape(&location)
        );
        let date = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT");
        let mut response = format!(
            "HTTP/1.1 302 Found\r\nDate: {}\r\nLocation: {}\r\nContent-Length: {}\r\n\
             Content-Type: text/html; charset=us-ascii\r\n\r\n",
            date,
            location,
            body.len()
        )
        .into_bytes();
        response.extend_from_slice(body.as_bytes());
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tollgate_core::MacAddress;

    struct FixedResolver(Option<MacAddress>);

    impl NeighborResolver for FixedResolver {
        fn mac_for(&self, _addr: std::net::IpAddr) -> Option<MacAddress> {
            self.0
        }
    }

    fn protocol(mac: Option<MacAddress>) -> RedirectProtocol {
        RedirectProtocol::new("http://localhost:8090/splash", Arc::new(FixedResolver(mac)))
    }

    fn peer() -> SocketAddr {
        "10.0.0.7:49152".parse().unwrap()
    }

    #[test]
    fn request_is_complete_at_blank_line() {
        let p = protocol(None);
        assert!(!p.request_complete(b"GET / HTTP/1.1\r\nHost: example.com\r\n"));
        assert!(p.request_complete(b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n"));
        assert!(p.request_complete(b"GET / HTTP/1.1\nHost: example.com\n\n"));
    }

    #[test]
    fn redirects_with_mac_and_original_url() {
        let mac: MacAddress = "aa:bb:cc:dd:ee:ff".parse().unwrap();
        let p = protocol(Some(mac));
        let response = p.build_response(
            b"GET /search?q=cats HTTP/1.1\r\nHost: example.com\r\n\r\n",
            peer(),
        );
        let text = String::from_utf8_lossy(&response);
        assert!(text.starts_with("HTTP/1.1 302 Found\r\n"));
        assert!(text.contains(
            "Location: http://localhost:8090/splash?mac=aabbccddeeff\
             &origurl=http%3A%2F%2Fexample.com%2Fsearch%3Fq%3Dcats"
        ));
        assert!(text.contains("Content-Type: text/html"));
    }

    #[test]
    fn missing_host_header_still_redirects() {
        let mac: MacAddress = "aa:bb:cc:dd:ee:ff".parse().unwrap();
        let p = protocol(Some(mac));
        let response = p.build_response(b"GET / HTTP/1.0\r\n\r\n", peer());
        let text = String::from_utf8_lossy(&response);
        assert!(text.contains("Location: http://localhost:8090/splash?mac=aabbccddeeff\r\n"));
        assert!(!text.contains("origurl"));
    }

    #[test]
    fn unknown_peer_gets_no_response() {
        let p = protocol(None);
        let response = p.build_response(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n", peer());
        assert!(response.is_empty());
    }
}
