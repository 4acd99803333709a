use serde::Deserialize;

use crate::session::SessionSource;

/// The log level for the daemons.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

// Helper functions for default values
fn default_foreground() -> bool { true }
fn default_loglevel() -> LogLevel { LogLevel::Info }
fn default_pidfile() -> String { "/var/run/tollgated.pid".to_string() }
fn default_statedir() -> String { "/var/run".to_string() }
fn default_cmdsocket() -> Option<String> { Some("/var/run/tollgate.sock".to_string()) }
fn default_access_listen() -> String { "0.0.0.0:7000".to_string() }
fn default_access_host() -> String { "127.0.0.1".to_string() }
fn default_access_port() -> u16 { 7000 }
fn default_access_timeout() -> u64 { 10 }
fn default_replay_window() -> i64 { 60 }
fn default_presence_sources() -> Vec<SessionSource> { vec![SessionSource::Arp, SessionSource::Nd] }
fn default_redirect_listen() -> String { "0.0.0.0:8080".to_string() }
fn default_splash_url() -> String { "http://localhost:8090/splash".to_string() }
fn default_http_listen() -> String { "0.0.0.0:8081".to_string() }
fn default_neighbor_device() -> String { "eth0".to_string() }
fn default_neighbor_interval() -> u64 { 30 }
fn default_watch_ipv4() -> bool { true }
fn default_watch_ipv6() -> bool { true }

/// The main configuration shared by the tollgate daemons.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Config {
    #[serde(default = "default_foreground")]
    pub foreground: bool,
    #[serde(default = "default_loglevel")]
    pub loglevel: LogLevel,
    #[serde(default = "default_pidfile")]
    pub pidfile: String,
    #[serde(default = "default_statedir")]
    pub statedir: String,

    /// Session-store snapshot written at shutdown and reloaded at startup.
    #[serde(default)]
    pub statusfile: Option<String>,
    #[serde(default = "default_cmdsocket")]
    pub cmdsocket: Option<String>,

    /// Where the access daemon listens for signed commands.
    #[serde(default = "default_access_listen")]
    pub access_listen: String,
    /// Where the session authority sends signed commands.
    #[serde(default = "default_access_host")]
    pub access_host: String,
    #[serde(default = "default_access_port")]
    pub access_port: u16,
    /// Shared HMAC key, hex-encoded. Must be identical on both ends.
    #[serde(default)]
    pub access_key: String,
    #[serde(default = "default_access_timeout")]
    pub access_timeout_secs: u64,
    /// Signed commands are accepted when their timestamp is within this
    /// many seconds of local time, in either direction.
    #[serde(default = "default_replay_window")]
    pub replay_window_secs: i64,

    /// Which session sources count as "still present" for the revocation
    /// rule. Link-layer sources only, unless deployment says otherwise.
    #[serde(default = "default_presence_sources")]
    pub presence_sources: Vec<SessionSource>,

    #[serde(default = "default_redirect_listen")]
    pub redirect_listen: String,
    /// Portal splash page clients are redirected to.
    #[serde(default = "default_splash_url")]
    pub splash_url: String,

    /// Session event/login HTTP API bind address.
    #[serde(default = "default_http_listen")]
    pub http_listen: String,

    #[serde(default = "default_neighbor_device")]
    pub neighbor_device: String,
    #[serde(default = "default_neighbor_interval")]
    pub neighbor_interval_secs: u64,
    #[serde(default = "default_watch_ipv4")]
    pub watch_ipv4: bool,
    #[serde(default = "default_watch_ipv6")]
    pub watch_ipv6: bool,
}

impl Config {
    /// Decodes the hex-encoded shared key. Empty means unconfigured.
    pub fn access_key_bytes(&self) -> Result<Vec<u8>, hex::FromHexError> {
        hex::decode(&self.access_key)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            foreground: default_foreground(),
            loglevel: default_loglevel(),
            pidfile: default_pidfile(),
            statedir: default_statedir(),
            statusfile: None,
            cmdsocket: default_cmdsocket(),
            access_listen: default_access_listen(),
            access_host: default_access_host(),
            access_port: default_access_port(),
            access_key: String::new(),
            access_timeout_secs: default_access_timeout(),
            replay_window_secs: default_replay_window(),
            presence_sources: default_presence_sources(),
            redirect_listen: default_redirect_listen(),
            splash_url: default_splash_url(),
            http_listen: default_http_listen(),
            neighbor_device: default_neighbor_device(),
            neighbor_interval_secs: default_neighbor_interval(),
            watch_ipv4: default_watch_ipv4(),
            watch_ipv6: default_watch_ipv6(),
        }
    }
}
