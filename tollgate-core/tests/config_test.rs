use tollgate_core::{Config, LogLevel, SessionSource};

fn load_test_config() -> Config {
    let config_contents =
        std::fs::read_to_string("tests/tollgate.toml").expect("Failed to read config file");
    toml::from_str(&config_contents).expect("Failed to parse config file")
}

#[test]
fn test_load_general_config() {
    let config = load_test_config();
    assert_eq!(config.foreground, true);
    assert_eq!(config.loglevel, LogLevel::Debug);
    assert_eq!(config.pidfile, "/var/run/tollgated.pid");
    assert_eq!(config.statedir, "/var/lib/tollgate");
    assert_eq!(
        config.statusfile,
        Some("/var/lib/tollgate/sessions.json".to_string())
    );
    assert_eq!(config.cmdsocket, Some("/var/run/tollgate.sock".to_string()));
}

#[test]
fn test_load_access_config() {
    let config = load_test_config();
    assert_eq!(config.access_listen, "0.0.0.0:7000");
    assert_eq!(config.access_host, "192.0.2.10");
    assert_eq!(config.access_port, 7000);
    assert_eq!(config.access_timeout_secs, 5);
    assert_eq!(config.replay_window_secs, 60);
    assert_eq!(
        config.access_key_bytes().unwrap(),
        vec![
            0xd7, 0xb4, 0xaa, 0x1f, 0x5a, 0x5e, 0x8c, 0x93, 0x80, 0xa6, 0xcc, 0x43, 0x7d, 0x86,
            0x54, 0xf1
        ]
    );
}

#[test]
fn test_load_session_config() {
    let config = load_test_config();
    assert_eq!(
        config.presence_sources,
        vec![SessionSource::Arp, SessionSource::Nd]
    );
    assert_eq!(config.neighbor_device, "eth0.10");
    assert_eq!(config.neighbor_interval_secs, 30);
    assert_eq!(config.watch_ipv4, true);
    assert_eq!(config.watch_ipv6, false);
}

#[test]
fn test_load_redirect_config() {
    let config = load_test_config();
    assert_eq!(config.redirect_listen, "0.0.0.0:8080");
    assert_eq!(config.splash_url, "http://portal.example.net/splash");
    assert_eq!(config.http_listen, "127.0.0.1:8081");
}

#[test]
fn test_defaults_when_fields_missing() {
    let config: Config = toml::from_str("").expect("empty config should parse");
    assert_eq!(config, Config::default());
    assert_eq!(config.access_port, 7000);
    assert_eq!(config.replay_window_secs, 60);
    assert_eq!(
        config.presence_sources,
        vec![SessionSource::Arp, SessionSource::Nd]
    );
    assert!(config.access_key_bytes().unwrap().is_empty());
}
