use anyhow::{bail, Context, Result};
use clap::Parser;
use std::fs;
use std::path::PathBuf;
use tollgate_core::Config;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    #[clap(short, long, value_parser, default_value = "/etc/tollgate/tollgate.toml")]
    pub config_file: PathBuf,
}

pub fn load_config() -> Result<Config> {
    let args = Args::parse();
    load_config_from_path(&args.config_file)
}

pub fn load_config_from_path(path: &PathBuf) -> Result<Config> {
    let config_contents = fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    let config: Config = toml::from_str(&config_contents)
        .with_context(|| format!("parsing config file {}", path.display()))?;
    Ok(config)
}

/// The shared key, decoded and checked for presence. Every daemon needs
/// it, and a missing key is a configuration mistake worth a clear message.
pub fn require_access_key(config: &Config) -> Result<Vec<u8>> {
    let key = config
        .access_key_bytes()
        .context("access_key is not valid hex")?;
    if key.is_empty() {
        bail!("access_key must be set in the config file");
    }
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn loads_a_minimal_config_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "access_key = \"00ff00ff\"\nneighbor_device = \"wlan0\""
        )
        .unwrap();

        let config = load_config_from_path(&file.path().to_path_buf()).unwrap();
        assert_eq!(config.neighbor_device, "wlan0");
        assert_eq!(require_access_key(&config).unwrap(), vec![0x00, 0xff, 0x00, 0xff]);
        // Everything else falls back to defaults.
        assert_eq!(config.access_port, 7000);
    }

    #[test]
    fn missing_key_is_an_error() {
        let config = Config::default();
        assert!(require_access_key(&config).is_err());
    }

    #[test]
    fn odd_hex_key_is_an_error() {
        let config = Config {
            access_key: "abc".to_string(),
            ..Config::default()
        };
        assert!(require_access_key(&config).is_err());
    }
}
