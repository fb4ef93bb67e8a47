//! Wallet settings
//!
//! Defaults, overridden by an optional TOML file, overridden by
//! `KIOSK_WALLET_*` environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use kiosk_cashu::mint_url::DEFAULT_MINT_URL;
use serde::{Deserialize, Serialize};

use crate::transport::nostr::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_PUBLISH_TIMEOUT};

/// Work dir under the home directory
pub const DEFAULT_WORK_DIR: &str = ".kiosk-wallet";
/// Config file inside the work dir
pub const CONFIG_FILE_NAME: &str = "config.toml";
/// Environment prefix
pub const ENV_PREFIX: &str = "KIOSK_WALLET";

/// Wallet settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Mint used until the ledger stores another one
    pub mint_url: String,
    /// Shop backend used to quote lightning addresses, LNURL-pay is used when unset
    pub backend_url: Option<String>,
    /// Relays for recipients whose profile names none
    pub relays: Vec<String>,
    /// Relay connect timeout in seconds
    pub relay_connect_timeout_secs: u64,
    /// Relay publish acknowledgement timeout in seconds
    pub relay_publish_timeout_secs: u64,
    /// Mint info and keys probe timeout in seconds
    pub probe_timeout_secs: u64,
    /// Timeout of any other http request in seconds
    pub http_timeout_secs: u64,
    /// Directory holding the ledger
    pub work_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mint_url: DEFAULT_MINT_URL.to_string(),
            backend_url: None,
            relays: Vec::new(),
            relay_connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT.as_secs(),
            relay_publish_timeout_secs: DEFAULT_PUBLISH_TIMEOUT.as_secs(),
            probe_timeout_secs: 10,
            http_timeout_secs: 30,
            work_dir: None,
        }
    }
}

impl Settings {
    /// Load settings, falling back to defaults when the sources are unusable
    #[must_use]
    pub fn new<P>(config_file_name: Option<P>) -> Self
    where
        P: Into<PathBuf>,
    {
        let default_settings = Self::default();
        match Self::new_from_default(&default_settings, config_file_name) {
            Ok(f) => f,
            Err(e) => {
                tracing::error!(
                    "Error reading config file, falling back to defaults. Error: {e:?}"
                );
                default_settings
            }
        }
    }

    /// Load settings on top of `default`
    ///
    /// The file is optional, a missing file leaves the defaults in place.
    pub fn new_from_default<P>(
        default: &Settings,
        config_file_name: Option<P>,
    ) -> Result<Self, ConfigError>
    where
        P: Into<PathBuf>,
    {
        let config_file = match config_file_name {
            Some(value) => Some(value.into()),
            None => default_work_dir().map(|dir| dir.join(CONFIG_FILE_NAME)),
        };

        let mut builder = Config::builder().add_source(Config::try_from(default)?);
        if let Some(config_file) = config_file {
            builder = builder.add_source(File::from(config_file).required(false));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("relays"),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Directory holding the ledger
    pub fn work_dir(&self) -> Option<PathBuf> {
        self.work_dir.clone().or_else(default_work_dir)
    }

    /// Relay connect timeout
    pub fn relay_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.relay_connect_timeout_secs)
    }

    /// Relay publish timeout
    pub fn relay_publish_timeout(&self) -> Duration {
        Duration::from_secs(self.relay_publish_timeout_secs)
    }

    /// Mint probe timeout
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    /// Http timeout
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

/// `~/.kiosk-wallet`
pub fn default_work_dir() -> Option<PathBuf> {
    home::home_dir().map(|home| home.join(DEFAULT_WORK_DIR))
}

/// Write `settings` as TOML
pub fn write_config_file(settings: &Settings, path: &Path) -> std::io::Result<()> {
    let toml = toml::to_string_pretty(settings)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    std::fs::write(path, toml)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.mint_url, "https://mint.coinos.io");
        assert_eq!(settings.relay_connect_timeout(), Duration::from_secs(5));
        assert_eq!(settings.relay_publish_timeout(), Duration::from_secs(6));
        assert_eq!(settings.probe_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
mint_url = "https://mint.example.com"
relays = ["wss://relay.example.com"]
probe_timeout_secs = 3
"#,
        )
        .unwrap();

        let settings = Settings::new_from_default(&Settings::default(), Some(path)).unwrap();
        assert_eq!(settings.mint_url, "https://mint.example.com");
        assert_eq!(settings.relays, vec!["wss://relay.example.com".to_string()]);
        assert_eq!(settings.probe_timeout(), Duration::from_secs(3));
        assert_eq!(settings.relay_connect_timeout_secs, 5);
    }

    #[test]
    fn test_missing_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::new(Some(dir.path().join("absent.toml")));
        assert_eq!(settings.mint_url, Settings::default().mint_url);
    }

    #[test]
    fn test_write_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let settings = Settings {
            backend_url: Some("https://shop.example.com/api".to_string()),
            work_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        };

        write_config_file(&settings, &path).unwrap();
        let loaded = Settings::new_from_default(&Settings::default(), Some(path)).unwrap();
        assert_eq!(loaded.backend_url, settings.backend_url);
        assert_eq!(loaded.work_dir, settings.work_dir);
    }
}
