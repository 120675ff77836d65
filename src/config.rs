//! Configuration for the peerwatch daemon.
//!
//! A single `config.toml` holds three sections: `[network]`, `[logging]` and
//! `[stats]`. Every field has a default, so an empty file (or a file with
//! only the values someone cares about) is valid. On first run a missing
//! file is written out with the defaults.

use serde::{Deserialize, Serialize};
use std::fs;
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use crate::constants::protocol;
use crate::error::AppError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub stats: StatsConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Accept inbound connections
    pub listen: bool,
    pub port: u16,
    /// Network magic, little-endian on the wire
    pub magic: u32,
    pub min_peers: usize,
    pub max_peers: usize,
    /// Drop peers silent for this long
    pub idle_timeout_secs: u64,
    pub protocol_version: u32,
    pub services: u64,
    pub client_name: String,
    /// Chain height we claim in `version`
    pub known_height: u32,
    /// Fixed external address. When set, addresses reported by peers are
    /// ignored.
    pub external_address: Option<String>,
    /// Hostnames resolved at launch
    pub dns_seeds: Vec<String>,
    /// `host:port` seeds dialed directly. When non-empty DNS is skipped.
    pub seeds: Vec<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen: true,
            port: protocol::DEFAULT_PORT,
            magic: protocol::MAIN_NET_MAGIC,
            min_peers: 3,
            max_peers: 20,
            idle_timeout_secs: 30 * 60,
            protocol_version: protocol::PROTOCOL_VERSION,
            services: protocol::DEFAULT_SERVICES,
            client_name: default_client_name(),
            known_height: 0,
            external_address: None,
            dns_seeds: protocol::DNS_SEEDS.iter().map(|s| s.to_string()).collect(),
            seeds: Vec::new(),
        }
    }
}

fn default_client_name() -> String {
    format!("/peerwatch:{}/", env!("CARGO_PKG_VERSION"))
}

impl NetworkConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn external_ip(&self) -> Result<Option<IpAddr>, AppError> {
        self.external_address
            .as_deref()
            .map(|s| {
                s.parse::<IpAddr>()
                    .map_err(|_| AppError::Config(format!("invalid external_address: {}", s)))
            })
            .transpose()
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.max_peers == 0 {
            return Err(AppError::Config("max_peers must be at least 1".to_string()));
        }
        if self.min_peers > self.max_peers {
            return Err(AppError::Config(format!(
                "min_peers ({}) exceeds max_peers ({})",
                self.min_peers, self.max_peers
            )));
        }
        if self.client_name.len() > 256 {
            return Err(AppError::Config("client_name is too long".to_string()));
        }
        self.external_ip()?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// `pretty` or `json`
    pub format: String,
    /// `stdout` or `file`
    pub output: String,
    pub file_path: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            output: "stdout".to_string(),
            file_path: "./logs/peerwatch.log".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    /// Transactions tracked at once; the least recently announced is dropped.
    pub max_tracked: usize,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self { max_tracked: 10_000 }
    }
}

impl Config {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.network.validate()?;
        Ok(config)
    }

    /// Load `path`, writing the defaults there first if it does not exist.
    pub fn load_or_create(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let path = path.as_ref();
        if path.exists() {
            return Self::load_from_file(path);
        }

        let config = Config::default();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        config.save_to_file(path)?;
        tracing::info!("📝 Wrote default configuration to {}", path.display());
        Ok(config)
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), AppError> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// `PEERWATCH_MIN_PEERS` / `PEERWATCH_MAX_PEERS`. Unparseable values are
    /// ignored with a warning.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        for (key, slot) in [
            ("PEERWATCH_MIN_PEERS", &mut self.network.min_peers),
            ("PEERWATCH_MAX_PEERS", &mut self.network.max_peers),
        ] {
            if let Some(raw) = lookup(key) {
                match raw.trim().parse::<usize>() {
                    Ok(value) => *slot = value,
                    Err(_) => tracing::warn!("Ignoring {}={:?}: not a number", key, raw),
                }
            }
        }
    }
}
