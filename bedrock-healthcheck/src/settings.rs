use std::time::Duration;

use anyhow::{Result, bail};
use config::{Config, ConfigError, Environment};
use log::{debug, warn};
use serde::Deserialize;

use crate::probes::{ProbeProtocol, Target};

const DEFAULT_MINECRAFT_HOST: &str = "127.0.0.1";
const DEFAULT_MINECRAFT_PORT: u16 = 19132;
const DEFAULT_PROMETHEUS_HOST: &str = "127.0.0.1";
const DEFAULT_PROMETHEUS_PORT: u16 = 9001;
const DEFAULT_PROBE_INTERVAL_MS: u64 = 1000;
const DEFAULT_PROBE_TIMEOUT_MS: u64 = 1000;

/// Variables we read from the environment. Everything else in the
/// environment is ignored.
const KNOWN_KEYS: [&str; 7] = [
    "MINECRAFT_HOST",
    "MINECRAFT_PORT",
    "PROMETHEUS_HOST",
    "PROMETHEUS_PORT",
    "PROBE_PROTOCOL",
    "PROBE_INTERVAL_MS",
    "PROBE_TIMEOUT_MS",
];

fn default_minecraft_host() -> String {
    DEFAULT_MINECRAFT_HOST.to_string()
}

fn default_minecraft_port() -> u16 {
    DEFAULT_MINECRAFT_PORT
}

fn default_prometheus_host() -> String {
    DEFAULT_PROMETHEUS_HOST.to_string()
}

fn default_prometheus_port() -> u16 {
    DEFAULT_PROMETHEUS_PORT
}

fn default_probe_interval_ms() -> u64 {
    DEFAULT_PROBE_INTERVAL_MS
}

fn default_probe_timeout_ms() -> u64 {
    DEFAULT_PROBE_TIMEOUT_MS
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct Settings {
    #[serde(default = "default_minecraft_host")]
    pub minecraft_host: String,
    #[serde(default = "default_minecraft_port")]
    pub minecraft_port: u16,
    #[serde(default = "default_prometheus_host")]
    pub prometheus_host: String,
    #[serde(default = "default_prometheus_port")]
    pub prometheus_port: u16,
    #[serde(default)]
    pub probe_protocol: ProbeProtocol,
    #[serde(default = "default_probe_interval_ms")]
    pub probe_interval_ms: u64,
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            minecraft_host: default_minecraft_host(),
            minecraft_port: default_minecraft_port(),
            prometheus_host: default_prometheus_host(),
            prometheus_port: default_prometheus_port(),
            probe_protocol: ProbeProtocol::default(),
            probe_interval_ms: default_probe_interval_ms(),
            probe_timeout_ms: default_probe_timeout_ms(),
        }
    }
}

impl Settings {
    pub fn new() -> Result<Self> {
        dotenvy::dotenv().ok();

        for key in KNOWN_KEYS {
            if let Ok(value) = std::env::var(key) {
                debug!("ENV: {}={}", key, value);
            }
        }

        let settings = Self::from_environment(Environment::default())?;
        debug!("Parsed settings: {:?}", settings);
        settings.validate()?;
        Ok(settings)
    }

    fn from_environment(environment: Environment) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(environment.separator("__").try_parsing(true))
            .build()?;

        s.try_deserialize()
    }

    pub fn validate(&self) -> Result<()> {
        if self.minecraft_port == 0 {
            bail!("MINECRAFT_PORT must be between 1 and 65535");
        }
        if self.minecraft_host.trim().is_empty() {
            bail!("MINECRAFT_HOST must not be empty");
        }
        if self.probe_interval_ms == 0 {
            bail!("PROBE_INTERVAL_MS must be greater than zero");
        }
        if self.probe_timeout_ms == 0 {
            bail!("PROBE_TIMEOUT_MS must be greater than zero");
        }
        if self.probe_timeout_ms > self.probe_interval_ms {
            warn!(
                "PROBE_TIMEOUT_MS ({}) exceeds PROBE_INTERVAL_MS ({}); slow probes will delay the next check",
                self.probe_timeout_ms, self.probe_interval_ms
            );
        }
        Ok(())
    }

    pub fn target(&self) -> Target {
        Target::new(self.minecraft_host.clone(), self.minecraft_port)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}
