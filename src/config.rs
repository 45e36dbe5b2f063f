use std::{fmt, fs, path::Path, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::history::DEFAULT_HISTORY_CAP;
use crate::scanner::DEFAULT_MAX_CONCURRENCY;

/// Default largest number of addresses accepted by a single request.
pub const DEFAULT_MAX_ADDRESSES_PER_REQUEST: usize = 500;

/// Longest accepted gap between scan cycles (one year).
pub const MAX_CYCLE_INTERVAL_SECS: u64 = 366 * 24 * 60 * 60;

/// Longest accepted single-probe timeout.
pub const MAX_PROBE_TIMEOUT_MS: u64 = 60_000;

/// Runtime configuration. Every field has a default, so a partial file is fine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding `ip-list.json` and `scan-info.json`.
    pub data_dir: PathBuf,
    /// Address the admin API listens on.
    pub bind: String,
    pub cycle_interval_secs: u64,
    pub max_concurrency: usize,
    pub probe_timeout_ms: u64,
    pub history_cap: usize,
    pub max_addresses_per_request: usize,
    pub tick_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            bind: "127.0.0.1:8080".into(),
            cycle_interval_secs: 10 * 60,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            probe_timeout_ms: 1000,
            history_cap: DEFAULT_HISTORY_CAP,
            max_addresses_per_request: DEFAULT_MAX_ADDRESSES_PER_REQUEST,
            tick_ms: 1000,
        }
    }
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &Path) -> PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

impl Config {
    /// Load configuration from `path`, or use defaults when no path is given.
    ///
    /// A path that does not exist yet is created with the default configuration.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let path = normalize_toml_path(path);

        if path.exists() {
            let raw = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
                path: path.clone(),
                source,
            })?;
            let config: Self =
                toml::from_str(&raw).map_err(|source| ConfigError::Parse { path, source })?;
            config.validate()?;
            Ok(config)
        } else {
            let config = Self::default();
            config.write(&path)?;
            Ok(config)
        }
    }

    /// Reject values the scheduler cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field: &'static str, reason: String| -> Result<(), ConfigError> {
            Err(ConfigError::Invalid { field, reason })
        };

        if !(1..=MAX_CYCLE_INTERVAL_SECS).contains(&self.cycle_interval_secs) {
            return invalid(
                "cycle_interval_secs",
                format!("must be between 1 and {MAX_CYCLE_INTERVAL_SECS}"),
            );
        }
        if !(1..=MAX_PROBE_TIMEOUT_MS).contains(&self.probe_timeout_ms) {
            return invalid(
                "probe_timeout_ms",
                format!("must be between 1 and {MAX_PROBE_TIMEOUT_MS}"),
            );
        }
        if self.max_concurrency == 0 {
            return invalid("max_concurrency", "must be at least 1".into());
        }
        if self.history_cap == 0 {
            return invalid("history_cap", "must be at least 1".into());
        }
        if self.max_addresses_per_request == 0 {
            return invalid("max_addresses_per_request", "must be at least 1".into());
        }
        if self.tick_ms == 0 {
            return invalid("tick_ms", "must be at least 1".into());
        }
        Ok(())
    }

    /// Serialize and write the config to a file
    pub fn write(&self, path: &Path) -> Result<(), ConfigError> {
        let raw = toml::to_string_pretty(self)?;
        let write_err = |source: std::io::Error| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        fs::write(path, raw).map_err(write_err)
    }

    pub fn records_path(&self) -> PathBuf {
        self.data_dir.join("ip-list.json")
    }

    pub fn cycle_path(&self) -> PathBuf {
        self.data_dir.join("scan-info.json")
    }

    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.cycle_interval_secs.max(1))
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(10))
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let row = |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
            writeln!(f, "  {label:<22}: {value}")
        };
        writeln!(f, "lan-pulse-rs configuration:")?;
        row(f, "data_dir", &self.data_dir.display())?;
        row(f, "bind", &self.bind)?;
        row(f, "cycle_interval_secs", &self.cycle_interval_secs)?;
        row(f, "max_concurrency", &self.max_concurrency)?;
        row(f, "probe_timeout_ms", &self.probe_timeout_ms)?;
        row(f, "history_cap", &self.history_cap)?;
        row(f, "max_addresses_per_req", &self.max_addresses_per_request)?;
        row(f, "tick_ms", &self.tick_ms)
    }
}
