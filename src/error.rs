use std::path::PathBuf;

use thiserror::Error;

/// Operator input that cannot be accepted as-is. Never partially applied.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("no addresses given")]
    Empty,
    #[error("invalid address(es): {}", .0.join(", "))]
    InvalidAddresses(Vec<String>),
    #[error("too many addresses: {count} (max {max})")]
    TooMany { count: usize, max: usize },
}

/// Failure of the backing record or cycle store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode store contents: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write config {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Errors surfaced by scheduler and manual probe operations.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Input(#[from] InputError),
    #[error(transparent)]
    Persistence(#[from] StoreError),
    #[error("none of the {total} probe results could be persisted; cycle left unadvanced")]
    CycleNotPersisted { total: usize },
    #[error("cycle interval of {interval_secs}s puts the next scan out of range")]
    ScheduleOutOfRange { interval_secs: u64 },
}
