//! Library crate for lan-pulse-rs: address-range parsing, ICMP probing, bounded batch
//! scanning, rolling per-host history and the persisted scan-cycle scheduler.
pub mod addrparse;
pub mod config;
pub mod cycle;
pub mod error;
pub mod history;
pub mod logging;
pub mod netdetect;
pub mod prober;
pub mod scanner;
pub mod scheduler;
pub mod server;
pub mod store;
pub mod types;
