//! turnstile-sinks — Destinations for access-attempt records.
//!
//! Every sink is enabled or disabled once, at construction, and then fails
//! independently: a sink that cannot persist a record reports `false` and
//! the caller moves on. Nothing here retries.

pub mod csv_log;
pub mod remote;

pub use csv_log::CsvLog;
pub use remote::{MemberRecord, RemoteConfig, RemoteLog};

use thiserror::Error;
use turnstile_core::AttemptRecord;

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid remote configuration: {0}")]
    InvalidConfig(String),
}

/// A persistence destination for attempt records.
pub trait AttemptSink {
    /// Short name used in logs.
    fn name(&self) -> &str;

    fn is_enabled(&self) -> bool;

    /// Persist one record. Returns `false` when disabled or on any failure.
    fn record(&mut self, record: &AttemptRecord) -> bool;
}
