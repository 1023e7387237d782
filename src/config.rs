//! Environment-sourced configuration, validated once at startup.

use std::env;
use std::num::{ParseFloatError, ParseIntError};
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid integer in env var {name}: {source}")]
    InvalidInteger { name: String, source: ParseIntError },
    #[error("invalid float in env var {name}: {source}")]
    InvalidFloat { name: String, source: ParseFloatError },
    #[error("invalid socket address in env var {name}: {value}")]
    InvalidBindAddr { name: String, value: String },
    #[error("{name} must be greater than zero, got {value}")]
    NotPositive { name: String, value: String },
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub audit_service_url: String,
    pub bind_addr: String,
    pub cursor_path: PathBuf,
    pub max_traces: usize,
    pub trace_ttl_secs: f64,
    pub markov_window_capacity: usize,
    pub alpha: f64,
    pub poll_interval: Duration,
    pub poll_batch_size: usize,
    pub max_seen_events: usize,
    pub readiness_threshold: usize,
    pub score_history_capacity: usize,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let audit_service_url = env::var("AUDIT_SERVICE_URL")
            .unwrap_or_else(|_| "http://talos-audit-service:8001".to_owned());

        let bind_addr = env::var("AIOPS_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8200".to_owned());
        if bind_addr.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::InvalidBindAddr { name: "AIOPS_BIND_ADDR".to_owned(), value: bind_addr });
        }

        let cursor_path =
            PathBuf::from(env::var("AIOPS_CURSOR_PATH").unwrap_or_else(|_| "/data/cursor.json".to_owned()));

        let max_traces = read_positive_usize("AIOPS_MAX_TRACES", 10_000)?;
        let trace_ttl_secs = read_positive_f64("AIOPS_TRACE_TTL_SECS", 60.0)?;
        let markov_window_capacity = read_positive_usize("AIOPS_MARKOV_WINDOW_CAPACITY", 2_000)?;
        let alpha = read_positive_f64("AIOPS_ALPHA", 0.5)?;
        let poll_interval_secs = read_positive_u64("AIOPS_POLL_INTERVAL_SECS", 5)?;
        let poll_batch_size = read_positive_usize("AIOPS_POLL_BATCH_SIZE", 200)?;
        let max_seen_events = read_positive_usize("AIOPS_MAX_SEEN_EVENTS", 200_000)?;
        let readiness_threshold = read_positive_usize("AIOPS_READINESS_THRESHOLD", 100)?;
        let score_history_capacity = read_positive_usize("AIOPS_SCORE_HISTORY_CAPACITY", 100)?;

        Ok(Self {
            audit_service_url,
            bind_addr,
            cursor_path,
            max_traces,
            trace_ttl_secs,
            markov_window_capacity,
            alpha,
            poll_interval: Duration::from_secs(poll_interval_secs),
            poll_batch_size,
            max_seen_events,
            readiness_threshold,
            score_history_capacity,
        })
    }
}

fn read_positive_usize(name: &str, default: usize) -> Result<usize, ConfigError> {
    let raw = match env::var(name) {
        Ok(raw) => raw,
        Err(_) => return Ok(default),
    };
    let value: usize = raw
        .parse()
        .map_err(|source| ConfigError::InvalidInteger { name: name.to_owned(), source })?;
    if value == 0 {
        return Err(ConfigError::NotPositive { name: name.to_owned(), value: raw });
    }
    Ok(value)
}

fn read_positive_u64(name: &str, default: u64) -> Result<u64, ConfigError> {
    let raw = match env::var(name) {
        Ok(raw) => raw,
        Err(_) => return Ok(default),
    };
    let value: u64 = raw
        .parse()
        .map_err(|source| ConfigError::InvalidInteger { name: name.to_owned(), source })?;
    if value == 0 {
        return Err(ConfigError::NotPositive { name: name.to_owned(), value: raw });
    }
    Ok(value)
}

fn read_positive_f64(name: &str, default: f64) -> Result<f64, ConfigError> {
    let raw = match env::var(name) {
        Ok(raw) => raw,
        Err(_) => return Ok(default),
    };
    let value: f64 = raw
        .parse()
        .map_err(|source| ConfigError::InvalidFloat { name: name.to_owned(), source })?;
    if !(value > 0.0) {
        return Err(ConfigError::NotPositive { name: name.to_owned(), value: raw });
    }
    Ok(value)
}
