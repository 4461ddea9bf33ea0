//! Probe module for endpoint reachability checks.
//!
//! Supports HTTP request/response probes and TCP connect probes.

mod http;
mod tcp;

pub use http::*;
pub use tcp::*;

use std::time::{Duration, Instant};
use thiserror::Error;

/// Probe error types.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
    #[error("network error: {0}")]
    Network(String),
    #[error("HTTP status {0}")]
    Status(u16),
    #[error("invalid address: {0}")]
    Address(String),
}

/// How a target is probed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeMethod {
    /// Issue one GET request; transport errors and 4xx/5xx responses fail.
    Http,
    /// Open a TCP connection and close it again.
    Tcp,
}

impl ProbeMethod {
    /// Parse a configured method name. Unknown names fall back to TCP.
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_uppercase().as_str() {
            "HTTP" | "HTTPS" => ProbeMethod::Http,
            _ => ProbeMethod::Tcp,
        }
    }
}

/// Probe configuration.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub method: ProbeMethod,
    pub address: String,
    pub timeout: Duration,
}

impl ProbeConfig {
    pub fn new(method: ProbeMethod, address: &str, timeout: Duration) -> Self {
        Self {
            method,
            address: address.to_string(),
            timeout,
        }
    }
}

/// Result of one probe: elapsed time plus success or the failure reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReport {
    pub elapsed: Duration,
    pub result: Result<(), ProbeError>,
}

impl ProbeReport {
    pub fn success(elapsed: Duration) -> Self {
        Self {
            elapsed,
            result: Ok(()),
        }
    }

    pub fn failure(elapsed: Duration, error: ProbeError) -> Self {
        Self {
            elapsed,
            result: Err(error),
        }
    }
}

/// Run a probe with the given configuration.
///
/// Never retries. Always returns within roughly `config.timeout`.
pub async fn run_probe(config: &ProbeConfig) -> ProbeReport {
    let start = Instant::now();

    let probe = async {
        match config.method {
            ProbeMethod::Http => run_http_probe(&config.address, config.timeout).await,
            ProbeMethod::Tcp => run_tcp_probe(&config.address, config.timeout).await,
        }
    };

    let result = tokio::time::timeout(config.timeout, probe).await;
    let elapsed = start.elapsed();

    match result {
        Ok(Ok(())) => ProbeReport::success(elapsed),
        Ok(Err(e)) => ProbeReport::failure(elapsed, e),
        Err(_) => ProbeReport::failure(elapsed, ProbeError::Timeout(config.timeout)),
    }
}
