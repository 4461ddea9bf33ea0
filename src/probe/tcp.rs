//! TCP connect probe implementation.

use super::ProbeError;
use reqwest::Url;
use std::time::Duration;
use tokio::net::TcpStream;

/// Run a TCP connect probe against the given address.
///
/// Success means the connection was established; it is closed right away.
pub async fn run_tcp_probe(address: &str, timeout: Duration) -> Result<(), ProbeError> {
    let addr = connect_address(address)?;

    match tokio::time::timeout(timeout, TcpStream::connect(&addr)).await {
        Ok(Ok(_stream)) => Ok(()),
        Ok(Err(e)) => Err(ProbeError::Network(format!("connect to {}: {}", addr, e))),
        Err(_) => Err(ProbeError::Timeout(timeout)),
    }
}

/// Turn a configured address into `host:port`.
///
/// Plain `host:port` is used as-is; URLs contribute their host and explicit
/// or scheme-default port.
fn connect_address(address: &str) -> Result<String, ProbeError> {
    if !address.contains("://") {
        return Ok(address.to_string());
    }

    let url = Url::parse(address).map_err(|e| ProbeError::Address(format!("{}: {}", address, e)))?;
    let host = url
        .host_str()
        .ok_or_else(|| ProbeError::Address(format!("{}: missing host", address)))?;
    let port = url
        .port_or_known_default()
        .ok_or_else(|| ProbeError::Address(format!("{}: missing port", address)))?;

    if host.contains(':') && !host.starts_with('[') {
        Ok(format!("[{}]:{}", host, port))
    } else {
        Ok(format!("{}:{}", host, port))
    }
}
