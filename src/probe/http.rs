//! HTTP probe implementation.

use super::ProbeError;
use std::time::Duration;

/// Run an HTTP probe against the given address.
///
/// Any transport failure or a response status of 400 and above is an error.
/// The response body is not read; dropping the response releases the
/// connection.
pub async fn run_http_probe(address: &str, timeout: Duration) -> Result<(), ProbeError> {
    let url = if address.starts_with("http://") || address.starts_with("https://") {
        address.to_string()
    } else {
        format!("http://{}", address)
    };

    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ProbeError::Network(e.to_string()))?;

    let response = client.get(&url).send().await.map_err(|e| {
        if e.is_timeout() {
            ProbeError::Timeout(timeout)
        } else if e.is_builder() {
            ProbeError::Address(url.clone())
        } else {
            ProbeError::Network(e.to_string())
        }
    })?;

    let status = response.status();
    if status.is_client_error() || status.is_server_error() {
        return Err(ProbeError::Status(status.as_u16()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{closed_port, spawn_http_server};

    #[tokio::test]
    async fn test_http_probe_success() {
        let addr = spawn_http_server().await;
        let result = run_http_probe(&format!("http://{}/ok", addr), Duration::from_secs(2)).await;
        assert_eq!(result, Ok(()));
    }

    #[tokio::test]
    async fn test_http_probe_adds_scheme() {
        let addr = spawn_http_server().await;
        let result = run_http_probe(&format!("{}/ok", addr), Duration::from_secs(2)).await;
        assert_eq!(result, Ok(()));
    }

    #[tokio::test]
    async fn test_http_probe_error_status() {
        let addr = spawn_http_server().await;
        let result = run_http_probe(&format!("http://{}/fail", addr), Duration::from_secs(2)).await;
        assert_eq!(result, Err(ProbeError::Status(500)));

        let result = run_http_probe(&format!("http://{}/missing", addr), Duration::from_secs(2)).await;
        assert_eq!(result, Err(ProbeError::Status(404)));
    }

    #[tokio::test]
    async fn test_http_probe_connection_refused() {
        let port = closed_port().await;
        let result = run_http_probe(&format!("http://127.0.0.1:{}", port), Duration::from_secs(1)).await;
        assert!(matches!(result, Err(ProbeError::Network(_))));
    }
}
