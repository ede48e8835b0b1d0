//! Readiness probes against the discovered HTTP address.

use super::tls;
use crate::config::ReadinessDefaults;
use crate::error::{NodeError, Result};
use crate::output::NetworkAddress;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::debug;

/// Boundary checks used by the supervisor's readiness protocol.
///
/// Probes never fail: every error means "not ready yet" and the supervisor
/// retries until its deadline.
#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    /// Whether a TCP connection to the address can be established.
    async fn port_open(&self, address: &NetworkAddress) -> bool;

    /// Whether a TLS handshake with the address succeeds.
    async fn tls_enabled(&self, address: &NetworkAddress) -> bool;

    /// Whether the node at `base_url` reports a healthy cluster.
    async fn healthy(&self, base_url: &str) -> bool;
}

/// Cluster-status document returned by the health endpoint.
#[derive(Debug, Deserialize)]
struct ClusterStatus {
    status: StatusField,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StatusField {
    Code(i64),
    Text(String),
}

impl ClusterStatus {
    fn is_ok(&self) -> bool {
        match &self.status {
            StatusField::Code(code) => *code == 200,
            StatusField::Text(text) => text.trim().parse::<i64>() == Ok(200),
        }
    }
}

/// Probes backed by real sockets and HTTP requests.
pub struct NetworkProbes {
    client: reqwest::Client,
    tls: TlsConnector,
    connect_timeout: Duration,
    health_path: String,
}

impl NetworkProbes {
    /// Create probes with default timeouts and the root health path.
    pub fn new() -> Result<Self> {
        Self::with_timeouts(
            ReadinessDefaults::CONNECT_TIMEOUT,
            ReadinessDefaults::HEALTH_REQUEST_TIMEOUT,
        )
    }

    /// Create probes with custom connect and request timeouts.
    pub fn with_timeouts(connect_timeout: Duration, request_timeout: Duration) -> Result<Self> {
        // Test nodes serve self-signed certificates.
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|e| NodeError::config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            tls: tls::insecure_connector(),
            connect_timeout,
            health_path: ReadinessDefaults::HEALTH_PATH.to_string(),
        })
    }

    /// Set the path of the cluster-status endpoint.
    pub fn with_health_path(mut self, path: impl Into<String>) -> Self {
        self.health_path = path.into();
        self
    }

    /// Full URL of the health endpoint for `base_url`.
    pub fn health_url(&self, base_url: &str) -> String {
        let base = base_url.trim_end_matches('/');
        if self.health_path.starts_with('/') {
            format!("{}{}", base, self.health_path)
        } else {
            format!("{}/{}", base, self.health_path)
        }
    }

    async fn connect(&self, address: &NetworkAddress) -> Option<TcpStream> {
        let connect = TcpStream::connect((address.host.as_str(), address.port));
        match tokio::time::timeout(self.connect_timeout, connect).await {
            Ok(Ok(stream)) => Some(stream),
            Ok(Err(e)) => {
                debug!("Connect to {} failed: {}", address, e);
                None
            }
            Err(_) => {
                debug!("Connect to {} timed out", address);
                None
            }
        }
    }
}

#[async_trait]
impl ReadinessProbe for NetworkProbes {
    async fn port_open(&self, address: &NetworkAddress) -> bool {
        // The stream is dropped, and closed, on return.
        self.connect(address).await.is_some()
    }

    async fn tls_enabled(&self, address: &NetworkAddress) -> bool {
        let Some(name) = tls::server_name(&address.host) else {
            debug!("No TLS server name for {}", address.host);
            return false;
        };
        let Some(stream) = self.connect(address).await else {
            return false;
        };

        match tokio::time::timeout(self.connect_timeout, self.tls.connect(name, stream)).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                debug!("TLS handshake with {} failed: {}", address, e);
                false
            }
            Err(_) => {
                debug!("TLS handshake with {} timed out", address);
                false
            }
        }
    }

    async fn healthy(&self, base_url: &str) -> bool {
        let url = self.health_url(base_url);
        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                debug!("Health request to {} failed: {}", url, e);
                return false;
            }
        };

        match response.json::<ClusterStatus>().await {
            Ok(status) => {
                let ok = status.is_ok();
                if !ok {
                    debug!("{} reported {:?}", url, status.status);
                }
                ok
            }
            Err(e) => {
                debug!("Unreadable health document from {}: {}", url, e);
                false
            }
        }
    }
}

impl std::fmt::Debug for NetworkProbes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkProbes")
            .field("connect_timeout", &self.connect_timeout)
            .field("health_path", &self.health_path)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::Protocol;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn http_address(port: u16) -> NetworkAddress {
        NetworkAddress {
            protocol: Protocol::Http,
            host: "127.0.0.1".to_string(),
            port,
        }
    }

    fn probes() -> NetworkProbes {
        NetworkProbes::with_timeouts(Duration::from_secs(1), Duration::from_secs(2)).unwrap()
    }

    /// Serve `body` as a JSON response to every connection.
    async fn serve_json(body: &'static str) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                tokio::spawn(async move {
                    let mut buf = [0u8; 1024];
                    let _ = socket.read(&mut buf).await;
                    let response = format!(
                        "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
        port
    }

    async fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    #[test]
    fn test_cluster_status_parsing() {
        let ok: ClusterStatus = serde_json::from_str(r#"{"ok": true, "status": 200}"#).unwrap();
        let text: ClusterStatus = serde_json::from_str(r#"{"status": "200"}"#).unwrap();
        let down: ClusterStatus = serde_json::from_str(r#"{"status": 503}"#).unwrap();

        assert!(ok.is_ok());
        assert!(text.is_ok());
        assert!(!down.is_ok());
        assert!(serde_json::from_str::<ClusterStatus>(r#"{"ok": true}"#).is_err());
    }

    #[test]
    fn test_health_url_joins_path() {
        let probes = probes();
        assert_eq!(probes.health_url("http://127.0.0.1:4200"), "http://127.0.0.1:4200/");

        let probes = probes.with_health_path("_sql");
        assert_eq!(
            probes.health_url("https://127.0.0.1:4200/"),
            "https://127.0.0.1:4200/_sql"
        );
    }

    #[tokio::test]
    async fn test_port_open() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(probes().port_open(&http_address(port)).await);

        let port = closed_port().await;
        assert!(!probes().port_open(&http_address(port)).await);
    }

    #[tokio::test]
    async fn test_plain_http_is_not_tls() {
        let port = serve_json(r#"{"status": 200}"#).await;
        assert!(!probes().tls_enabled(&http_address(port)).await);

        let port = closed_port().await;
        assert!(!probes().tls_enabled(&http_address(port)).await);
    }

    #[tokio::test]
    async fn test_healthy_requires_status_200() {
        let port = serve_json(r#"{"ok": true, "status": 200, "name": "node"}"#).await;
        assert!(probes().healthy(&format!("http://127.0.0.1:{}", port)).await);

        let port = serve_json(r#"{"ok": false, "status": 503}"#).await;
        assert!(!probes().healthy(&format!("http://127.0.0.1:{}", port)).await);

        let port = serve_json("not json").await;
        assert!(!probes().healthy(&format!("http://127.0.0.1:{}", port)).await);

        let port = closed_port().await;
        assert!(!probes().healthy(&format!("http://127.0.0.1:{}", port)).await);
    }
}
