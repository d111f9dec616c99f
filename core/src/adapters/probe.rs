//! Bounded-time health checks against a single target.
//!
//! Every check collapses to a boolean; failures are logged at debug and
//! never returned, since the sweep loop polls these continuously.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use tokio::net::TcpStream;
use tracing::debug;

use crate::error::{Error, Result};

/// HTTP client for loopback targets; never routed through a proxy.
pub(crate) fn loopback_client(connect_timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .no_proxy()
        .connect_timeout(connect_timeout)
        .build()
        .map_err(|e| Error::HttpClient(e.to_string()))
}

/// Result of one probe: a verdict plus an optional diagnostic for logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub healthy: bool,
    pub diagnostic: Option<String>,
}

impl ProbeResult {
    fn ok() -> Self {
        Self {
            healthy: true,
            diagnostic: None,
        }
    }

    fn failed(diagnostic: impl Into<String>) -> Self {
        Self {
            healthy: false,
            diagnostic: Some(diagnostic.into()),
        }
    }
}

/// Issues single HTTP or TCP checks with a hard deadline.
#[derive(Debug, Clone)]
pub struct HealthProber {
    client: reqwest::Client,
    timeout: Duration,
}

impl HealthProber {
    /// Creates a prober whose checks give up after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: loopback_client(timeout)?,
            timeout,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Probes `address` and returns true only for a well-formed success.
    ///
    /// `http://` / `https://` addresses get a GET that must answer 2xx;
    /// `tcp://host:port` or bare `host:port` addresses must accept a connection.
    pub async fn probe(&self, address: &str) -> bool {
        let result = self.check(address).await;
        if let Some(diagnostic) = &result.diagnostic {
            debug!(address, diagnostic = %diagnostic, "probe failed");
        }
        result.healthy
    }

    /// Same as [`probe`](Self::probe) but keeps the diagnostic.
    pub async fn check(&self, address: &str) -> ProbeResult {
        if address.starts_with("http://") || address.starts_with("https://") {
            self.check_http(address).await
        } else {
            let target = address.strip_prefix("tcp://").unwrap_or(address);
            self.check_tcp(target).await
        }
    }

    /// Whether something accepts connections on `127.0.0.1:<port>`.
    pub async fn port_open(&self, port: u16) -> bool {
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
        matches!(
            tokio::time::timeout(self.timeout, TcpStream::connect(addr)).await,
            Ok(Ok(_))
        )
    }

    /// GET `url` and parse the JSON body; `None` on any failure.
    pub async fn fetch_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Option<T> {
        let response = tokio::time::timeout(
            self.timeout,
            self.client.get(url).timeout(self.timeout).send(),
        )
        .await
        .ok()?
        .ok()?;

        if !response.status().is_success() {
            debug!(url, status = %response.status(), "unexpected status");
            return None;
        }

        match tokio::time::timeout(self.timeout, response.json::<T>()).await {
            Ok(Ok(body)) => Some(body),
            Ok(Err(e)) => {
                debug!(url, error = %e, "malformed body");
                None
            }
            Err(_) => None,
        }
    }

    async fn check_http(&self, url: &str) -> ProbeResult {
        let request = self.client.get(url).timeout(self.timeout).send();
        match tokio::time::timeout(self.timeout, request).await {
            Ok(Ok(response)) if response.status().is_success() => ProbeResult::ok(),
            Ok(Ok(response)) => ProbeResult::failed(format!("HTTP {}", response.status())),
            Ok(Err(e)) => ProbeResult::failed(e.to_string()),
            Err(_) => ProbeResult::failed(format!("timed out after {:?}", self.timeout)),
        }
    }

    async fn check_tcp(&self, target: &str) -> ProbeResult {
        match tokio::time::timeout(self.timeout, TcpStream::connect(target)).await {
            Ok(Ok(_)) => ProbeResult::ok(),
            Ok(Err(e)) => ProbeResult::failed(e.to_string()),
            Err(_) => ProbeResult::failed(format!("timed out after {:?}", self.timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn free_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    #[test]
    fn test_client_errors_are_typed() {
        assert!(loopback_client(Duration::from_millis(500)).is_ok());

        let err = Error::HttpClient("no TLS backend".to_string());
        assert_eq!(err.to_string(), "Failed to build HTTP client: no TLS backend");
        assert!(!err.is_transport());
    }

    #[tokio::test]
    async fn test_port_open_detects_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let prober = HealthProber::new(Duration::from_millis(500)).unwrap();

        assert!(prober.port_open(port).await);
        assert!(prober.probe(&format!("tcp://127.0.0.1:{}", port)).await);

        drop(listener);
        assert!(!prober.port_open(port).await);
    }

    #[tokio::test]
    async fn test_http_probe_requires_success_status() {
        let mut server = mockito::Server::new_async().await;
        let _health = server
            .mock("GET", "/health")
            .with_status(200)
            .create_async()
            .await;
        let _broken = server
            .mock("GET", "/broken")
            .with_status(503)
            .create_async()
            .await;

        let prober = HealthProber::new(Duration::from_secs(1)).unwrap();
        assert!(prober.probe(&format!("{}/health", server.url())).await);

        let result = prober.check(&format!("{}/broken", server.url())).await;
        assert!(!result.healthy);
        assert!(result.diagnostic.unwrap().contains("503"));
    }

    #[tokio::test]
    async fn test_refused_connection_is_false_not_error() {
        let port = free_port().await;
        let prober = HealthProber::new(Duration::from_millis(500)).unwrap();
        assert!(!prober.probe(&format!("http://127.0.0.1:{}/health", port)).await);
        assert!(!prober.probe(&format!("127.0.0.1:{}", port)).await);
    }

    #[tokio::test]
    async fn test_fetch_json_rejects_malformed_body() {
        #[derive(serde::Deserialize)]
        struct Body {
            #[allow(dead_code)]
            status: u16,
        }

        let mut server = mockito::Server::new_async().await;
        let _good = server
            .mock("GET", "/good")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"status":200}"#)
            .create_async()
            .await;
        let _bad = server
            .mock("GET", "/bad")
            .with_status(200)
            .with_body("not json")
            .create_async()
            .await;

        let prober = HealthProber::new(Duration::from_secs(1)).unwrap();
        assert!(prober
            .fetch_json::<Body>(&format!("{}/good", server.url()))
            .await
            .is_some());
        assert!(prober
            .fetch_json::<Body>(&format!("{}/bad", server.url()))
            .await
            .is_none());
    }
}
