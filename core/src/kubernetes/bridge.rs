//! HTTP client for the in-cluster bridge service.
//!
//! Always addressed through the forwarded loopback port.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::models::{BridgeExecRequest, BridgeExecResponse, BridgeHealth};
use crate::adapters::probe::loopback_client;
use crate::error::{Error, Result};

/// Extra client-side budget over the server-side command timeout.
const RESPONSE_SLACK: Duration = Duration::from_secs(5);

/// Client for `POST /api/exec` and `GET /api/health`.
#[derive(Debug, Clone)]
pub struct BridgeClient {
    client: reqwest::Client,
    base_url: String,
    probe_timeout: Duration,
}

impl BridgeClient {
    pub fn new(base_url: impl Into<String>, probe_timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: loopback_client(probe_timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            probe_timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Runs `command` through the bridge and returns its `output` verbatim.
    ///
    /// Only connection-level failures map to [`Error::TransportFailure`].
    /// A timeout, a non-2xx reply, a malformed body or a populated `error`
    /// field all mean the request may have reached the bridge.
    pub async fn exec(
        &self,
        command: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let body = BridgeExecRequest {
            command: command.to_string(),
            timeout: timeout.as_secs(),
        };
        let request = self
            .client
            .post(format!("{}/api/exec", self.base_url))
            .timeout(timeout + RESPONSE_SLACK)
            .json(&body)
            .send();

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            response = request => response.map_err(|e| classify(e, timeout))?,
        };

        let status = response.status();
        let reply = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            reply = response.json::<BridgeExecResponse>() => reply,
        };

        let reply = match reply {
            Ok(reply) => reply,
            Err(e) if e.is_timeout() => return Err(classify(e, timeout)),
            Err(e) => {
                return Err(Error::RemoteCommand {
                    message: format!("malformed bridge response (HTTP {}): {}", status, e),
                    output: None,
                })
            }
        };

        if let Some(error) = reply.error.filter(|e| !e.is_empty()) {
            return Err(Error::RemoteCommand {
                message: error,
                output: Some(reply.output).filter(|o| !o.is_empty()),
            });
        }
        if !status.is_success() {
            return Err(Error::RemoteCommand {
                message: format!("bridge returned HTTP {}", status),
                output: Some(reply.output).filter(|o| !o.is_empty()),
            });
        }

        Ok(reply.output)
    }

    /// `GET /api/health`; `None` when unreachable, non-2xx or malformed.
    pub async fn health(&self) -> Option<BridgeHealth> {
        let response = self
            .client
            .get(format!("{}/api/health", self.base_url))
            .timeout(self.probe_timeout)
            .send()
            .await
            .map_err(|e| debug!(error = %e, "bridge health request failed"))
            .ok()?;

        if !response.status().is_success() {
            debug!(status = %response.status(), "bridge health not ok");
            return None;
        }

        response
            .json::<BridgeHealth>()
            .await
            .map_err(|e| debug!(error = %e, "malformed bridge health"))
            .ok()
    }

    /// Whether the bridge answers health checks with an ok status.
    pub async fn is_healthy(&self) -> bool {
        self.health().await.map(|h| h.is_ok()).unwrap_or(false)
    }
}

fn classify(error: reqwest::Error, timeout: Duration) -> Error {
    if error.is_timeout() {
        Error::Timeout {
            operation: "bridge exec".to_string(),
            after: timeout,
            partial_output: None,
        }
    } else if error.is_connect() || error.is_request() {
        Error::TransportFailure(error.to_string())
    } else {
        Error::RemoteCommand {
            message: error.to_string(),
            output: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn client(url: &str) -> BridgeClient {
        BridgeClient::new(url, Duration::from_secs(1)).unwrap()
    }

    #[tokio::test]
    async fn test_exec_returns_output_verbatim() {
        let mut server = mockito::Server::new_async().await;
        let _exec = server
            .mock("POST", "/api/exec")
            .match_body(Matcher::Json(serde_json::json!({
                "command": "slate_status.py --quick",
                "timeout": 90
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"output":"all green\n  3 services\n"}"#)
            .create_async()
            .await;

        let output = client(&server.url())
            .exec(
                "slate_status.py --quick",
                Duration::from_secs(90),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(output, "all green\n  3 services\n");
    }

    #[tokio::test]
    async fn test_application_error_is_not_transport() {
        let mut server = mockito::Server::new_async().await;
        let _exec = server
            .mock("POST", "/api/exec")
            .with_status(200)
            .with_body(r#"{"output":"partial","error":"exit status 1"}"#)
            .create_async()
            .await;

        let err = client(&server.url())
            .exec("false", Duration::from_secs(5), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(!err.is_transport());
        assert_eq!(err.partial_output(), Some("partial"));
    }

    #[tokio::test]
    async fn test_malformed_body_is_not_transport() {
        let mut server = mockito::Server::new_async().await;
        let _exec = server
            .mock("POST", "/api/exec")
            .with_status(502)
            .with_body("<html>bad gateway</html>")
            .create_async()
            .await;

        let err = client(&server.url())
            .exec("ls", Duration::from_secs(5), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RemoteCommand { .. }));
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = client(&format!("http://127.0.0.1:{}", port))
            .exec("ls", Duration::from_secs(5), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.is_transport(), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_cancelled_before_send() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = client("http://127.0.0.1:9")
            .exec("ls", Duration::from_secs(5), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[tokio::test]
    async fn test_health() {
        let mut server = mockito::Server::new_async().await;
        let _health = server
            .mock("GET", "/api/health")
            .with_status(200)
            .with_body(r#"{"status":200,"version":"2.1.0"}"#)
            .create_async()
            .await;

        let bridge = client(&server.url());
        let health = bridge.health().await.unwrap();
        assert_eq!(health.version.as_deref(), Some("2.1.0"));
        assert!(bridge.is_healthy().await);

        assert!(!client("http://127.0.0.1:9").is_healthy().await);
    }
}
