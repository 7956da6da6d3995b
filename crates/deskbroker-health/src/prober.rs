//! Node probing.
//!
//! `NodeProber` is the seam between the monitor and the network. The
//! production `HttpProber` performs `GET /health` against the node's health
//! port and extracts optional resource metrics from the JSON body.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use deskbroker_core::Node;
use deskbroker_state::ResourceMetrics;

/// Reasons a probe did not produce a healthy verdict.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("unhealthy status {0}")]
    Status(u16),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// A successful probe.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProbeReport {
    /// Resource usage, when the node reported it.
    pub metrics: Option<ResourceMetrics>,
}

/// Boxed future returned by [`NodeProber::probe`].
pub type ProbeFuture<'a> =
    Pin<Box<dyn Future<Output = Result<ProbeReport, ProbeError>> + Send + 'a>>;

/// Checks a single node's availability.
///
/// Implementations need not enforce a timeout; the monitor wraps every
/// call in its own.
pub trait NodeProber: Send + Sync {
    fn probe<'a>(&'a self, node: &'a Node) -> ProbeFuture<'a>;
}

/// Body shape of a node's `/health` response. Everything is optional.
#[derive(Debug, Deserialize)]
struct HealthBody {
    metrics: Option<ResourceMetrics>,
}

/// Extract `{"metrics": {"cpu", "memory"}}` from a health response body.
/// Anything unparsable yields `None`.
pub(crate) fn parse_metrics(body: &[u8]) -> Option<ResourceMetrics> {
    serde_json::from_slice::<HealthBody>(body)
        .ok()
        .and_then(|b| b.metrics)
}

/// HTTP/1.1 prober hitting `http://{host}:{health_port}{path}`.
#[derive(Debug, Clone)]
pub struct HttpProber {
    health_port: u16,
    path: String,
}

impl HttpProber {
    pub fn new(health_port: u16) -> Self {
        Self {
            health_port,
            path: "/health".to_string(),
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    async fn probe_http(&self, node: &Node) -> Result<ProbeReport, ProbeError> {
        use http_body_util::BodyExt;

        let address = node.health_address(self.health_port);

        // Use a simple TCP connection + hyper for the probe.
        let stream = tokio::net::TcpStream::connect(&address)
            .await
            .map_err(|e| ProbeError::Connect(e.to_string()))?;

        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| ProbeError::Handshake(e.to_string()))?;

        // Drive the connection in the background.
        tokio::spawn(async move {
            let _ = conn.await;
        });

        let req = http::Request::builder()
            .method("GET")
            .uri(self.path.as_str())
            .header("host", address.as_str())
            .header("user-agent", "deskbroker-health/0.1")
            .body(http_body_util::Empty::<bytes::Bytes>::new())
            .map_err(|e| ProbeError::Request(e.to_string()))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| ProbeError::Request(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ProbeError::Status(status.as_u16()));
        }

        // The status alone decides health; metrics are best-effort.
        let metrics = match resp.into_body().collect().await {
            Ok(body) => parse_metrics(&body.to_bytes()),
            Err(e) => {
                debug!(error = %e, %address, "health body unreadable");
                None
            }
        };

        Ok(ProbeReport { metrics })
    }
}

impl NodeProber for HttpProber {
    fn probe<'a>(&'a self, node: &'a Node) -> ProbeFuture<'a> {
        Box::pin(self.probe_http(node))
    }
}
