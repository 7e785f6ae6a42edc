//! HTTP probe against the monitored endpoint

use crate::errors::{SamplerError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::debug;

/// Result of a single probe as seen by the aggregator.
///
/// `latency_nanos` is only meaningful when `succeeded` is true and is zero
/// otherwise.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub latency_nanos: u64,
    pub succeeded: bool,
}

impl ProbeOutcome {
    pub fn success(latency: Duration) -> Self {
        Self {
            latency_nanos: u64::try_from(latency.as_nanos()).unwrap_or(u64::MAX),
            succeeded: true,
        }
    }

    pub fn failure() -> Self {
        Self {
            latency_nanos: 0,
            succeeded: false,
        }
    }
}

/// Everything one probe observed
#[derive(Clone, Debug, PartialEq)]
pub struct ProbeReport {
    /// Wall-clock time right before the request was sent
    pub started_at: DateTime<Utc>,
    pub outcome: ProbeOutcome,
    /// HTTP status, when a response arrived
    pub status_code: Option<u16>,
    /// Response body when captured, error text on failure
    pub message: String,
}

/// Something that can be sampled for availability
#[async_trait]
pub trait Probe: Send + Sync {
    async fn probe(&self) -> ProbeReport;
}

/// GET prober backed by a shared reqwest client.
///
/// Any response counts as success, whatever its status code. Only transport
/// errors, timeouts and failures to read the body mark a probe as failed.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: Client,
    url: String,
    capture_body: bool,
}

impl HttpProbe {
    /// Create a probe whose requests are bounded by `timeout`
    pub fn new(url: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(format!("uptime_sampler/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(SamplerError::Http)?;

        Ok(Self {
            client,
            url,
            capture_body: false,
        })
    }

    /// Keep the response body as the report message
    pub fn capturing_body(mut self, capture_body: bool) -> Self {
        self.capture_body = capture_body;
        self
    }

    fn failed(started_at: DateTime<Utc>, status_code: Option<u16>, message: String) -> ProbeReport {
        ProbeReport {
            started_at,
            outcome: ProbeOutcome::failure(),
            status_code,
            message,
        }
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn probe(&self) -> ProbeReport {
        let started_at = Utc::now();
        let start = Instant::now();

        let response = match self.client.get(&self.url).send().await {
            Ok(response) => response,
            Err(e) => {
                let message = error_chain(&e);
                debug!("Probe of {} failed: {}", self.url, message);
                return Self::failed(started_at, None, message);
            }
        };

        let latency = start.elapsed();
        let status_code = response.status().as_u16();

        match response.bytes().await {
            Ok(body) => {
                debug!(
                    "Probe of {} returned {} in {:?} ({} bytes)",
                    self.url,
                    status_code,
                    latency,
                    body.len()
                );

                let message = if self.capture_body {
                    String::from_utf8_lossy(&body).into_owned()
                } else {
                    String::new()
                };

                ProbeReport {
                    started_at,
                    outcome: ProbeOutcome::success(latency),
                    status_code: Some(status_code),
                    message,
                }
            }
            Err(e) => {
                let message = format!("failed to read response body: {}", error_chain(&e));
                debug!("Probe of {} failed: {}", self.url, message);
                Self::failed(started_at, Some(status_code), message)
            }
        }
    }
}

/// Render an error with its sources, since reqwest hides the cause
/// (e.g. "connection refused") behind a generic top-level message.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();

    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }

    message
}

#[cfg(test)]
pub(crate) mod testing {
    use std::net::SocketAddr;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Server that answers every request with a 200 announcing a 100 byte
    /// body, sends 5 bytes of it and closes the connection
    pub async fn truncated_body_server() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut request = [0u8; 1024];
                    let _ = stream.read(&mut request).await;
                    let _ = stream
                        .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\nhello")
                        .await;
                    let _ = stream.shutdown().await;
                });
            }
        });

        addr
    }
}
