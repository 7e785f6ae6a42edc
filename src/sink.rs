//! Key-value sink for persisted records

use crate::errors::{SamplerError, Result};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, warn};

const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(10);

/// Destination for serialized records
#[async_trait]
pub trait Sink: Send + Sync {
    /// Store `value` under `key`, expiring after `ttl`
    async fn put(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()>;
}

/// Redis sink writing `SET key value PX ttl`.
///
/// The connection is opened on first use, so a store that is down at startup
/// only fails the writes attempted while it is down.
pub struct RedisSink {
    client: redis::Client,
    connection: Mutex<Option<ConnectionManager>>,
    timeout: Duration,
}

impl RedisSink {
    /// Create a sink for `redis_url`. Only the URL is checked here.
    pub fn new(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| SamplerError::Config(format!("invalid redis address {:?}: {}", redis_url, e)))?;

        Ok(Self {
            client,
            connection: Mutex::new(None),
            timeout: DEFAULT_STORE_TIMEOUT,
        })
    }

    /// Bound for connecting and for each command
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn connection(&self) -> Result<ConnectionManager> {
        let mut connection = self.connection.lock().await;

        if let Some(manager) = connection.as_ref() {
            return Ok(manager.clone());
        }

        let manager = timeout(self.timeout, ConnectionManager::new(self.client.clone()))
            .await
            .map_err(|_| SamplerError::Store("redis connection timeout".to_string()))??;

        debug!("Connected to redis");
        *connection = Some(manager.clone());
        Ok(manager)
    }

    /// PING the server
    pub async fn health_check(&self) -> Result<()> {
        let mut connection = self.connection().await?;

        let pong: String = timeout(self.timeout, redis::cmd("PING").query_async(&mut connection))
            .await
            .map_err(|_| SamplerError::Store("redis health check timeout".to_string()))??;

        if pong != "PONG" {
            return Err(SamplerError::Store(format!("unexpected PING reply: {}", pong)));
        }

        Ok(())
    }

    /// Test connectivity to the store
    pub async fn test_connectivity(&self) -> bool {
        match self.health_check().await {
            Ok(()) => {
                info!("Redis connectivity test successful");
                true
            }
            Err(e) => {
                warn!("Redis connectivity test failed: {}", e);
                false
            }
        }
    }
}

#[async_trait]
impl Sink for RedisSink {
    async fn put(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        let mut connection = self.connection().await?;
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);

        let result = match timeout(
            self.timeout,
            redis::cmd("SET")
                .arg(key)
                .arg(value)
                .arg("PX")
                .arg(ttl_ms)
                .query_async::<_, ()>(&mut connection),
        )
        .await
        {
            Ok(result) => result.map_err(SamplerError::from),
            Err(_) => Err(SamplerError::Store(format!("timeout writing {}", key))),
        };

        // The next write opens a fresh connection
        if let Err(e) = result {
            debug!("Dropping redis connection after failed write: {}", e);
            *self.connection.lock().await = None;
            return Err(e);
        }

        debug!("Stored {} ({} bytes, ttl {}ms)", key, value.len(), ttl_ms);
        Ok(())
    }
}

/// Sink wrapper that tracks write outcomes and durations
pub struct MeteredSink<S> {
    inner: S,
    metrics: Mutex<SinkMetrics>,
}

impl<S: Sink> MeteredSink<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            metrics: Mutex::new(SinkMetrics::default()),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub async fn metrics(&self) -> SinkMetricsSnapshot {
        self.metrics.lock().await.snapshot()
    }
}

#[async_trait]
impl<S: Sink> Sink for MeteredSink<S> {
    async fn put(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        let start_time = Instant::now();
        let result = self.inner.put(key, value, ttl).await;
        let duration = start_time.elapsed();

        let mut metrics = self.metrics.lock().await;
        match &result {
            Ok(()) => metrics.successes += 1,
            Err(_) => metrics.failures += 1,
        }
        metrics.total_duration += duration;

        result
    }
}

#[derive(Debug, Default)]
struct SinkMetrics {
    successes: u64,
    failures: u64,
    total_duration: Duration,
}

impl SinkMetrics {
    fn snapshot(&self) -> SinkMetricsSnapshot {
        let attempts = self.successes + self.failures;

        let success_rate = if attempts > 0 {
            (self.successes as f64 / attempts as f64) * 100.0
        } else {
            0.0
        };

        let avg_duration = if attempts > 0 {
            let nanos = self.total_duration.as_nanos() / u128::from(attempts);
            Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
        } else {
            Duration::ZERO
        };

        SinkMetricsSnapshot {
            attempts,
            successes: self.successes,
            failures: self.failures,
            success_rate,
            avg_duration_ms: avg_duration.as_millis() as u64,
        }
    }
}

/// Snapshot of sink metrics
#[derive(Debug, Clone, PartialEq)]
pub struct SinkMetricsSnapshot {
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub success_rate: f64,
    pub avg_duration_ms: u64,
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// One write seen by [`MemorySink`]
    #[derive(Debug, Clone)]
    pub struct StoredRecord {
        pub key: String,
        pub value: serde_json::Value,
        pub ttl: Duration,
    }

    /// In-memory sink that can be switched into a failing state
    #[derive(Debug, Default)]
    pub struct MemorySink {
        records: std::sync::Mutex<Vec<StoredRecord>>,
        failing: AtomicBool,
    }

    impl MemorySink {
        pub fn set_failing(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }

        pub fn records(&self) -> Vec<StoredRecord> {
            self.records.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Sink for MemorySink {
        async fn put(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(SamplerError::Store("store unavailable".to_string()));
            }

            self.records.lock().unwrap().push(StoredRecord {
                key: key.to_string(),
                value: serde_json::from_slice(value)?,
                ttl,
            });
            Ok(())
        }
    }
}
