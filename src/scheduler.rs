//! Sampling loops: the simple per-tick prober and the windowed sampler

use crate::aggregator::{reduce, WindowSummary};
use crate::buffer::SampleBuffer;
use crate::config::{Config, StoreErrorPolicy};
use crate::errors::{SamplerError, Result};
use crate::probe::Probe;
use crate::record::{simple_key, window_key, SimpleLogRecord, WindowRecord};
use crate::sink::Sink;

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::time::{interval_at, Duration, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Counters kept by a running sampler
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SamplerStats {
    pub samples: u64,
    pub failed_samples: u64,
    /// Windows whose summary reached the store
    pub flushes: u64,
    pub records_written: u64,
    pub store_errors: u64,
}

/// Maps timer instants to wall-clock time, so records carry the tick time
/// rather than the time the handler got around to them.
#[derive(Debug, Clone, Copy)]
struct ClockAnchor {
    instant: Instant,
    wall: DateTime<Utc>,
}

impl ClockAnchor {
    fn now() -> Self {
        Self {
            instant: Instant::now(),
            wall: Utc::now(),
        }
    }

    fn at(&self, instant: Instant) -> DateTime<Utc> {
        let elapsed = instant.saturating_duration_since(self.instant);
        self.wall + chrono::Duration::from_std(elapsed).unwrap_or_else(|_| chrono::Duration::zero())
    }
}

/// Periodic timer whose first tick is one full period after `start`
fn periodic(start: Instant, period: Duration) -> Interval {
    let mut ticks = interval_at(start + period, period);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticks
}

/// Serializes records into the sink and applies the store error policy.
///
/// `write` yields whether the record reached the store; under
/// `StoreErrorPolicy::Continue` a failed put yields `Ok(false)`.
struct RecordWriter<S> {
    sink: Arc<S>,
    expiration: Duration,
    policy: StoreErrorPolicy,
}

impl<S: Sink> RecordWriter<S> {
    async fn write(
        &self,
        key: &str,
        record: &impl serde::Serialize,
        stats: &mut SamplerStats,
    ) -> Result<bool> {
        let value = serde_json::to_vec(record)?;

        match self.sink.put(key, &value, self.expiration).await {
            Ok(()) => {
                stats.records_written += 1;
                debug!("Persisted {}", key);
                Ok(true)
            }
            Err(e) => {
                stats.store_errors += 1;
                match self.policy {
                    StoreErrorPolicy::Continue => {
                        warn!("Failed to persist {}, continuing: {}", key, e);
                        Ok(false)
                    }
                    StoreErrorPolicy::Exit => {
                        error!("Failed to persist {}: {}", key, e);
                        Err(e)
                    }
                }
            }
        }
    }
}

/// Probes on every tick and persists one record per probe
pub struct SimpleSampler<P, S> {
    name: String,
    interval: Duration,
    probe: P,
    writer: RecordWriter<S>,
    stats: SamplerStats,
    sampler_id: String,
}

impl<P: Probe, S: Sink> SimpleSampler<P, S> {
    pub fn new(config: &Config, probe: P, sink: Arc<S>) -> Result<Self> {
        config.validate().map_err(SamplerError::Config)?;

        Ok(Self {
            name: config.name.clone(),
            interval: config.interval,
            probe,
            writer: RecordWriter {
                sink,
                expiration: config.expiration,
                policy: config.store_error_policy,
            },
            stats: SamplerStats::default(),
            sampler_id: Uuid::new_v4().to_string(),
        })
    }

    /// Run until `shutdown` is cancelled
    #[instrument(skip_all, fields(sampler = %self.sampler_id))]
    pub async fn run(&mut self, shutdown: CancellationToken) -> Result<()> {
        let anchor = ClockAnchor::now();
        let mut ticks = periodic(anchor.instant, self.interval);

        info!(
            "Starting simple sampler for {} every {}",
            self.name,
            humantime::format_duration(self.interval)
        );

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                tick = ticks.tick() => {
                    self.sample(anchor.at(tick)).await?;
                }
            }
        }

        info!("Simple sampler stopped: {:?}", self.stats);
        Ok(())
    }

    /// Probe once and persist the result under the key of `tick`
    pub async fn sample(&mut self, tick: DateTime<Utc>) -> Result<SimpleLogRecord> {
        let report = self.probe.probe().await;

        self.stats.samples += 1;
        if !report.outcome.succeeded {
            self.stats.failed_samples += 1;
            warn!("Probe failed for {}: {}", self.name, report.message);
        }

        let record = SimpleLogRecord::from_report(report);
        let key = simple_key(&self.name, tick);
        self.writer.write(&key, &record, &mut self.stats).await?;

        Ok(record)
    }

    pub fn stats(&self) -> &SamplerStats {
        &self.stats
    }
}

/// Samples on a short interval and flushes one summary per window.
///
/// Both timers are served by one loop, one event at a time. When a sample
/// tick and a flush tick are due together the sample runs first, so it is
/// counted in the window that is being closed.
pub struct WindowedSampler<P, S> {
    name: String,
    interval: Duration,
    window: Duration,
    key_window: String,
    probe: P,
    buffer: SampleBuffer,
    writer: RecordWriter<S>,
    stats: SamplerStats,
    sampler_id: String,
}

impl<P: Probe, S: Sink> WindowedSampler<P, S> {
    pub fn new(config: &Config, probe: P, sink: Arc<S>) -> Result<Self> {
        config.validate().map_err(SamplerError::Config)?;

        let (window, key_window) = config.window().zip(config.key_window()).ok_or_else(|| {
            SamplerError::Config("windowed sampler requires a window duration".to_string())
        })?;

        Ok(Self {
            name: config.name.clone(),
            interval: config.interval,
            window,
            key_window,
            probe,
            buffer: SampleBuffer::for_window(config.interval, window),
            writer: RecordWriter {
                sink,
                expiration: config.expiration,
                policy: config.store_error_policy,
            },
            stats: SamplerStats::default(),
            sampler_id: Uuid::new_v4().to_string(),
        })
    }

    /// Run until `shutdown` is cancelled. Samples of an unfinished window are
    /// dropped on shutdown.
    #[instrument(skip_all, fields(sampler = %self.sampler_id))]
    pub async fn run(&mut self, shutdown: CancellationToken) -> Result<()> {
        let anchor = ClockAnchor::now();
        let mut sample_ticks = periodic(anchor.instant, self.interval);
        let mut flush_ticks = periodic(anchor.instant, self.window);

        info!(
            "Starting windowed sampler for {}: sample every {}, window {}",
            self.name,
            humantime::format_duration(self.interval),
            humantime::format_duration(self.window)
        );

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = sample_ticks.tick() => {
                    self.sample().await;
                }
                tick = flush_ticks.tick() => {
                    self.flush(anchor.at(tick)).await?;
                }
            }
        }

        if !self.buffer.is_empty() {
            info!(
                "Discarding {} samples of the unfinished window",
                self.buffer.len()
            );
        }

        info!("Windowed sampler stopped: {:?}", self.stats);
        Ok(())
    }

    /// Probe once and buffer the outcome
    pub async fn sample(&mut self) {
        let report = self.probe.probe().await;

        self.stats.samples += 1;
        if !report.outcome.succeeded {
            self.stats.failed_samples += 1;
            warn!("Probe failed for {}: {}", self.name, report.message);
        }

        self.buffer.append(report.outcome);
    }

    /// Reduce everything buffered since the last flush and persist it under
    /// the window ending at `tick`
    pub async fn flush(&mut self, tick: DateTime<Utc>) -> Result<WindowSummary> {
        let outcomes = self.buffer.drain_and_reset();
        let summary = reduce(&outcomes, tick.timestamp_millis());

        if summary.is_empty() {
            debug!("Flushing empty window for {}", self.name);
        } else {
            debug!(
                "Flushing window for {}: {}/{} available",
                self.name, summary.success_count, summary.sample_count
            );
        }

        let key = window_key(&self.name, &self.key_window, summary.window_timestamp_millis);
        let record = WindowRecord::from(&summary);
        if self.writer.write(&key, &record, &mut self.stats).await? {
            self.stats.flushes += 1;
        }

        Ok(summary)
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn stats(&self) -> &SamplerStats {
        &self.stats
    }
}
