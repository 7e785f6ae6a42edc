//! Uptime Sampler Library
//!
//! This library periodically probes an HTTP endpoint and persists either every
//! probe result or windowed availability and latency summaries to redis.

pub mod aggregator;
pub mod buffer;
pub mod config;
pub mod errors;
pub mod probe;
pub mod record;
pub mod scheduler;
pub mod sink;

pub use aggregator::{reduce, WindowSummary};
pub use buffer::SampleBuffer;
pub use config::{Cli, Config, Mode, StoreErrorPolicy};
pub use errors::{SamplerError, Result};
pub use probe::{HttpProbe, Probe, ProbeOutcome, ProbeReport};
pub use record::{SimpleLogRecord, WindowRecord};
pub use scheduler::{SamplerStats, SimpleSampler, WindowedSampler};
pub use sink::{MeteredSink, RedisSink, Sink};
