//! Configuration management for the uptime sampler

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::time::Duration;

const DEFAULT_REDIS_ADDR: &str = "localhost:6379";
const DEFAULT_PROBE_TIMEOUT: &str = "30s";

/// Command line entry point
#[derive(Debug, Parser)]
#[command(name = "uptime-sampler", version, about = "Periodic HTTP uptime and latency sampler")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Probe on every tick and persist each result
    Simple(SimpleArgs),

    /// Sample on a short interval and persist one summary per window
    Windowed(WindowedArgs),
}

/// Options shared by both sampler variants
#[derive(Debug, Clone, Args)]
pub struct CommonArgs {
    /// Logical name embedded in every persisted key
    #[arg(long, env = "PROBE_NAME")]
    pub name: String,

    /// Target endpoint to probe
    #[arg(long, env = "PROBE_URL")]
    pub url: String,

    /// Address of the redis server
    #[arg(long, env = "REDIS_ADDR", default_value = DEFAULT_REDIS_ADDR)]
    pub redis_addr: String,

    /// Upper bound for a single probe request
    #[arg(long, env = "PROBE_TIMEOUT", default_value = DEFAULT_PROBE_TIMEOUT, value_parser = humantime::parse_duration)]
    pub probe_timeout: Duration,

    /// What to do when a record cannot be persisted
    #[arg(long, env = "STORE_ERROR_POLICY", value_enum, default_value_t = StoreErrorPolicy::Continue)]
    pub on_store_error: StoreErrorPolicy,
}

#[derive(Debug, Clone, Args)]
pub struct SimpleArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Interval between probes
    #[arg(long, env = "PROBE_INTERVAL", default_value = "5m", value_parser = humantime::parse_duration)]
    pub interval: Duration,

    /// Expiration of every key written to redis
    #[arg(long, env = "RECORD_EXPIRATION", default_value = "24h", value_parser = humantime::parse_duration)]
    pub expiration: Duration,
}

#[derive(Debug, Clone, Args)]
pub struct WindowedArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Interval between samples
    #[arg(long, env = "PROBE_INTERVAL", default_value = "10s", value_parser = humantime::parse_duration)]
    pub interval: Duration,

    /// Length of the window each summary covers
    #[arg(long, env = "WINDOW_DURATION", default_value = "1m", value_parser = parse_window)]
    pub duration: WindowArg,

    /// Expiration of every key written to redis
    #[arg(long, env = "RECORD_EXPIRATION", default_value = "2h", value_parser = humantime::parse_duration)]
    pub expiration: Duration,
}

/// Window length together with the text it was given as, which is what
/// window keys carry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowArg {
    pub length: Duration,
    pub label: String,
}

fn parse_window(value: &str) -> Result<WindowArg, humantime::DurationError> {
    Ok(WindowArg {
        length: humantime::parse_duration(value)?,
        label: value.to_string(),
    })
}

/// Handling of a failed write to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreErrorPolicy {
    /// Log the failure and keep sampling
    Continue,
    /// Stop the sampler and exit with a failure status
    Exit,
}

/// Which sampler runs and its variant-specific timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Simple,
    Windowed { window: Duration },
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Logical name of the monitored target
    pub name: String,

    /// URL probed with GET
    pub url: String,

    /// Period between probes
    pub interval: Duration,

    pub mode: Mode,

    /// Window as written on the command line
    pub window_label: Option<String>,

    /// Time-to-live applied to every persisted record
    pub expiration: Duration,

    /// Address of the key-value sink
    pub redis_addr: String,

    /// Timeout for a single probe
    pub probe_timeout: Duration,

    pub store_error_policy: StoreErrorPolicy,
}

impl Config {
    /// Simple sampler configuration with the default timings
    pub fn simple(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            interval: Duration::from_secs(5 * 60),
            mode: Mode::Simple,
            window_label: None,
            expiration: Duration::from_secs(24 * 60 * 60),
            redis_addr: DEFAULT_REDIS_ADDR.to_string(),
            probe_timeout: Duration::from_secs(30),
            store_error_policy: StoreErrorPolicy::Continue,
        }
    }

    /// Windowed sampler configuration with the default timings
    pub fn windowed(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            interval: Duration::from_secs(10),
            mode: Mode::Windowed {
                window: Duration::from_secs(60),
            },
            expiration: Duration::from_secs(2 * 60 * 60),
            ..Self::simple(name, url)
        }
    }

    /// Window length, if this is a windowed configuration
    pub fn window(&self) -> Option<Duration> {
        match self.mode {
            Mode::Simple => None,
            Mode::Windowed { window } => Some(window),
        }
    }

    /// Window segment of persisted keys: the window text as given, or its
    /// compact humantime form (`1m`, `1h30m`) when none was given
    pub fn key_window(&self) -> Option<String> {
        let window = self.window()?;

        Some(match &self.window_label {
            Some(label) => label.clone(),
            None => humantime::format_duration(window).to_string().replace(' ', ""),
        })
    }

    /// Connection URL for the redis client. A bare `host:port` gets the
    /// `redis://` scheme.
    pub fn redis_url(&self) -> String {
        if self.redis_addr.contains("://") {
            self.redis_addr.clone()
        } else {
            format!("redis://{}", self.redis_addr)
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name cannot be empty".to_string());
        }

        match reqwest::Url::parse(&self.url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(url) => {
                return Err(format!("url scheme must be http or https, got {}", url.scheme()));
            }
            Err(e) => return Err(format!("invalid url {:?}: {}", self.url, e)),
        }

        if self.interval.is_zero() {
            return Err("interval must be greater than 0".to_string());
        }

        if let Some(window) = self.window() {
            if window.is_zero() {
                return Err("duration must be greater than 0".to_string());
            }
        }

        if self.expiration < Duration::from_millis(1) {
            return Err("expiration must be at least 1ms".to_string());
        }

        if self.probe_timeout.is_zero() {
            return Err("probe_timeout must be greater than 0".to_string());
        }

        if self.redis_addr.trim().is_empty() {
            return Err("redis_addr cannot be empty".to_string());
        }

        Ok(())
    }
}

impl From<CommonArgs> for Config {
    fn from(args: CommonArgs) -> Self {
        Self {
            redis_addr: args.redis_addr,
            probe_timeout: args.probe_timeout,
            store_error_policy: args.on_store_error,
            ..Config::simple(args.name, args.url)
        }
    }
}

impl From<Command> for Config {
    fn from(command: Command) -> Self {
        match command {
            Command::Simple(args) => Self {
                interval: args.interval,
                expiration: args.expiration,
                mode: Mode::Simple,
                ..Config::from(args.common)
            },
            Command::Windowed(args) => Self {
                interval: args.interval,
                expiration: args.expiration,
                mode: Mode::Windowed {
                    window: args.duration.length,
                },
                window_label: Some(args.duration.label),
                ..Config::from(args.common)
            },
        }
    }
}
