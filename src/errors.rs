//! Error types for the uptime sampler

use std::fmt;

pub type Result<T> = std::result::Result<T, SamplerError>;

#[derive(Debug)]
pub enum SamplerError {
    /// HTTP client could not be built
    Http(reqwest::Error),

    /// JSON serialization failed
    Json(serde_json::Error),

    /// Redis command or connection failed
    Redis(redis::RedisError),

    /// Configuration error
    Config(String),

    /// Record could not be persisted
    Store(String),
}

impl SamplerError {
    /// Whether this error belongs to the persistence path
    pub fn is_store_error(&self) -> bool {
        matches!(self, SamplerError::Redis(_) | SamplerError::Store(_))
    }
}

impl fmt::Display for SamplerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SamplerError::Http(err) => write!(f, "HTTP error: {}", err),
            SamplerError::Json(err) => write!(f, "JSON error: {}", err),
            SamplerError::Redis(err) => write!(f, "Redis error: {}", err),
            SamplerError::Config(msg) => write!(f, "Configuration error: {}", msg),
            SamplerError::Store(msg) => write!(f, "Store error: {}", msg),
        }
    }
}

impl std::error::Error for SamplerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SamplerError::Http(err) => Some(err),
            SamplerError::Json(err) => Some(err),
            SamplerError::Redis(err) => Some(err),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for SamplerError {
    fn from(err: reqwest::Error) -> Self {
        SamplerError::Http(err)
    }
}

impl From<serde_json::Error> for SamplerError {
    fn from(err: serde_json::Error) -> Self {
        SamplerError::Json(err)
    }
}

impl From<redis::RedisError> for SamplerError {
    fn from(err: redis::RedisError) -> Self {
        SamplerError::Redis(err)
    }
}
