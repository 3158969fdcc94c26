//! Error types for the result cache.

use std::time::Duration;

/// Errors raised by cache reads and writes.
///
/// Shared-store failures are returned to the caller rather than treated as
/// misses. Callers that want caching to be best-effort must handle them.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// A stored value exists but cannot be decoded into the requested type.
    #[error("Cache corruption for key {key}: {source}")]
    Corruption {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// A value could not be encoded for storage.
    #[error("Serialization error for key {key}: {source}")]
    Serialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// The shared store rejected or failed a command.
    #[error("Shared store error: {0}")]
    Store(#[from] redis::RedisError),

    /// No shared-store connection could be obtained.
    #[error("Shared store pool error: {message}")]
    Pool { message: String },

    /// A shared-store round trip exceeded its timeout.
    #[error("Shared store operation timed out after {0:?}")]
    Timeout(Duration),

    /// Invalid cache or store configuration.
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl CacheError {
    /// Creates a new pool error.
    #[must_use]
    pub fn pool(message: impl Into<String>) -> Self {
        Self::Pool {
            message: message.into(),
        }
    }

    /// Creates a new configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Whether this error means the stored value is unreadable.
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::Corruption { .. })
    }
}

impl From<deadpool_redis::PoolError> for CacheError {
    fn from(err: deadpool_redis::PoolError) -> Self {
        Self::pool(err.to_string())
    }
}

/// Result type alias for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CacheError::config("namespace out of range");
        assert!(err.to_string().contains("Configuration error"));

        let err = CacheError::pool("pool exhausted");
        assert!(err.to_string().contains("Shared store pool error"));

        let err = CacheError::Timeout(Duration::from_millis(2000));
        assert!(err.to_string().contains("2s"));
    }

    #[test]
    fn test_corruption_flag() {
        let source = serde_json::from_str::<i32>("not json").unwrap_err();
        let err = CacheError::Corruption {
            key: "k".into(),
            source,
        };
        assert!(err.is_corruption());
        assert!(!CacheError::pool("x").is_corruption());
    }
}
