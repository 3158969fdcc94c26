//! Error types for the connection pool.

use fedserve_core::EndpointParseError;

/// Errors raised while acquiring or creating channels.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// The endpoint string could not be parsed into host and port.
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(#[from] EndpointParseError),

    /// The transport failed to build a channel to the endpoint.
    #[error("Channel creation error for {endpoint}: {message}")]
    ChannelCreation { endpoint: String, message: String },

    /// A registered endpoint has no channels to hand out.
    #[error("No channels registered for {0}")]
    NoChannels(String),
}

impl PoolError {
    /// Creates a new channel creation error.
    #[must_use]
    pub fn channel_creation(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ChannelCreation {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }
}

/// Result type alias for pool operations.
pub type Result<T> = std::result::Result<T, PoolError>;
