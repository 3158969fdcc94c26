//! Channel abstraction used by the pool.
//!
//! The pool is generic over a [`ChannelFactory`] so the registry, scaler and
//! facade can be exercised without a network. [`GrpcChannelFactory`] is the
//! production implementation.
//!
//! [`GrpcChannelFactory`]: crate::GrpcChannelFactory

use std::fmt;

use async_trait::async_trait;
use fedserve_core::Endpoint;

use crate::error::Result;

/// Connectivity state of a channel, as reported by a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectivityState {
    Idle,
    Connecting,
    Ready,
    TransientFailure,
    Shutdown,
}

impl ConnectivityState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Connecting => "CONNECTING",
            Self::Ready => "READY",
            Self::TransientFailure => "TRANSIENT_FAILURE",
            Self::Shutdown => "SHUTDOWN",
        }
    }

    /// States that raise a health alert.
    pub fn is_unhealthy(&self) -> bool {
        matches!(self, Self::TransientFailure | Self::Shutdown)
    }
}

impl fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A reusable transport channel handed out by the pool.
///
/// Channels are cloned on every acquisition, so clones must share the
/// underlying connection.
#[async_trait]
pub trait PooledChannel: Clone + Send + Sync + 'static {
    /// Probe the connectivity state, attempting to connect if idle.
    async fn connectivity(&self) -> ConnectivityState;
}

/// Builds one configured channel for an endpoint.
#[async_trait]
pub trait ChannelFactory: Send + Sync + 'static {
    type Channel: PooledChannel;

    /// Create a channel to `endpoint`.
    ///
    /// Fails with [`PoolError::ChannelCreation`](crate::PoolError::ChannelCreation)
    /// when the transport cannot be configured for the endpoint.
    async fn create(&self, endpoint: &Endpoint) -> Result<Self::Channel>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unhealthy_states() {
        assert!(ConnectivityState::TransientFailure.is_unhealthy());
        assert!(ConnectivityState::Shutdown.is_unhealthy());
        assert!(!ConnectivityState::Ready.is_unhealthy());
        assert!(!ConnectivityState::Idle.is_unhealthy());
        assert!(!ConnectivityState::Connecting.is_unhealthy());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            ConnectivityState::TransientFailure.to_string(),
            "TRANSIENT_FAILURE"
        );
    }
}
