//! Adaptive outbound channel pool.
//!
//! ## Architecture
//!
//! - **Registry**: endpoint key → channel set + request counters
//! - **Factory**: builds one configured channel per call (tonic in production)
//! - **Scaler**: periodic task that grows busy endpoints and probes health
//! - **Pool**: `acquire(endpoint)` facade handing out random channels
//!
//! ## Growth
//!
//! Every acquisition counts a request. Each sweep computes requests per
//! second per channel since the previous sweep and adds one channel when the
//! value exceeds `load_factor_threshold`, up to `max_channels_per_endpoint`.
//! Channels are never removed; unhealthy ones are only reported.

pub mod channel;
pub mod config;
pub mod error;
pub mod grpc;
pub mod pool;
pub mod registry;
pub mod scaler;

pub use channel::{ChannelFactory, ConnectivityState, PooledChannel};
pub use config::{ChannelConfig, PoolConfig};
pub use error::{PoolError, Result};
pub use grpc::{GrpcChannel, GrpcChannelFactory};
pub use pool::ConnectionPool;
pub use registry::{ChannelResource, ConnectionRegistry, ResourceSnapshot};
pub use scaler::{ScalingPolicy, SweepReport, load_factor};
