//! Federated inference gateway core.
//!
//! Wires the adaptive connection pool ([`fedserve_pool`]) and the two-tier
//! result cache ([`fedserve_cache`]) from one configuration, and sets up
//! logging and metrics the way every gateway binary expects.

pub mod config;
pub mod gateway;
pub mod observability;

pub use config::{
    ConfigError, GatewayConfig, LoggingConfig, config_path, load_config, load_config_with_env,
};
pub use gateway::{Gateway, GatewayError};
pub use observability::{
    FilterSource, ObservabilityError, init_metrics, init_tracing, render_metrics, set_log_level,
};
