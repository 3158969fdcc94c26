//! Configuration for the connection pool and the channels it builds.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Connection pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Channel count above which an endpoint is never grown.
    /// Default: available parallelism
    #[serde(default = "default_max_channels_per_endpoint")]
    pub max_channels_per_endpoint: usize,

    /// Requests per second per channel above which a channel is added.
    #[serde(default = "default_load_factor_threshold")]
    pub load_factor_threshold: u64,

    /// Delay before the first scaling sweep, in milliseconds.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Period between scaling sweeps, in milliseconds.
    #[serde(default = "default_check_interval_ms")]
    pub check_interval_ms: u64,

    /// Start the scaler on the first acquisition if it is not running yet.
    #[serde(default = "default_lazy_scaler")]
    pub lazy_scaler: bool,

    /// Settings applied to every channel the pool creates.
    #[serde(default)]
    pub channel: ChannelConfig,
}

fn default_max_channels_per_endpoint() -> usize {
    num_cpus::get()
}

fn default_load_factor_threshold() -> u64 {
    10
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_check_interval_ms() -> u64 {
    10_000
}

fn default_lazy_scaler() -> bool {
    true
}

impl PoolConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_channels_per_endpoint: default_max_channels_per_endpoint(),
            load_factor_threshold: default_load_factor_threshold(),
            initial_delay_ms: default_initial_delay_ms(),
            check_interval_ms: default_check_interval_ms(),
            lazy_scaler: default_lazy_scaler(),
            channel: ChannelConfig::default(),
        }
    }
}

/// Per-channel transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// HTTP/2 keep-alive ping interval in seconds.
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_interval_secs: u64,

    /// How long to wait for a keep-alive ack, in seconds.
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_timeout_secs: u64,

    /// Send keep-alive pings even without in-flight calls.
    #[serde(default = "default_keep_alive_while_idle")]
    pub keep_alive_while_idle: bool,

    /// Interval of TCP-level keep-alive probes on the socket, in seconds.
    #[serde(default = "default_keep_alive_secs")]
    pub tcp_keepalive_secs: u64,

    /// Connect timeout in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Number of requests buffered per channel before callers wait.
    #[serde(default = "default_request_buffer_size")]
    pub request_buffer_size: usize,

    /// HTTP/2 flow-control window for streams and the connection, in bytes.
    #[serde(default = "default_flow_control_window")]
    pub flow_control_window: u32,

    /// Largest inbound message clients should accept, in bytes.
    #[serde(default = "default_max_inbound_message_size")]
    pub max_inbound_message_size: usize,

    /// Attempts made by [`GrpcChannel::call_with_retry`](crate::GrpcChannel::call_with_retry).
    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,

    /// Timeout of a connectivity probe, in milliseconds.
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    /// Use TLS instead of plaintext HTTP/2.
    /// Default: false
    #[serde(default)]
    pub use_tls: bool,

    /// Trust the platform's root certificates for TLS endpoints.
    /// Default: true
    #[serde(default = "default_tls_native_roots")]
    pub tls_native_roots: bool,

    /// PEM file with extra CA certificates trusted for TLS endpoints.
    #[serde(default)]
    pub ca_cert_path: Option<PathBuf>,
}

fn default_keep_alive_secs() -> u64 {
    60
}

fn default_keep_alive_while_idle() -> bool {
    true
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

fn default_request_buffer_size() -> usize {
    1024
}

fn default_flow_control_window() -> u32 {
    32 << 20
}

fn default_max_inbound_message_size() -> usize {
    32 << 20
}

fn default_max_retry_attempts() -> u32 {
    20
}

fn default_probe_timeout_ms() -> u64 {
    1000
}

fn default_tls_native_roots() -> bool {
    true
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            keep_alive_interval_secs: default_keep_alive_secs(),
            keep_alive_timeout_secs: default_keep_alive_secs(),
            keep_alive_while_idle: default_keep_alive_while_idle(),
            tcp_keepalive_secs: default_keep_alive_secs(),
            connect_timeout_ms: default_connect_timeout_ms(),
            request_buffer_size: default_request_buffer_size(),
            flow_control_window: default_flow_control_window(),
            max_inbound_message_size: default_max_inbound_message_size(),
            max_retry_attempts: default_max_retry_attempts(),
            probe_timeout_ms: default_probe_timeout_ms(),
            use_tls: false,
            tls_native_roots: default_tls_native_roots(),
            ca_cert_path: None,
        }
    }
}
