//! tonic-backed channel factory.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use fedserve_core::Endpoint;
use tokio::net::TcpStream;
use tonic::transport::{Certificate, Channel, ClientTlsConfig, Endpoint as TonicEndpoint};
use tonic::{Code, Status};
use tracing::{debug, instrument};

use crate::channel::{ChannelFactory, ConnectivityState, PooledChannel};
use crate::config::ChannelConfig;
use crate::error::{PoolError, Result};

/// Upper bound on the pause between retry attempts.
const MAX_RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// Builds lazily connected HTTP/2 channels with the configured keep-alive,
/// window and timeout settings.
#[derive(Debug, Clone, Default)]
pub struct GrpcChannelFactory {
    config: ChannelConfig,
}

impl GrpcChannelFactory {
    pub fn new(config: ChannelConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    fn endpoint_builder(&self, endpoint: &Endpoint) -> Result<TonicEndpoint> {
        let cfg = &self.config;
        let keep_alive = Duration::from_secs(cfg.keep_alive_interval_secs);

        let mut builder = TonicEndpoint::from_shared(endpoint.uri(cfg.use_tls))
            .map_err(|e| PoolError::channel_creation(endpoint.key(), e.to_string()))?
            .connect_timeout(Duration::from_millis(cfg.connect_timeout_ms))
            .http2_keep_alive_interval(keep_alive)
            .keep_alive_timeout(Duration::from_secs(cfg.keep_alive_timeout_secs))
            .keep_alive_while_idle(cfg.keep_alive_while_idle)
            .tcp_keepalive(Some(Duration::from_secs(cfg.tcp_keepalive_secs)))
            .initial_stream_window_size(cfg.flow_control_window)
            .initial_connection_window_size(cfg.flow_control_window)
            .buffer_size(cfg.request_buffer_size);

        if cfg.use_tls {
            builder = builder
                .tls_config(self.tls_config(endpoint)?)
                .map_err(|e| PoolError::channel_creation(endpoint.key(), e.to_string()))?;
        }

        Ok(builder)
    }

    /// Client TLS settings for `endpoint`: platform roots and/or the
    /// configured CA bundle. At least one trust source is required.
    fn tls_config(&self, endpoint: &Endpoint) -> Result<ClientTlsConfig> {
        let cfg = &self.config;
        let mut tls = ClientTlsConfig::new().domain_name(endpoint.host.clone());

        if cfg.tls_native_roots {
            tls = tls.with_native_roots();
        }

        match &cfg.ca_cert_path {
            Some(path) => {
                let pem = std::fs::read(path).map_err(|e| {
                    PoolError::channel_creation(
                        endpoint.key(),
                        format!("cannot read CA certificates from {}: {e}", path.display()),
                    )
                })?;
                tls = tls.ca_certificate(Certificate::from_pem(pem));
            }
            None if !cfg.tls_native_roots => {
                return Err(PoolError::channel_creation(
                    endpoint.key(),
                    "TLS enabled without trust roots: enable tls_native_roots or set ca_cert_path",
                ));
            }
            None => {}
        }

        Ok(tls)
    }
}

#[async_trait]
impl ChannelFactory for GrpcChannelFactory {
    type Channel = GrpcChannel;

    #[instrument(skip(self), fields(endpoint = %endpoint))]
    async fn create(&self, endpoint: &Endpoint) -> Result<GrpcChannel> {
        debug!(tls = self.config.use_tls, "Creating gRPC channel");

        let channel = self.endpoint_builder(endpoint)?.connect_lazy();

        Ok(GrpcChannel {
            inner: channel,
            endpoint: endpoint.clone(),
            max_inbound_message_size: self.config.max_inbound_message_size,
            max_retry_attempts: self.config.max_retry_attempts,
            probe_timeout: Duration::from_millis(self.config.probe_timeout_ms),
        })
    }
}

/// A pooled tonic channel plus the per-call limits generated clients should
/// apply to it.
#[derive(Debug, Clone)]
pub struct GrpcChannel {
    inner: Channel,
    endpoint: Endpoint,
    max_inbound_message_size: usize,
    max_retry_attempts: u32,
    probe_timeout: Duration,
}

impl GrpcChannel {
    /// The underlying tonic channel, for constructing generated clients.
    pub fn channel(&self) -> Channel {
        self.inner.clone()
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Value for a generated client's `max_decoding_message_size`.
    pub fn max_decoding_message_size(&self) -> usize {
        self.max_inbound_message_size
    }

    pub fn max_retry_attempts(&self) -> u32 {
        self.max_retry_attempts
    }

    /// Run `call` against this channel, retrying `UNAVAILABLE` failures up to
    /// the configured attempt count with a linear backoff.
    pub async fn call_with_retry<T, F, Fut>(&self, mut call: F) -> std::result::Result<T, Status>
    where
        F: FnMut(Channel) -> Fut,
        Fut: Future<Output = std::result::Result<T, Status>>,
    {
        let attempts = self.max_retry_attempts.max(1);
        let mut attempt = 1;
        loop {
            match call(self.inner.clone()).await {
                Err(status) if status.code() == Code::Unavailable && attempt < attempts => {
                    debug!(
                        endpoint = %self.endpoint,
                        attempt,
                        message = status.message(),
                        "Retrying unavailable call"
                    );
                    let backoff = Duration::from_millis(50 * u64::from(attempt));
                    tokio::time::sleep(backoff.min(MAX_RETRY_BACKOFF)).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

#[async_trait]
impl PooledChannel for GrpcChannel {
    /// tonic does not expose the HTTP/2 connection state, so the probe dials
    /// the endpoint: a refused or failed dial is a transient failure and a
    /// dial still pending at the probe timeout counts as connecting.
    async fn connectivity(&self) -> ConnectivityState {
        let dial = TcpStream::connect((self.endpoint.host.as_str(), self.endpoint.port));
        match tokio::time::timeout(self.probe_timeout, dial).await {
            Ok(Ok(_)) => ConnectivityState::Ready,
            Ok(Err(e)) => {
                debug!(endpoint = %self.endpoint, error = %e, "Connectivity probe failed");
                ConnectivityState::TransientFailure
            }
            Err(_) => ConnectivityState::Connecting,
        }
    }
}
