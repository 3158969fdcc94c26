//! Tracing and metrics setup for the gateway process.
//!
//! The log filter comes from `RUST_LOG` when it holds a valid directive and
//! from `logging.level` otherwise. The filter sits behind a reload layer so
//! the level can be changed while the gateway runs.

use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*, reload};

use crate::config::LoggingConfig;

static LOG_FILTER: OnceLock<reload::Handle<EnvFilter, Registry>> = OnceLock::new();

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Where the active log filter came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterSource {
    /// The `RUST_LOG` environment variable.
    Environment,
    /// `logging.level` from the gateway configuration.
    Config,
}

#[derive(Debug, thiserror::Error)]
pub enum ObservabilityError {
    #[error("invalid log filter '{directive}': {message}")]
    InvalidFilter { directive: String, message: String },

    #[error("tracing has not been initialized")]
    NotInitialized,

    #[error("failed to reload log filter: {0}")]
    Reload(String),
}

/// Pick the log filter: a valid `rust_log` directive wins over `level`.
pub fn select_filter(rust_log: Option<&str>, level: &str) -> (EnvFilter, FilterSource) {
    if let Some(directive) = rust_log.filter(|d| !d.trim().is_empty())
        && let Ok(filter) = EnvFilter::try_new(directive)
    {
        return (filter, FilterSource::Environment);
    }
    (EnvFilter::new(level), FilterSource::Config)
}

/// Install the global subscriber. Later calls leave the first one in place.
pub fn init_tracing(logging: &LoggingConfig) -> FilterSource {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let (filter, source) = select_filter(rust_log.as_deref(), &logging.level);

    let (reload_layer, handle) = reload::Layer::new(filter);
    if LOG_FILTER.set(handle).is_ok() {
        let _ = tracing_subscriber::registry()
            .with(reload_layer)
            .with(fmt::layer())
            .try_init();
    }
    tracing::debug!(?source, "Tracing initialized");
    source
}

/// Replace the active log filter with `directive`.
pub fn set_log_level(directive: &str) -> Result<(), ObservabilityError> {
    let filter =
        EnvFilter::try_new(directive).map_err(|e| ObservabilityError::InvalidFilter {
            directive: directive.to_string(),
            message: e.to_string(),
        })?;
    let handle = LOG_FILTER.get().ok_or(ObservabilityError::NotInitialized)?;
    handle
        .reload(filter)
        .map_err(|e| ObservabilityError::Reload(e.to_string()))?;
    tracing::info!(level = directive, "Log level changed");
    Ok(())
}

/// Install the Prometheus recorder behind the `metrics` facade. Returns
/// whether a recorder installed by this module is active.
pub fn init_metrics() -> bool {
    if PROMETHEUS_HANDLE.get().is_some() {
        return true;
    }

    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            // A concurrent caller may have won the race; its handle is as good.
            let _ = PROMETHEUS_HANDLE.set(handle);
            tracing::info!("Prometheus metrics initialized");
            true
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to install Prometheus recorder");
            PROMETHEUS_HANDLE.get().is_some()
        }
    }
}

/// Render all metrics in Prometheus text format, or `None` before
/// [`init_metrics`].
pub fn render_metrics() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(PrometheusHandle::render)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rust_log_wins_over_config_level() {
        let (filter, source) = select_filter(Some("fedserve_pool=trace"), "info");
        assert_eq!(source, FilterSource::Environment);
        assert_eq!(filter.to_string(), "fedserve_pool=trace");
    }

    #[test]
    fn test_config_level_used_without_rust_log() {
        let (filter, source) = select_filter(None, "debug");
        assert_eq!(source, FilterSource::Config);
        assert_eq!(filter.to_string(), "debug");

        let (_, source) = select_filter(Some("  "), "debug");
        assert_eq!(source, FilterSource::Config);
    }

    #[test]
    fn test_invalid_rust_log_falls_back_to_config_level() {
        let (_, source) = select_filter(Some("fedserve=notalevel"), "warn");
        assert_eq!(source, FilterSource::Config);
    }

    #[test]
    fn test_set_log_level_rejects_bad_directive() {
        assert!(matches!(
            set_log_level("fedserve=notalevel"),
            Err(ObservabilityError::InvalidFilter { .. })
        ));
    }

    #[test]
    fn test_set_log_level_after_init() {
        init_tracing(&LoggingConfig::default());
        set_log_level("debug").unwrap();
        set_log_level("info").unwrap();
    }
}
