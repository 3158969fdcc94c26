//! Starting the gateway from configuration and using its components.

use fedserve_core::{ReturnResult, retcode};
use fedserve_gateway::{Gateway, GatewayConfig, GatewayError, init_metrics, render_metrics};
use serde_json::json;
use tokio::net::TcpListener;

#[tokio::test]
async fn test_start_with_defaults_and_shutdown() {
    let gateway = Gateway::start(GatewayConfig::default()).await.unwrap();
    assert_eq!(gateway.cache().store().kind(), "memory");
    assert_eq!(gateway.pool().endpoint_count(), 0);

    let result = ReturnResult::new(retcode::OK).with_data("prob", json!(0.4));
    assert!(
        gateway
            .cache()
            .put_inference_result("9999", "case-1", &result)
            .await
            .unwrap()
    );
    assert_eq!(
        gateway
            .cache()
            .get_inference_result("9999", "case-1")
            .await
            .unwrap(),
        Some(result)
    );

    gateway.shutdown().await;
}

#[tokio::test]
async fn test_channels_come_from_the_pool() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = listener.local_addr().unwrap().to_string();

    let gateway = Gateway::start(GatewayConfig::default()).await.unwrap();
    gateway.channel(&endpoint).await.unwrap();
    gateway.channel(&endpoint).await.unwrap();

    let snapshot = gateway.pool().snapshot();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].requests, 2);
    assert!(gateway.pool().is_scaler_running());

    gateway.shutdown().await;
    assert!(!gateway.pool().is_scaler_running());
}

#[tokio::test]
async fn test_eager_scaler_starts_with_gateway() {
    let mut config = GatewayConfig::default();
    config.pool.lazy_scaler = false;

    let gateway = Gateway::start(config).await.unwrap();
    assert!(gateway.pool().is_scaler_running());
    gateway.shutdown().await;
}

#[tokio::test]
async fn test_bad_endpoint_is_a_pool_error() {
    let gateway = Gateway::start(GatewayConfig::default()).await.unwrap();
    let err = gateway.channel("no-port-here").await.unwrap_err();
    assert!(matches!(err, GatewayError::Pool(_)));
}

#[tokio::test]
async fn test_invalid_config_fails_startup() {
    let mut config = GatewayConfig::default();
    config.cache.cacheable_retcodes = "ok".into();
    assert!(matches!(
        Gateway::start(config).await,
        Err(GatewayError::Config(_))
    ));
}

#[tokio::test]
async fn test_unreachable_redis_fails_startup() {
    let mut config = GatewayConfig::default();
    config.redis.enabled = true;
    config.redis.url = "redis://127.0.0.1:1".into();
    config.redis.timeout_ms = 200;

    assert!(matches!(
        Gateway::start(config).await,
        Err(GatewayError::Cache(_))
    ));
}

#[tokio::test]
async fn test_metrics_render_after_init() {
    init_metrics();
    let gateway = Gateway::start(GatewayConfig::default()).await.unwrap();
    gateway
        .cache()
        .get_inference_result("9999", "missing")
        .await
        .unwrap();

    let rendered = render_metrics().unwrap();
    assert!(rendered.contains("fedserve_cache_misses_total"));
}
