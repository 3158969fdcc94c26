//! Integration tests for the Redis shared store.
//!
//! Tests use testcontainers to spin up a real Redis instance.

use std::sync::Arc;
use std::time::Duration;

use fedserve_cache::{
    CacheCategory, CacheConfig, CategoryConfig, RedisConfig, RedisStore, SharedStore,
    TieredCacheManager, create_shared_store, inference_result_key,
};
use fedserve_core::{ReturnResult, retcode};
use redis::AsyncCommands;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::redis::Redis;
use tokio::sync::OnceCell;

// Shared Redis container for all tests
static SHARED_REDIS: OnceCell<(ContainerAsync<Redis>, String)> = OnceCell::const_new();

async fn get_redis_url() -> String {
    let (_, url) = SHARED_REDIS
        .get_or_init(|| async {
            let container = Redis::default()
                .start()
                .await
                .expect("start redis container");

            let host_port = container.get_host_port_ipv4(6379).await.expect("get port");
            let url = format!("redis://127.0.0.1:{}", host_port);

            (container, url)
        })
        .await;

    url.clone()
}

async fn redis_config() -> RedisConfig {
    RedisConfig {
        enabled: true,
        url: get_redis_url().await,
        pool_size: 4,
        timeout_ms: 2_000,
        password: None,
    }
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_set_and_get_in_namespace() {
    let store = RedisStore::connect(&redis_config().await).await.unwrap();

    store
        .set_with_expiry(3, "ns-key", b"payload", 120)
        .await
        .unwrap();

    assert_eq!(
        store.get(3, "ns-key").await.unwrap(),
        Some(b"payload".to_vec())
    );
    assert!(store.get(4, "ns-key").await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_expiry_is_applied_with_the_write() {
    let store = RedisStore::connect(&redis_config().await).await.unwrap();
    store
        .set_with_expiry(5, "ttl-key", b"v", 300)
        .await
        .unwrap();

    let mut conn = store.pool().get().await.unwrap();
    let _: () = redis::cmd("SELECT").arg(5).query_async(&mut conn).await.unwrap();
    let ttl: i64 = conn.ttl("ttl-key").await.unwrap();
    assert!(ttl > 290 && ttl <= 300, "unexpected ttl {ttl}");
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_short_expiry_removes_entry() {
    let store = RedisStore::connect(&redis_config().await).await.unwrap();
    store.set_with_expiry(6, "short", b"v", 1).await.unwrap();

    tokio::time::sleep(Duration::from_millis(2_100)).await;
    assert!(store.get(6, "short").await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_two_managers_share_results_through_redis() {
    let config = redis_config().await;
    let cache_config = CacheConfig {
        inference_result: CategoryConfig {
            namespace: Some(2),
            ..CategoryConfig::default()
        },
        ..CacheConfig::default()
    };

    let writer = TieredCacheManager::new(&cache_config, create_shared_store(&config).await.unwrap())
        .unwrap();
    let reader = TieredCacheManager::new(&cache_config, create_shared_store(&config).await.unwrap())
        .unwrap();

    let result = ReturnResult::new(retcode::OK).with_case_id("redis-case");
    assert!(
        writer
            .put_inference_result("10000", "redis-case", &result)
            .await
            .unwrap()
    );

    let cached = reader
        .get_inference_result("10000", "redis-case")
        .await
        .unwrap();
    assert_eq!(cached, Some(result));

    let key = inference_result_key("10000", "redis-case");
    assert!(reader.local_contains(CacheCategory::InferenceResult, &key));
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_store_is_usable_behind_trait_object() {
    let store: Arc<dyn SharedStore> = create_shared_store(&redis_config().await).await.unwrap();
    assert_eq!(store.kind(), "redis");
    store.ping().await.unwrap();
}
