//! Redis集成测试
//!
//! 测试Redis计数存储的集成功能

use std::time::Duration;
use tiergate::redis_storage::{RedisConfig, RedisStorage};
use tiergate::storage::{CounterKey, CounterStore};

const REDIS_URL: &str = "redis://localhost:6379";

fn test_config(prefix: &str) -> RedisConfig {
    RedisConfig::new(REDIS_URL).key_prefix(format!(
        "tiergate-test-{}-{}",
        prefix,
        chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
    ))
}

async fn raw_connection() -> redis::aio::MultiplexedConnection {
    redis::Client::open(REDIS_URL)
        .unwrap()
        .get_multiplexed_tokio_connection()
        .await
        .unwrap()
}

/// 测试Redis连接
#[tokio::test]
#[ignore] // 需要Redis服务器运行
async fn test_redis_connection() {
    let storage = RedisStorage::new(test_config("ping")).await.unwrap();

    let result = storage.ping().await;
    assert!(result.is_ok());
    assert!(!storage.is_degraded());
    assert_eq!(storage.backend_name(), "redis");
}

/// 测试首次自增设置过期时间
#[tokio::test]
#[ignore]
async fn test_redis_increment_sets_ttl_once() {
    let config = test_config("ttl");
    let prefix = config.key_prefix.clone();
    let storage = RedisStorage::new(config).await.unwrap();
    let key = CounterKey::rate("1.2.3.4");
    let redis_key = format!("{}:{}", prefix, key);

    assert_eq!(
        storage
            .increment_and_get(&key, Duration::from_secs(60))
            .await
            .unwrap(),
        1
    );

    let mut conn = raw_connection().await;
    let first_ttl: i64 = redis::cmd("PTTL")
        .arg(&redis_key)
        .query_async(&mut conn)
        .await
        .unwrap();
    assert!(first_ttl > 0 && first_ttl <= 60_000);

    tokio::time::sleep(Duration::from_millis(50)).await;
    // 后续自增使用更长的TTL也不会刷新过期时间
    assert_eq!(
        storage
            .increment_and_get(&key, Duration::from_secs(3600))
            .await
            .unwrap(),
        2
    );
    let second_ttl: i64 = redis::cmd("PTTL")
        .arg(&redis_key)
        .query_async(&mut conn)
        .await
        .unwrap();
    assert!(second_ttl <= first_ttl);

    let _: () = redis::cmd("DEL")
        .arg(&redis_key)
        .query_async(&mut conn)
        .await
        .unwrap();
}

/// 测试查询
#[tokio::test]
#[ignore]
async fn test_redis_peek() {
    let storage = RedisStorage::new(test_config("peek")).await.unwrap();
    let key = CounterKey::edit("user-1", "res-1");

    assert_eq!(storage.peek(&key).await.unwrap(), None);
    storage
        .increment_and_get(&key, Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(storage.peek(&key).await.unwrap(), Some(1));
}

/// 测试损坏的计数值被当作零处理
#[tokio::test]
#[ignore]
async fn test_redis_corrupted_counter_recovers() {
    let config = test_config("corrupt");
    let prefix = config.key_prefix.clone();
    let storage = RedisStorage::new(config).await.unwrap();
    let key = CounterKey::daily("1.2.3.4");
    let redis_key = format!("{}:{}", prefix, key);

    let mut conn = raw_connection().await;
    let _: () = redis::cmd("SET")
        .arg(&redis_key)
        .arg("not-a-number")
        .query_async(&mut conn)
        .await
        .unwrap();

    assert_eq!(storage.peek(&key).await.unwrap(), None);
    assert_eq!(
        storage
            .increment_and_get(&key, Duration::from_secs(60))
            .await
            .unwrap(),
        1
    );
}

/// 测试并发自增不丢失
#[tokio::test]
#[ignore]
async fn test_redis_concurrent_increments() {
    let storage = RedisStorage::new(test_config("concurrent")).await.unwrap();
    let key = CounterKey::rate("10.0.0.1");

    let handles: Vec<_> = (0..100)
        .map(|_| {
            let storage = storage.clone();
            let key = key.clone();
            tokio::spawn(async move {
                storage
                    .increment_and_get(&key, Duration::from_secs(60))
                    .await
                    .unwrap()
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(storage.peek(&key).await.unwrap(), Some(100));
}

/// 测试无法连接时返回错误
#[tokio::test]
#[ignore]
async fn test_redis_unreachable() {
    let config = RedisConfig::new("redis://127.0.0.1:1")
        .connection_timeout(Duration::from_millis(200));
    assert!(RedisStorage::new(config).await.is_err());
}
