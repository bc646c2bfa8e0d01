//! Redis客户端封装
//!
//! 实现基于Redis的计数存储，多个实例共享同一份计数。
//!
//! # 特性
//!
//! - **连接管理**: 使用ConnectionManager自动重连
//! - **Lua脚本**: 自增与首次过期在服务端原子完成
//! - **超时**: 每次调用都受 `io_timeout` 约束
//! - **重试机制**: 只读操作指数退避重试；自增不重试（非幂等）
//! - **自愈**: 损坏的计数值按零处理，并在下次自增时被覆盖
//!

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, IntoConnectionInfo, Script};
use secrecy::ExposeSecret;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

pub use crate::config::RedisConfig;
use crate::config::redact_url;
use crate::error::{GateError, StorageError};
use crate::storage::{CounterKey, CounterStore};

/// 计数自增Lua脚本
///
/// 参数: KEYS[1] - key, ARGV[1] - ttl (ms)
/// 返回: 自增后的计数
///
/// 仅当自增结果为 1（即本次创建了键）时设置过期时间，已有窗口不会被延长。
/// 非整数或负数的旧值视为损坏，先删除再自增。
pub const COUNTER_INCREMENT_SCRIPT: &str = r#"
local key = KEYS[1]
local ttl_ms = tonumber(ARGV[1])

local current = redis.call('GET', key)
if current and not string.match(current, '^%d+$') then
    redis.call('DEL', key)
end

local count = redis.call('INCR', key)
if count == 1 then
    redis.call('PEXPIRE', key, ttl_ms)
end

return count
"#;

/// 重试统计
#[derive(Debug, Default, Clone)]
pub struct RetryStats {
    /// 总重试次数
    pub total_retries: Arc<AtomicU64>,
    /// 成功重试次数
    pub successful_retries: Arc<AtomicU64>,
    /// 失败重试次数
    pub failed_retries: Arc<AtomicU64>,
}

impl RetryStats {
    pub fn total_retries(&self) -> u64 {
        self.total_retries.load(Ordering::Relaxed)
    }

    pub fn successful_retries(&self) -> u64 {
        self.successful_retries.load(Ordering::Relaxed)
    }

    pub fn failed_retries(&self) -> u64 {
        self.failed_retries.load(Ordering::Relaxed)
    }

    /// 记录重试成功
    pub fn record_success(&self) {
        self.total_retries.fetch_add(1, Ordering::Relaxed);
        self.successful_retries.fetch_add(1, Ordering::Relaxed);
    }

    /// 记录重试失败
    pub fn record_failure(&self) {
        self.total_retries.fetch_add(1, Ordering::Relaxed);
        self.failed_retries.fetch_add(1, Ordering::Relaxed);
    }
}

/// 解析存储中的计数值
///
/// 非整数或负数按不存在处理。
pub(crate) fn parse_counter_value(key: &str, raw: Option<String>) -> Option<u64> {
    let raw = raw?;
    match raw.trim().parse::<i64>() {
        Ok(n) if n >= 0 => Some(n as u64),
        _ => {
            let err = GateError::InvalidCounterState {
                key: key.to_string(),
                value: raw,
            };
            warn!("{}，按零处理", err);
            None
        }
    }
}

/// Redis存储实现
#[derive(Clone)]
pub struct RedisStorage {
    /// 连接管理器
    conn: ConnectionManager,
    /// 配置
    config: RedisConfig,
    /// 自增脚本
    increment_script: Arc<Script>,
    /// 重试统计
    retry_stats: RetryStats,
    /// 降级状态
    degraded: Arc<AtomicBool>,
}

impl RedisStorage {
    /// 创建新的Redis存储
    pub async fn new(config: RedisConfig) -> Result<Self, StorageError> {
        config
            .validate()
            .map_err(|e| StorageError::ConnectionError(e.to_string()))?;
        info!("创建Redis存储, URL: {}", redact_url(&config.url));

        let mut info = config
            .url
            .as_str()
            .into_connection_info()
            .map_err(|e| StorageError::ConnectionError(format!("无效的Redis URL: {}", e)))?;
        info.redis.db = config.db;
        if let Some(password) = &config.password {
            info.redis.password = Some(password.expose_secret().clone());
        }

        let client = Client::open(info).map_err(|e| {
            error!("创建Redis客户端失败: {}", e);
            StorageError::ConnectionError(format!("创建Redis客户端失败: {}", e))
        })?;

        let conn = tokio::time::timeout(config.connection_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| StorageError::TimeoutError("Redis连接超时".to_string()))?
            .map_err(|e| {
                error!("创建Redis连接管理器失败: {}", e);
                StorageError::ConnectionError(format!("创建Redis连接管理器失败: {}", e))
            })?;

        info!("Redis连接建立成功");
        Ok(Self {
            conn,
            config,
            increment_script: Arc::new(Script::new(COUNTER_INCREMENT_SCRIPT)),
            retry_stats: RetryStats::default(),
            degraded: Arc::new(AtomicBool::new(false)),
        })
    }

    /// 检查Redis连接
    pub async fn ping(&self) -> Result<(), StorageError> {
        self.execute_with_retry(|| async {
            let mut conn = self.conn.clone();
            let _: String = redis::cmd("PING").query_async(&mut conn).await?;
            Ok::<_, StorageError>(())
        })
        .await
    }

    /// 拼接带前缀的Redis键
    pub(crate) fn render_key(prefix: &str, key: &CounterKey) -> String {
        if prefix.is_empty() {
            key.as_str().to_string()
        } else {
            format!("{}:{}", prefix, key.as_str())
        }
    }

    /// 带超时的单次执行
    async fn execute_once<Fut, T>(&self, fut: Fut) -> Result<T, StorageError>
    where
        Fut: Future<Output = Result<T, StorageError>>,
    {
        let result = match tokio::time::timeout(self.config.io_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(StorageError::TimeoutError(format!(
                "Redis调用超过 {:?}",
                self.config.io_timeout
            ))),
        };
        self.set_degraded(matches!(
            result,
            Err(StorageError::ConnectionError(_)) | Err(StorageError::TimeoutError(_))
        ));
        result
    }

    /// 带重试的执行（仅用于幂等操作）
    async fn execute_with_retry<F, Fut, T>(&self, f: F) -> Result<T, StorageError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, StorageError>>,
    {
        let mut backoff = self.config.retry_initial_backoff;
        let mut attempt = 0;

        loop {
            match self.execute_once(f()).await {
                Ok(result) => {
                    if attempt > 0 {
                        self.retry_stats.record_success();
                        debug!("重试成功，尝试次数: {}", attempt);
                    }
                    return Ok(result);
                }
                Err(e) if attempt < self.config.max_retries && is_transient(&e) => {
                    attempt += 1;
                    warn!(
                        "Redis操作失败，将在 {:?} 后重试 (尝试 {}/{}): {}",
                        backoff, attempt, self.config.max_retries, e
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = backoff.mul_f32(2.0);
                }
                Err(e) => {
                    if attempt > 0 {
                        self.retry_stats.record_failure();
                    }
                    error!("Redis操作失败: {}", e);
                    return Err(e);
                }
            }
        }
    }

    /// 设置降级状态
    fn set_degraded(&self, degraded: bool) {
        let previous = self.degraded.swap(degraded, Ordering::Relaxed);
        if previous != degraded {
            if degraded {
                warn!("Redis存储不可用，进入降级状态");
            } else {
                info!("Redis存储已恢复正常");
            }
        }
    }

    /// 检查是否降级
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }

    /// 获取重试统计
    pub fn retry_stats(&self) -> &RetryStats {
        &self.retry_stats
    }
}

fn is_transient(err: &StorageError) -> bool {
    matches!(
        err,
        StorageError::ConnectionError(_) | StorageError::TimeoutError(_)
    )
}

#[async_trait]
impl CounterStore for RedisStorage {
    async fn increment_and_get(
        &self,
        key: &CounterKey,
        ttl: Duration,
    ) -> Result<u64, StorageError> {
        let redis_key = Self::render_key(&self.config.key_prefix, key);
        let ttl_ms = ttl.as_millis().max(1) as u64;

        let count: i64 = self
            .execute_once(async {
                let mut conn = self.conn.clone();
                let count: i64 = self
                    .increment_script
                    .key(&redis_key)
                    .arg(ttl_ms)
                    .invoke_async(&mut conn)
                    .await?;
                Ok::<_, StorageError>(count)
            })
            .await?;

        trace!("Redis计数自增: key={}, count={}", redis_key, count);
        Ok(count.max(0) as u64)
    }

    async fn peek(&self, key: &CounterKey) -> Result<Option<u64>, StorageError> {
        let redis_key = Self::render_key(&self.config.key_prefix, key);

        let raw: Option<String> = self
            .execute_with_retry(|| async {
                let mut conn = self.conn.clone();
                let raw: Option<String> = conn.get(&redis_key).await?;
                Ok::<_, StorageError>(raw)
            })
            .await?;

        Ok(parse_counter_value(&redis_key, raw))
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}
