//! 限流器模块
//!
//! 三个互相独立、叠加生效的额度：
//!
//! - [`RateLimiter`]：按客户端地址的固定窗口突发限流
//! - [`DailyQuotaTracker`]：按自然日（UTC）的生成额度
//! - [`EditQuotaTracker`]：按产物的编辑额度
//!
//! 所有追踪器只返回 `Result<QuotaDecision, StorageError>`，
//! 存储故障由上层的降级策略处理。

pub mod daily_quota;
pub mod edit_quota;

pub use daily_quota::DailyQuotaTracker;
pub use edit_quota::EditQuotaTracker;

use crate::constants::{RATE_LIMIT_MAX_REQUESTS, RATE_LIMIT_WINDOW_SECS};
use crate::error::{GateError, QuotaDecision, StorageError};
use crate::log_redaction::redact_ip;
use crate::plan::Limit;
use crate::storage::{CounterKey, CounterStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// 突发限流器
///
/// 固定窗口：窗口从该地址的第一次请求开始计时。先自增再比较，
/// 被拒绝的请求同样计数。窗口边界两侧最多可连续通过 2 倍上限的请求。
///
/// # 示例
/// ```rust
/// use tiergate::limiters::RateLimiter;
/// use tiergate::storage::MemoryStorage;
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() {
/// let limiter = RateLimiter::new(Arc::new(MemoryStorage::new()));
/// let decision = limiter.check("1.2.3.4").await.unwrap();
/// assert!(decision.allowed);
/// assert_eq!(decision.remaining_count(), Some(9));
/// # }
/// ```
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    window: Duration,
    max_requests: u64,
}

impl RateLimiter {
    /// 使用默认窗口（60秒）和上限（10次）创建
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self {
            store,
            window: Duration::from_secs(RATE_LIMIT_WINDOW_SECS),
            max_requests: RATE_LIMIT_MAX_REQUESTS,
        }
    }

    /// 使用自定义窗口和上限创建
    pub fn with_limits(
        store: Arc<dyn CounterStore>,
        window: Duration,
        max_requests: u64,
    ) -> Result<Self, GateError> {
        if window.is_zero() {
            return Err(GateError::ConfigError("限流窗口不能为零".to_string()));
        }
        if max_requests == 0 {
            return Err(GateError::ConfigError("限流上限不能为零".to_string()));
        }
        Ok(Self {
            store,
            window,
            max_requests,
        })
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn max_requests(&self) -> u64 {
        self.max_requests
    }

    /// 检查并计数
    pub async fn check(&self, client_addr: &str) -> Result<QuotaDecision, StorageError> {
        let key = CounterKey::rate(client_addr);
        let count = self.store.increment_and_get(&key, self.window).await?;
        let limit = Limit::Bounded(self.max_requests);

        if count > self.max_requests {
            debug!(
                "突发限流拒绝: addr={}, count={}",
                redact_ip(Some(client_addr)),
                count
            );
            return Ok(QuotaDecision::deny());
        }

        Ok(QuotaDecision::allow(limit.remaining_after(count)))
    }
}
