//! 存储工厂模块
//!
//! 启动时按配置选择计数存储后端，之后所有追踪器共用同一个实例。
//!
//! # 特性
//!
//! - **统一创建接口** - 通过配置创建 `Arc<dyn CounterStore>`
//! - **内存清理** - 内存后端自动启动周期清理任务
//! - **按特性编译** - 未启用 `redis` 特性时选择 Redis 后端会返回配置错误

use crate::config::{GateConfig, StorageBackend};
use crate::error::GateError;
use crate::governor::GatekeeperBuilder;
use crate::storage::{CounterStore, MemoryStorage};
use std::sync::Arc;
use tracing::info;

/// 存储工厂
///
/// # 示例
///
/// ```rust
/// use tiergate::config::GateConfig;
/// use tiergate::factory::StoreFactory;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), tiergate::GateError> {
/// let store = StoreFactory::create(&GateConfig::default()).await?;
/// assert_eq!(store.backend_name(), "memory");
/// # Ok(())
/// # }
/// ```
pub struct StoreFactory;

impl StoreFactory {
    /// 从配置创建计数存储
    ///
    /// 必须在 tokio 运行时内调用（内存后端会启动清理任务）。
    pub async fn create(config: &GateConfig) -> Result<Arc<dyn CounterStore>, GateError> {
        config.validate()?;

        match config.storage {
            StorageBackend::Memory => {
                let storage = Arc::new(MemoryStorage::new());
                // 清理任务只持有弱引用，存储释放后自行退出
                let _sweeper = storage.spawn_sweeper(config.sweep_interval());
                info!(
                    "使用内存计数存储, 清理周期 {}s",
                    config.sweep_interval_secs
                );
                Ok(storage)
            }
            StorageBackend::Redis => Self::create_redis(config).await,
        }
    }

    /// 从配置创建 Gatekeeper 构建器（已设置存储、降级策略与后端超时）
    pub async fn gatekeeper(config: &GateConfig) -> Result<GatekeeperBuilder, GateError> {
        let store = Self::create(config).await?;
        Ok(GatekeeperBuilder::new(store)
            .fallback(config.fallback)
            .backend_timeout(config.backend_timeout()))
    }

    #[cfg(feature = "redis")]
    async fn create_redis(config: &GateConfig) -> Result<Arc<dyn CounterStore>, GateError> {
        let storage = crate::redis_storage::RedisStorage::new(config.redis.clone()).await?;
        info!("使用Redis计数存储");
        Ok(Arc::new(storage))
    }

    #[cfg(not(feature = "redis"))]
    async fn create_redis(_config: &GateConfig) -> Result<Arc<dyn CounterStore>, GateError> {
        Err(GateError::ConfigError(
            "Redis存储需要启用 redis 特性".to_string(),
        ))
    }
}
