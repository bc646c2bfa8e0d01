//! 账户存储
//!
//! 已认证用户的套餐与每日用量保存在账户记录中，而不是计数存储中。

use crate::clock::{next_utc_midnight, Clock, SystemClock};
use crate::error::StorageError;
use crate::plan::Plan;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// 每日用量
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyUsage {
    /// 今日已生成次数
    pub generations_today: u64,
    /// 下次重置时间（UTC零点）
    pub reset_at: DateTime<Utc>,
}

impl DailyUsage {
    /// 当前时间是否已越过重置点
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        now > self.reset_at
    }
}

/// 账户记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountRecord {
    pub user_id: String,
    /// 套餐（缺失时按免费套餐处理）
    pub plan: Option<Plan>,
    pub usage: DailyUsage,
}

impl AccountRecord {
    pub fn new(user_id: impl Into<String>, plan: Plan, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            plan: Some(plan),
            usage: DailyUsage {
                generations_today: 0,
                reset_at: next_utc_midnight(now),
            },
        }
    }

    pub fn effective_plan(&self) -> Plan {
        self.plan.unwrap_or_default()
    }
}

/// 账户存储接口
///
/// 会话签发、订阅生命周期都不在这里；只读写"当前套餐"与每日用量。
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// 查询套餐，账户不存在返回 `None`
    async fn find_plan(&self, user_id: &str) -> Result<Option<Plan>, StorageError>;

    /// 查询每日用量，账户不存在返回 `None`
    async fn daily_usage(&self, user_id: &str) -> Result<Option<DailyUsage>, StorageError>;

    /// 将每日用量清零并设置下次重置时间
    async fn reset_daily_usage(
        &self,
        user_id: &str,
        next_reset: DateTime<Utc>,
    ) -> Result<(), StorageError>;

    /// 每日用量加一，返回新值
    async fn increment_daily_usage(&self, user_id: &str) -> Result<u64, StorageError>;
}

/// 为一次外部存储调用加上时限
///
/// 超时映射为 [`StorageError::TimeoutError`]，交给调用方的降级策略处理。
pub async fn with_deadline<T>(
    limit: Duration,
    operation: &str,
    call: impl Future<Output = Result<T, StorageError>>,
) -> Result<T, StorageError> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(StorageError::TimeoutError(format!(
            "{} 超过 {}ms",
            operation,
            limit.as_millis()
        ))),
    }
}

/// 内存账户存储
///
/// 单实例部署和测试使用。
pub struct MemoryAccountStore {
    accounts: DashMap<String, AccountRecord>,
    clock: Arc<dyn Clock>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            accounts: DashMap::new(),
            clock,
        }
    }

    /// 创建账户（已存在时覆盖）
    pub fn create_account(&self, user_id: &str, plan: Plan) -> AccountRecord {
        let record = AccountRecord::new(user_id, plan, self.clock.now());
        self.accounts.insert(user_id.to_string(), record.clone());
        debug!("创建账户: plan={}", plan);
        record
    }

    /// 写入完整的账户记录
    pub fn insert(&self, record: AccountRecord) {
        self.accounts.insert(record.user_id.clone(), record);
    }

    /// 变更套餐
    pub fn set_plan(&self, user_id: &str, plan: Plan) -> Result<(), StorageError> {
        let mut record = self
            .accounts
            .get_mut(user_id)
            .ok_or_else(|| StorageError::NotFound(user_id.to_string()))?;
        record.plan = Some(plan);
        Ok(())
    }

    pub fn get(&self, user_id: &str) -> Option<AccountRecord> {
        self.accounts.get(user_id).map(|r| r.clone())
    }

    pub fn remove(&self, user_id: &str) -> Option<AccountRecord> {
        self.accounts.remove(user_id).map(|(_, r)| r)
    }
}

impl Default for MemoryAccountStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn find_plan(&self, user_id: &str) -> Result<Option<Plan>, StorageError> {
        Ok(self.accounts.get(user_id).map(|r| r.effective_plan()))
    }

    async fn daily_usage(&self, user_id: &str) -> Result<Option<DailyUsage>, StorageError> {
        Ok(self.accounts.get(user_id).map(|r| r.usage))
    }

    async fn reset_daily_usage(
        &self,
        user_id: &str,
        next_reset: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let mut record = self
            .accounts
            .get_mut(user_id)
            .ok_or_else(|| StorageError::NotFound(user_id.to_string()))?;
        record.usage = DailyUsage {
            generations_today: 0,
            reset_at: next_reset,
        };
        Ok(())
    }

    async fn increment_daily_usage(&self, user_id: &str) -> Result<u64, StorageError> {
        let mut record = self
            .accounts
            .get_mut(user_id)
            .ok_or_else(|| StorageError::NotFound(user_id.to_string()))?;
        record.usage.generations_today = record.usage.generations_today.saturating_add(1);
        Ok(record.usage.generations_today)
    }
}
