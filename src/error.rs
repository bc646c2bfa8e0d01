//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 错误类型定义
//!
//! 使用thiserror定义所有错误类型，以及三个额度追踪器共用的决策结果。

use crate::plan::Limit;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// TierGate 错误类型
#[derive(Error, Debug)]
pub enum GateError {
    /// 配置错误
    #[error("配置错误: {0}")]
    ConfigError(String),

    /// 计数存储不可用（由降级策略处理，不向调用方暴露）
    #[error("存储不可用: {0}")]
    StoreUnavailable(#[from] StorageError),

    /// 身份解析失败（降级为匿名身份）
    #[error("身份解析失败: {0}")]
    IdentityResolutionFailed(String),

    /// 计数值损坏（按零处理）
    #[error("计数状态无效: key={key}, value={value}")]
    InvalidCounterState { key: String, value: String },

    /// 已认证用户的账户记录不存在（拒绝请求）
    #[error("账户记录不存在: {0}")]
    AccountRecordMissing(String),

    /// IO错误
    #[error("IO错误: {0}")]
    IoError(#[from] std::io::Error),

    /// 序列化错误
    #[error("序列化错误: {0}")]
    SerdeError(#[from] serde_json::Error),

    /// YAML解析错误
    #[error("YAML解析错误: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// TOML解析错误
    #[error("TOML解析错误: {0}")]
    TomlError(#[from] toml::de::Error),
}

/// 存储错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// 连接错误
    #[error("连接错误: {0}")]
    ConnectionError(String),

    /// 查询错误
    #[error("查询错误: {0}")]
    QueryError(String),

    /// 超时错误
    #[error("超时错误: {0}")]
    TimeoutError(String),

    /// 未找到
    #[error("未找到: {0}")]
    NotFound(String),
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for StorageError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_timeout() {
            StorageError::TimeoutError(err.to_string())
        } else if err.is_connection_dropped() || err.is_connection_refusal() || err.is_io_error() {
            StorageError::ConnectionError(err.to_string())
        } else {
            StorageError::QueryError(err.to_string())
        }
    }
}

/// 额度决策结果
///
/// 限流器、每日额度与编辑额度共用的返回类型。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaDecision {
    /// 是否允许
    pub allowed: bool,
    /// 剩余额度
    pub remaining: Limit,
    /// 额度重置时间（未知时为 None）
    pub reset_at: Option<DateTime<Utc>>,
    /// 是否由降级策略给出（存储不可用）
    pub degraded: bool,
}

impl QuotaDecision {
    /// 允许，并附带剩余额度
    pub fn allow(remaining: Limit) -> Self {
        Self {
            allowed: true,
            remaining,
            reset_at: None,
            degraded: false,
        }
    }

    /// 无上限额度的允许结果
    pub fn unbounded() -> Self {
        Self::allow(Limit::Unbounded)
    }

    /// 拒绝，剩余额度为零
    pub fn deny() -> Self {
        Self {
            allowed: false,
            remaining: Limit::Bounded(0),
            reset_at: None,
            degraded: false,
        }
    }

    /// 设置重置时间
    pub fn with_reset_at(mut self, reset_at: DateTime<Utc>) -> Self {
        self.reset_at = Some(reset_at);
        self
    }

    /// 标记为降级结果
    pub fn degraded(mut self) -> Self {
        self.degraded = true;
        self
    }

    /// 剩余额度的数值形式（无上限时为 None）
    pub fn remaining_count(&self) -> Option<u64> {
        self.remaining.as_bounded()
    }
}
