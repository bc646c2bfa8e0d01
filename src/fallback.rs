//! 降级策略实现
//!
//! 计数存储不可用时，由降级策略给出决策，而不是把存储错误抛给调用方。
//!
//! # 特性
//!
//! - **两种策略**: FailOpen（默认）、FailClosed
//! - **统一配置**: 一次配置，三个额度追踪器共用
//! - **故障状态**: 按组件记录故障与恢复，状态变化时打印日志

use crate::error::{GateError, QuotaDecision, StorageError};
use crate::plan::Limit;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{error, info, warn};

/// 降级策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackStrategy {
    /// 故障时允许请求通过
    #[default]
    FailOpen,
    /// 故障时拒绝请求
    FailClosed,
}

impl FallbackStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FallbackStrategy::FailOpen => "fail_open",
            FallbackStrategy::FailClosed => "fail_closed",
        }
    }
}

impl fmt::Display for FallbackStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FallbackStrategy {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "fail_open" | "open" => Ok(FallbackStrategy::FailOpen),
            "fail_closed" | "closed" => Ok(FallbackStrategy::FailClosed),
            other => Err(GateError::ConfigError(format!("未知降级策略: {}", other))),
        }
    }
}

/// 受降级策略保护的组件
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuotaComponent {
    /// 突发限流
    Rate,
    /// 每日额度
    Daily,
    /// 编辑额度
    Edit,
}

impl QuotaComponent {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuotaComponent::Rate => "rate",
            QuotaComponent::Daily => "daily",
            QuotaComponent::Edit => "edit",
        }
    }

    fn index(&self) -> usize {
        match self {
            QuotaComponent::Rate => 0,
            QuotaComponent::Daily => 1,
            QuotaComponent::Edit => 2,
        }
    }
}

/// 降级策略管理器
#[derive(Debug, Default)]
pub struct FallbackManager {
    strategy: FallbackStrategy,
    failure_states: [AtomicBool; 3],
    fallback_count: AtomicU64,
}

impl FallbackManager {
    /// 创建新的降级策略管理器
    pub fn new(strategy: FallbackStrategy) -> Self {
        info!("创建降级策略管理器, strategy={}", strategy);
        Self {
            strategy,
            ..Default::default()
        }
    }

    pub fn strategy(&self) -> FallbackStrategy {
        self.strategy
    }

    /// 存储错误对应的降级决策
    pub fn decide(&self, component: QuotaComponent, err: &StorageError) -> QuotaDecision {
        self.set_failure(component);
        self.fallback_count.fetch_add(1, Ordering::Relaxed);

        let decision = match self.strategy {
            FallbackStrategy::FailOpen => {
                warn!(
                    "计数存储不可用，FailOpen 允许请求: component={}, error={}",
                    component.as_str(),
                    err
                );
                QuotaDecision::allow(Limit::Unbounded)
            }
            FallbackStrategy::FailClosed => {
                warn!(
                    "计数存储不可用，FailClosed 拒绝请求: component={}, error={}",
                    component.as_str(),
                    err
                );
                QuotaDecision::deny()
            }
        };
        decision.degraded()
    }

    /// 执行额度检查，存储失败时按策略降级
    pub async fn execute_with_fallback<Fut>(
        &self,
        component: QuotaComponent,
        operation: Fut,
    ) -> QuotaDecision
    where
        Fut: Future<Output = Result<QuotaDecision, StorageError>>,
    {
        match operation.await {
            Ok(decision) => {
                self.clear_failure(component);
                decision
            }
            Err(e) => self.decide(component, &e),
        }
    }

    /// 执行计数提交，存储失败时记录日志并返回错误
    ///
    /// 提交发生在业务动作成功之后，失败不影响已经给出的响应。
    pub async fn record_commit<Fut>(
        &self,
        component: QuotaComponent,
        operation: Fut,
    ) -> Result<(), GateError>
    where
        Fut: Future<Output = Result<(), GateError>>,
    {
        match operation.await {
            Ok(()) => {
                self.clear_failure(component);
                Ok(())
            }
            Err(GateError::StoreUnavailable(e)) => {
                self.set_failure(component);
                error!(
                    "计数提交失败，本次使用未计入: component={}, error={}",
                    component.as_str(),
                    e
                );
                Err(GateError::StoreUnavailable(e))
            }
            Err(e) => Err(e),
        }
    }

    /// 标记组件为故障状态
    fn set_failure(&self, component: QuotaComponent) {
        if !self.failure_states[component.index()].swap(true, Ordering::Relaxed) {
            warn!("组件故障: {}", component.as_str());
        }
    }

    /// 清除组件故障状态
    fn clear_failure(&self, component: QuotaComponent) {
        if self.failure_states[component.index()].swap(false, Ordering::Relaxed) {
            info!("组件恢复: {}", component.as_str());
        }
    }

    /// 检查组件是否故障
    pub fn is_failed(&self, component: QuotaComponent) -> bool {
        self.failure_states[component.index()].load(Ordering::Relaxed)
    }

    /// 降级决策总次数
    pub fn fallback_count(&self) -> u64 {
        self.fallback_count.load(Ordering::Relaxed)
    }
}
