//! Gatekeeper 主控制器
//!
//! 每个请求的处理顺序：
//!
//! 1. 解析身份与套餐
//! 2. 突发限流（按客户端地址，检查即计数）
//! 3. 每日额度 / 编辑额度检查（不计数）
//! 4. 业务动作成功后，调用方执行 `commit_*`，计入被检查过的额度
//!
//! 存储故障统一交给 [`FallbackManager`]，不会以错误的形式返回给传输层。

use crate::account::{with_deadline, AccountStore, MemoryAccountStore};
use crate::clock::{next_utc_midnight, Clock, SystemClock};
use crate::constants::{DEFAULT_STORE_TIMEOUT_MS, RATE_LIMIT_MAX_REQUESTS};
use crate::error::{GateError, QuotaDecision};
use crate::fallback::{FallbackManager, FallbackStrategy, QuotaComponent};
use crate::identity::{
    AnonymousOnly, CallerContext, Identity, IdentityResolver, RequestContext, SessionResolver,
};
use crate::limiters::{DailyQuotaTracker, EditQuotaTracker, RateLimiter};
use crate::log_redaction::{redact_ip, redact_user_id};
use crate::plan::{can_use_framework, thresholds, Limit, Plan};
use crate::rejection::{success_headers, Rejection};
use crate::storage::CounterStore;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// 通过检查的请求
///
/// 业务动作成功后交给 `commit_generation` / `commit_edit`。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    pub caller: CallerContext,
    /// 突发限流决策
    pub rate: QuotaDecision,
    /// 每日额度决策（未检查时为 None）
    pub daily: Option<QuotaDecision>,
    /// 编辑额度决策（未检查时为 None）
    pub edit: Option<QuotaDecision>,
    /// 编辑的产物ID
    pub resource_id: Option<String>,
}

impl Admission {
    /// 是否有任何决策来自降级策略
    pub fn degraded(&self) -> bool {
        self.rate.degraded
            || self.daily.as_ref().is_some_and(|d| d.degraded)
            || self.edit.as_ref().is_some_and(|d| d.degraded)
    }

    /// 剩余突发额度（降级放行时按上限报告）
    pub fn rate_remaining(&self) -> u64 {
        self.rate
            .remaining_count()
            .unwrap_or(RATE_LIMIT_MAX_REQUESTS)
    }

    /// 成功响应的响应头
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        success_headers(self.rate_remaining())
    }
}

/// 已认证用户的用量概览
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSummary {
    pub plan: Plan,
    pub generations_today: u64,
    pub daily_limit: Limit,
    pub edit_limit: Limit,
    pub all_frameworks: bool,
    pub watermark: bool,
    pub reset_at: DateTime<Utc>,
}

/// Gatekeeper 构建器
pub struct GatekeeperBuilder {
    store: Arc<dyn CounterStore>,
    accounts: Option<Arc<dyn AccountStore>>,
    sessions: Option<Arc<dyn SessionResolver>>,
    clock: Option<Arc<dyn Clock>>,
    fallback: FallbackStrategy,
    rate_limiter: Option<RateLimiter>,
    backend_timeout: Duration,
}

impl GatekeeperBuilder {
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self {
            store,
            accounts: None,
            sessions: None,
            clock: None,
            fallback: FallbackStrategy::default(),
            rate_limiter: None,
            backend_timeout: Duration::from_millis(DEFAULT_STORE_TIMEOUT_MS),
        }
    }

    /// 账户存储（默认使用内存账户存储）
    pub fn accounts(mut self, accounts: Arc<dyn AccountStore>) -> Self {
        self.accounts = Some(accounts);
        self
    }

    /// 会话解析器（默认不识别任何会话）
    pub fn sessions(mut self, sessions: Arc<dyn SessionResolver>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn fallback(mut self, strategy: FallbackStrategy) -> Self {
        self.fallback = strategy;
        self
    }

    /// 替换突发限流器（自定义窗口或上限）
    pub fn rate_limiter(mut self, limiter: RateLimiter) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    /// 会话解析器与账户存储单次调用的时限
    pub fn backend_timeout(mut self, timeout: Duration) -> Self {
        self.backend_timeout = timeout;
        self
    }

    pub fn build(self) -> Gatekeeper {
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let accounts = self
            .accounts
            .unwrap_or_else(|| Arc::new(MemoryAccountStore::with_clock(clock.clone())));
        let sessions = self.sessions.unwrap_or_else(|| Arc::new(AnonymousOnly));

        info!(
            "创建 Gatekeeper: backend={}, fallback={}, backend_timeout={}ms",
            self.store.backend_name(),
            self.fallback,
            self.backend_timeout.as_millis()
        );

        Gatekeeper {
            identity: IdentityResolver::new(sessions, accounts.clone())
                .with_timeout(self.backend_timeout),
            rate: self
                .rate_limiter
                .unwrap_or_else(|| RateLimiter::new(self.store.clone())),
            daily: DailyQuotaTracker::new(self.store.clone(), accounts.clone(), clock.clone())
                .with_timeout(self.backend_timeout),
            edit: EditQuotaTracker::new(self.store.clone()),
            accounts,
            fallback: FallbackManager::new(self.fallback),
            clock,
            store: self.store,
            backend_timeout: self.backend_timeout,
        }
    }
}

/// Gatekeeper 主控制器
pub struct Gatekeeper {
    identity: IdentityResolver,
    rate: RateLimiter,
    daily: DailyQuotaTracker,
    edit: EditQuotaTracker,
    accounts: Arc<dyn AccountStore>,
    fallback: FallbackManager,
    clock: Arc<dyn Clock>,
    store: Arc<dyn CounterStore>,
    backend_timeout: Duration,
}

impl Gatekeeper {
    pub fn builder(store: Arc<dyn CounterStore>) -> GatekeeperBuilder {
        GatekeeperBuilder::new(store)
    }

    /// 计数存储后端名称
    pub fn backend_name(&self) -> &'static str {
        self.store.backend_name()
    }

    pub fn fallback(&self) -> &FallbackManager {
        &self.fallback
    }

    /// 会话解析器与账户存储单次调用的时限
    pub fn backend_timeout(&self) -> Duration {
        self.backend_timeout
    }

    // ========================================================================
    // 单项操作
    // ========================================================================

    /// 解析调用方身份与套餐
    pub async fn resolve_identity(&self, context: &RequestContext) -> CallerContext {
        self.identity.resolve(context).await
    }

    /// 突发限流（检查即计数）
    pub async fn check_rate(&self, subject_key: &str) -> QuotaDecision {
        self.fallback
            .execute_with_fallback(QuotaComponent::Rate, self.rate.check(subject_key))
            .await
    }

    /// 每日额度检查（不计数）
    pub async fn check_daily(&self, identity: &Identity, plan: Plan) -> QuotaDecision {
        self.fallback
            .execute_with_fallback(QuotaComponent::Daily, self.daily.check(identity, plan))
            .await
    }

    /// 计入一次成功的生成
    pub async fn increment_daily(&self, identity: &Identity) -> Result<(), GateError> {
        self.fallback
            .record_commit(QuotaComponent::Daily, self.daily.increment(identity))
            .await
    }

    /// 编辑额度检查（不计数）
    pub async fn check_edit(
        &self,
        subject_key: &str,
        resource_id: &str,
        plan: Plan,
    ) -> QuotaDecision {
        self.fallback
            .execute_with_fallback(
                QuotaComponent::Edit,
                self.edit.check(subject_key, resource_id, plan),
            )
            .await
    }

    /// 计入一次成功的编辑
    pub async fn increment_edit(
        &self,
        subject_key: &str,
        resource_id: &str,
    ) -> Result<(), GateError> {
        self.fallback
            .record_commit(QuotaComponent::Edit, async {
                self.edit.increment(subject_key, resource_id).await.map(|_| ())
            })
            .await
    }

    /// 框架权限检查
    pub fn check_framework(
        &self,
        caller: &CallerContext,
        framework: &str,
    ) -> Result<(), Rejection> {
        if can_use_framework(caller.plan, framework) {
            Ok(())
        } else {
            info!("框架需要付费套餐: framework={}, plan={}", framework, caller.plan);
            Err(Rejection::FrameworkLocked {
                framework: framework.to_string(),
            })
        }
    }

    // ========================================================================
    // 组合流程
    // ========================================================================

    /// 生成请求准入：身份 → 突发限流 → 每日额度 → 框架
    #[instrument(skip(self, context))]
    pub async fn admit_generation(
        &self,
        context: &RequestContext,
        framework: Option<&str>,
    ) -> Result<Admission, Rejection> {
        let caller = self.resolve_identity(context).await;
        let rate = self.admit_rate(&caller).await?;

        let daily = self.check_daily(&caller.identity, caller.plan).await;
        if !daily.allowed {
            info!("每日额度拒绝: {}", describe(&caller));
            return Err(Rejection::DailyLimitReached {
                authenticated: caller.identity.authenticated,
            });
        }

        if let Some(framework) = framework {
            self.check_framework(&caller, framework)?;
        }

        Ok(Admission {
            caller,
            rate,
            daily: Some(daily),
            edit: None,
            resource_id: None,
        })
    }

    /// 生成成功后计数
    pub async fn commit_generation(&self, admission: &Admission) -> Result<(), GateError> {
        self.increment_daily(&admission.caller.identity).await
    }

    /// 编辑请求准入：身份 → 突发限流 → 每日额度（仅匿名）→ 编辑额度
    ///
    /// 未提供产物ID时不检查编辑额度。
    #[instrument(skip(self, context))]
    pub async fn admit_edit(
        &self,
        context: &RequestContext,
        resource_id: Option<&str>,
    ) -> Result<Admission, Rejection> {
        let caller = self.resolve_identity(context).await;
        let rate = self.admit_rate(&caller).await?;

        let daily = if caller.identity.authenticated {
            None
        } else {
            let decision = self.check_daily(&caller.identity, caller.plan).await;
            if !decision.allowed {
                info!("每日额度拒绝（编辑）: {}", describe(&caller));
                return Err(Rejection::DailyLimitReached {
                    authenticated: false,
                });
            }
            Some(decision)
        };

        let resource_id = resource_id.filter(|r| !r.trim().is_empty());
        let edit = match resource_id {
            Some(resource_id) if !caller.thresholds.edit_limit_per_resource.is_unbounded() => {
                let decision = self
                    .check_edit(&caller.identity.subject_key, resource_id, caller.plan)
                    .await;
                if !decision.allowed {
                    info!("编辑额度拒绝: {}, resource={}", describe(&caller), resource_id);
                    return Err(Rejection::EditLimitReached);
                }
                Some(decision)
            }
            _ => None,
        };

        Ok(Admission {
            caller,
            rate,
            daily,
            edit,
            resource_id: resource_id.map(str::to_string),
        })
    }

    /// 编辑成功后计数
    ///
    /// 两项计数都会尝试，返回第一个错误。
    pub async fn commit_edit(&self, admission: &Admission) -> Result<(), GateError> {
        let identity = &admission.caller.identity;

        let daily = if identity.authenticated {
            Ok(())
        } else {
            self.increment_daily(identity).await
        };

        let edit = match &admission.resource_id {
            Some(resource_id)
                if !admission
                    .caller
                    .thresholds
                    .edit_limit_per_resource
                    .is_unbounded() =>
            {
                self.increment_edit(&identity.subject_key, resource_id).await
            }
            _ => Ok(()),
        };

        daily.and(edit)
    }

    /// 已认证用户的用量概览（会触发每日用量的惰性重置）
    pub async fn usage_summary(&self, user_id: &str) -> Result<UsageSummary, GateError> {
        let missing = || GateError::AccountRecordMissing(redact_user_id(Some(user_id)));

        let limit = self.backend_timeout;

        let plan = with_deadline(limit, "find_plan", self.accounts.find_plan(user_id))
            .await?
            .ok_or_else(missing)?;
        let mut usage = with_deadline(limit, "daily_usage", self.accounts.daily_usage(user_id))
            .await?
            .ok_or_else(missing)?;

        let now = self.clock.now();
        if usage.is_stale(now) {
            let next_reset = next_utc_midnight(now);
            with_deadline(
                limit,
                "reset_daily_usage",
                self.accounts.reset_daily_usage(user_id, next_reset),
            )
            .await?;
            usage.generations_today = 0;
            usage.reset_at = next_reset;
        }

        let limits = thresholds(plan);
        Ok(UsageSummary {
            plan,
            generations_today: usage.generations_today,
            daily_limit: limits.daily_limit,
            edit_limit: limits.edit_limit_per_resource,
            all_frameworks: limits.all_frameworks,
            watermark: limits.watermark,
            reset_at: usage.reset_at,
        })
    }

    async fn admit_rate(&self, caller: &CallerContext) -> Result<QuotaDecision, Rejection> {
        let rate = self.check_rate(&caller.identity.client_addr).await;
        if rate.degraded {
            warn!("突发限流降级: {}", describe(caller));
        }
        if !rate.allowed {
            info!("突发限流拒绝: {}", describe(caller));
            return Err(Rejection::RateLimited);
        }
        debug!(
            "突发限流通过: {}, remaining={}",
            describe(caller),
            rate.remaining
        );
        Ok(rate)
    }
}

fn describe(caller: &CallerContext) -> String {
    let identity = &caller.identity;
    if identity.authenticated {
        format!(
            "user={}, addr={}, plan={}",
            redact_user_id(Some(&identity.subject_key)),
            redact_ip(Some(&identity.client_addr)),
            caller.plan
        )
    } else {
        format!(
            "addr={}, plan={}",
            redact_ip(Some(&identity.client_addr)),
            caller.plan
        )
    }
}
