//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 身份解析模块
//!
//! 从请求元数据中得到调用方身份与套餐。
//!
//! # 解析顺序
//!
//! 1. 客户端地址：第一个存在的头（`x-real-ip`，其次 `x-forwarded-for`）的第一个条目，
//!    该条目无法解析时为 `"unknown"`
//! 2. 会话令牌 → [`SessionResolver`] → 用户ID
//! 3. 用户ID → [`AccountStore::find_plan`] → 套餐
//!
//! 第 2、3 步共用一个时限。任何失败或超时都降级为匿名免费身份，不向调用方报错。

use crate::account::AccountStore;
use crate::constants::{DEFAULT_STORE_TIMEOUT_MS, UNKNOWN_SUBJECT};
use crate::error::{GateError, StorageError};
use crate::log_redaction::{redact_ip, redact_token, redact_user_id};
use crate::plan::{thresholds, Plan, Thresholds};
use ahash::AHashMap as HashMap;
use async_trait::async_trait;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

// ============================================================================
// 请求上下文
// ============================================================================

/// HTTP请求上下文
///
/// 传输层提取出的最小请求信息。
#[derive(Clone, Default)]
pub struct RequestContext {
    /// HTTP头（键为小写）
    pub headers: HashMap<String, String>,
    /// 会话令牌
    pub session_token: Option<String>,
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // 脱敏 headers
        let headers: HashMap<&str, String> = self
            .headers
            .iter()
            .map(|(k, v)| {
                let v = if k.contains("auth") || k.contains("cookie") || k.contains("token") {
                    "***".to_string()
                } else {
                    v.clone()
                };
                (k.as_str(), v)
            })
            .collect();

        f.debug_struct("RequestContext")
            .field("headers", &headers)
            .field("session_token", &redact_token(self.session_token.as_deref()))
            .finish()
    }
}

impl RequestContext {
    /// 创建新的请求上下文
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加HTTP头
    pub fn with_header(mut self, key: &str, value: &str) -> Self {
        self.headers.insert(key.to_lowercase(), value.to_string());
        self
    }

    /// 设置会话令牌
    pub fn with_session_token(mut self, token: &str) -> Self {
        self.session_token = Some(token.to_string());
        self
    }

    /// 获取HTTP头（不区分大小写）
    pub fn get_header(&self, key: &str) -> Option<&String> {
        self.headers.get(&key.to_lowercase())
    }
}

// ============================================================================
// IP提取器
// ============================================================================

/// IP提取器
///
/// 按优先级顺序取第一个存在的HTTP头，只看它的第一个条目。
/// 该条目无法解析时结果为 `None`，不再尝试后续条目或后续的头。
#[derive(Debug, Clone)]
pub struct IpExtractor {
    /// HTTP头名称列表（按优先级顺序）
    header_names: Vec<String>,
}

impl IpExtractor {
    pub fn new(header_names: Vec<String>) -> Self {
        Self {
            header_names: header_names.iter().map(|h| h.to_lowercase()).collect(),
        }
    }

    /// 默认顺序：`x-real-ip`，其次 `x-forwarded-for`
    pub fn new_default() -> Self {
        Self::new(vec!["x-real-ip".to_string(), "x-forwarded-for".to_string()])
    }

    /// 提取规范化后的客户端地址
    pub fn extract(&self, context: &RequestContext) -> Option<String> {
        let value = self
            .header_names
            .iter()
            .find_map(|name| context.get_header(name))?;
        // X-Forwarded-For 格式：client, proxy1, proxy2，客户端在最左边
        value.split(',').next().and_then(normalize_addr)
    }

    /// 提取客户端地址，失败时返回 `"unknown"`
    pub fn extract_or_unknown(&self, context: &RequestContext) -> String {
        self.extract(context)
            .unwrap_or_else(|| UNKNOWN_SUBJECT.to_string())
    }
}

impl Default for IpExtractor {
    fn default() -> Self {
        Self::new_default()
    }
}

/// 规范化单个地址条目
///
/// 接受 `1.2.3.4`、`1.2.3.4:8080`、`::1`、`[::1]`、`[::1]:443`；无法解析返回 `None`。
pub fn normalize_addr(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(ip) = raw.parse::<IpAddr>() {
        return Some(ip.to_string());
    }
    if let Ok(addr) = raw.parse::<SocketAddr>() {
        return Some(addr.ip().to_string());
    }
    raw.strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .and_then(|s| s.parse::<IpAddr>().ok())
        .map(|ip| ip.to_string())
}

// ============================================================================
// 身份
// ============================================================================

/// 调用方身份
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    /// 是否已认证
    pub authenticated: bool,
    /// 额度主体：已认证为用户ID，否则为客户端地址，永不为空
    pub subject_key: String,
    /// 规范化的客户端地址（突发限流的键）
    pub client_addr: String,
}

impl Identity {
    /// 匿名身份
    pub fn anonymous(client_addr: impl Into<String>) -> Self {
        let client_addr = non_empty_or_unknown(client_addr.into());
        Self {
            authenticated: false,
            subject_key: client_addr.clone(),
            client_addr,
        }
    }

    /// 已认证身份
    pub fn authenticated(user_id: impl Into<String>, client_addr: impl Into<String>) -> Self {
        Self {
            authenticated: true,
            subject_key: non_empty_or_unknown(user_id.into()),
            client_addr: non_empty_or_unknown(client_addr.into()),
        }
    }

    /// 已认证时返回用户ID
    pub fn user_id(&self) -> Option<&str> {
        self.authenticated.then_some(self.subject_key.as_str())
    }
}

fn non_empty_or_unknown(value: String) -> String {
    if value.trim().is_empty() {
        UNKNOWN_SUBJECT.to_string()
    } else {
        value
    }
}

/// 单次请求的调用方上下文
///
/// 解析一次后不再变化。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerContext {
    pub identity: Identity,
    pub plan: Plan,
    pub thresholds: Thresholds,
}

impl CallerContext {
    pub fn new(identity: Identity, plan: Plan) -> Self {
        Self {
            identity,
            plan,
            thresholds: thresholds(plan),
        }
    }

    /// 匿名免费调用方
    pub fn anonymous(client_addr: impl Into<String>) -> Self {
        Self::new(Identity::anonymous(client_addr), Plan::Free)
    }
}

// ============================================================================
// 会话解析
// ============================================================================

/// 会话解析接口
///
/// 会话签发与凭证存储由外部认证系统负责，这里只把令牌换成用户ID。
#[async_trait]
pub trait SessionResolver: Send + Sync {
    /// 令牌有效时返回用户ID，无效或过期返回 `None`
    async fn resolve(&self, token: &str) -> Result<Option<String>, GateError>;
}

/// 不识别任何会话（仅匿名访问的部署）
#[derive(Debug, Clone, Copy, Default)]
pub struct AnonymousOnly;

#[async_trait]
impl SessionResolver for AnonymousOnly {
    async fn resolve(&self, _token: &str) -> Result<Option<String>, GateError> {
        Ok(None)
    }
}

/// 身份解析器
pub struct IdentityResolver {
    sessions: Arc<dyn SessionResolver>,
    accounts: Arc<dyn AccountStore>,
    ip_extractor: IpExtractor,
    timeout: Duration,
}

impl IdentityResolver {
    pub fn new(sessions: Arc<dyn SessionResolver>, accounts: Arc<dyn AccountStore>) -> Self {
        Self {
            sessions,
            accounts,
            ip_extractor: IpExtractor::new_default(),
            timeout: Duration::from_millis(DEFAULT_STORE_TIMEOUT_MS),
        }
    }

    /// 会话解析与套餐查询的总时限
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// 替换IP提取器
    pub fn with_ip_extractor(mut self, ip_extractor: IpExtractor) -> Self {
        self.ip_extractor = ip_extractor;
        self
    }

    /// 解析调用方上下文
    ///
    /// 任何认证相关的失败都降级为匿名免费身份。
    pub async fn resolve(&self, context: &RequestContext) -> CallerContext {
        let client_addr = self.ip_extractor.extract_or_unknown(context);
        trace!("客户端地址: {}", redact_ip(Some(&client_addr)));

        let Some(token) = context.session_token.as_deref().filter(|t| !t.is_empty()) else {
            return CallerContext::anonymous(client_addr);
        };

        let resolved = tokio::time::timeout(self.timeout, self.resolve_user(token))
            .await
            .unwrap_or_else(|_| {
                Err(GateError::StoreUnavailable(StorageError::TimeoutError(
                    format!("身份解析超过 {}ms", self.timeout.as_millis()),
                )))
            });

        match resolved {
            Ok((user_id, plan)) => {
                debug!(
                    "已认证调用方: user={}, plan={}",
                    redact_user_id(Some(&user_id)),
                    plan
                );
                CallerContext::new(Identity::authenticated(user_id, client_addr), plan)
            }
            Err(e) => {
                match &e {
                    GateError::StoreUnavailable(_) => warn!("{}，按匿名处理", e),
                    _ => debug!("{}，按匿名处理", e),
                }
                CallerContext::anonymous(client_addr)
            }
        }
    }

    async fn resolve_user(&self, token: &str) -> Result<(String, Plan), GateError> {
        let user_id = self
            .sessions
            .resolve(token)
            .await
            .map_err(|e| GateError::IdentityResolutionFailed(format!("会话解析失败: {}", e)))?
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| {
                GateError::IdentityResolutionFailed(format!(
                    "会话无效: {}",
                    redact_token(Some(token))
                ))
            })?;

        let plan = self
            .accounts
            .find_plan(&user_id)
            .await?
            .ok_or_else(|| {
                GateError::IdentityResolutionFailed(format!(
                    "账户不存在: {}",
                    redact_user_id(Some(&user_id))
                ))
            })?;

        Ok((user_id, plan))
    }
}
