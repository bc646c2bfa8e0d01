//! 拒绝响应
//!
//! 额度拒绝是预期内的控制流，不是错误。这里把拒绝原因映射为
//! HTTP 状态码、响应头和 JSON 响应体，传输层按原样写出即可。

use crate::constants::{FREE_DAILY_LIMIT, FREE_EDIT_LIMIT_PER_RESOURCE, RATE_LIMIT_RETRY_AFTER_SECS};
use serde::Serialize;
use std::fmt;

pub const HEADER_RETRY_AFTER: &str = "Retry-After";
pub const HEADER_RATE_REMAINING: &str = "X-RateLimit-Remaining";
pub const HEADER_DAILY_REMAINING: &str = "X-Daily-Remaining";
pub const HEADER_EDIT_REMAINING: &str = "X-Edit-Remaining";

/// 被拒绝的额度类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Budget {
    Rate,
    Daily,
    Edit,
    Framework,
}

/// 拒绝原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// 突发限流
    RateLimited,
    /// 每日额度用尽
    DailyLimitReached { authenticated: bool },
    /// 编辑额度用尽
    EditLimitReached,
    /// 免费套餐不可用的框架
    FrameworkLocked { framework: String },
}

/// JSON 响应体
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectionBody {
    pub error: String,
    pub success: bool,
    pub budget: Budget,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edit_limit_reached: Option<bool>,
}

impl Rejection {
    pub fn budget(&self) -> Budget {
        match self {
            Rejection::RateLimited => Budget::Rate,
            Rejection::DailyLimitReached { .. } => Budget::Daily,
            Rejection::EditLimitReached => Budget::Edit,
            Rejection::FrameworkLocked { .. } => Budget::Framework,
        }
    }

    /// HTTP 状态码
    pub fn status(&self) -> u16 {
        match self {
            Rejection::FrameworkLocked { .. } => 403,
            _ => 429,
        }
    }

    /// 响应头
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        match self {
            Rejection::RateLimited => vec![
                (HEADER_RETRY_AFTER, RATE_LIMIT_RETRY_AFTER_SECS.to_string()),
                (HEADER_RATE_REMAINING, "0".to_string()),
            ],
            Rejection::DailyLimitReached { .. } => {
                vec![(HEADER_DAILY_REMAINING, "0".to_string())]
            }
            Rejection::EditLimitReached => vec![(HEADER_EDIT_REMAINING, "0".to_string())],
            Rejection::FrameworkLocked { .. } => Vec::new(),
        }
    }

    /// 面向用户的提示
    pub fn message(&self) -> String {
        match self {
            Rejection::RateLimited => {
                "Too many requests. Please wait a minute and try again.".to_string()
            }
            Rejection::DailyLimitReached {
                authenticated: true,
            } => "Daily limit reached. Upgrade to Pro for unlimited conversions!".to_string(),
            Rejection::DailyLimitReached {
                authenticated: false,
            } => format!(
                "You've used all {} free conversions for today. Sign up or come back tomorrow!",
                FREE_DAILY_LIMIT
            ),
            Rejection::EditLimitReached => format!(
                "You've used all {} free edits for this conversion. Generate a new one or upgrade to Pro!",
                FREE_EDIT_LIMIT_PER_RESOURCE
            ),
            Rejection::FrameworkLocked { framework } => format!(
                "The {} framework requires a Pro plan. Upgrade to unlock all frameworks!",
                framework
            ),
        }
    }

    /// JSON 响应体
    pub fn body(&self) -> RejectionBody {
        RejectionBody {
            error: self.message(),
            success: false,
            budget: self.budget(),
            edit_limit_reached: matches!(self, Rejection::EditLimitReached).then_some(true),
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.status(), self.message())
    }
}

/// 成功响应需要附带的响应头
pub fn success_headers(rate_remaining: u64) -> Vec<(&'static str, String)> {
    vec![(HEADER_RATE_REMAINING, rate_remaining.to_string())]
}
