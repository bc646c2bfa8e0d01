//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 套餐策略
//!
//! 套餐到阈值的纯映射，不访问任何存储。

use crate::constants::{
    FREE_DAILY_LIMIT, FREE_EDIT_LIMIT_PER_RESOURCE, FREE_FRAMEWORKS, RATE_LIMIT_MAX_REQUESTS,
};
use crate::error::GateError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 订阅套餐
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    #[default]
    Free,
    Pro,
    Team,
}

impl Plan {
    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Free => "free",
            Plan::Pro => "pro",
            Plan::Team => "team",
        }
    }

    /// 是否为付费套餐
    pub fn is_paid(&self) -> bool {
        !matches!(self, Plan::Free)
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Plan {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "free" => Ok(Plan::Free),
            "pro" => Ok(Plan::Pro),
            "team" => Ok(Plan::Team),
            other => Err(GateError::ConfigError(format!("未知套餐: {}", other))),
        }
    }
}

/// 额度上限
///
/// 无上限是独立的变体，不与任何计数值相等。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Limit {
    Bounded(u64),
    Unbounded,
}

impl Limit {
    pub fn is_unbounded(&self) -> bool {
        matches!(self, Limit::Unbounded)
    }

    pub fn as_bounded(&self) -> Option<u64> {
        match self {
            Limit::Bounded(n) => Some(*n),
            Limit::Unbounded => None,
        }
    }

    /// 已用量是否仍低于上限
    pub fn admits(&self, used: u64) -> bool {
        match self {
            Limit::Bounded(max) => used < *max,
            Limit::Unbounded => true,
        }
    }

    /// 扣除已用量后的剩余额度
    pub fn remaining_after(&self, used: u64) -> Limit {
        match self {
            Limit::Bounded(max) => Limit::Bounded(max.saturating_sub(used)),
            Limit::Unbounded => Limit::Unbounded,
        }
    }
}

impl fmt::Display for Limit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Limit::Bounded(n) => write!(f, "{}", n),
            Limit::Unbounded => f.write_str("unlimited"),
        }
    }
}

/// 套餐阈值
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thresholds {
    /// 每分钟突发上限（全局，不随套餐变化）
    pub burst_per_minute: u64,
    /// 每日生成上限
    pub daily_limit: Limit,
    /// 单个产物的编辑上限
    pub edit_limit_per_resource: Limit,
    /// 输出是否带水印
    pub watermark: bool,
    /// 是否开放全部框架
    pub all_frameworks: bool,
}

/// 获取套餐阈值
pub fn thresholds(plan: Plan) -> Thresholds {
    match plan {
        Plan::Pro | Plan::Team => Thresholds {
            burst_per_minute: RATE_LIMIT_MAX_REQUESTS,
            daily_limit: Limit::Unbounded,
            edit_limit_per_resource: Limit::Unbounded,
            watermark: false,
            all_frameworks: true,
        },
        Plan::Free => Thresholds {
            burst_per_minute: RATE_LIMIT_MAX_REQUESTS,
            daily_limit: Limit::Bounded(FREE_DAILY_LIMIT),
            edit_limit_per_resource: Limit::Bounded(FREE_EDIT_LIMIT_PER_RESOURCE),
            watermark: true,
            all_frameworks: false,
        },
    }
}

/// 检查套餐是否可使用指定框架
pub fn can_use_framework(plan: Plan, framework: &str) -> bool {
    thresholds(plan).all_frameworks || FREE_FRAMEWORKS.contains(&framework)
}
