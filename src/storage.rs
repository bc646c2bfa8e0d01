//! 存储抽象层
//!
//! 定义计数存储接口和内存实现。
//!
//! 计数的生命周期：首次自增时以 1 创建并设置过期时间；之后的自增只增加计数，
//! 不刷新过期时间；过期后在下一次访问时视为不存在。

use crate::clock::{Clock, SystemClock};
use crate::constants::{
    DAILY_KEY_PREFIX, EDIT_KEY_PREFIX, MAX_KEY_COMPONENT_LENGTH, RATE_KEY_PREFIX, UNKNOWN_SUBJECT,
};
use crate::error::StorageError;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// 计数键
///
/// 由命名空间、主体键以及（编辑额度时的）资源ID组成，不同命名空间互不冲突。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CounterKey(String);

impl CounterKey {
    /// 突发限流计数键 `rate:{subject}`
    pub fn rate(subject_key: &str) -> Self {
        Self(format!("{}:{}", RATE_KEY_PREFIX, subject_or_unknown(subject_key)))
    }

    /// 匿名每日额度计数键 `daily:{subject}`
    pub fn daily(subject_key: &str) -> Self {
        Self(format!("{}:{}", DAILY_KEY_PREFIX, subject_or_unknown(subject_key)))
    }

    /// 编辑额度计数键 `edit:{subject}:{resource}`
    pub fn edit(subject_key: &str, resource_id: &str) -> Self {
        Self(format!(
            "{}:{}:{}",
            EDIT_KEY_PREFIX,
            subject_or_unknown(subject_key),
            encode_key_component(resource_id)
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CounterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn subject_or_unknown(subject_key: &str) -> &str {
    let trimmed = subject_key.trim();
    if trimmed.is_empty() {
        UNKNOWN_SUBJECT
    } else {
        trimmed
    }
}

/// 编码键组件
///
/// 资源ID来自请求体。字母数字和 `-`、`_`、`.` 原样保留，其余字节编码为 `%XX`，
/// 不同的输入得到不同的键组件，编码结果不含 `:`。编码后超过
/// [`MAX_KEY_COMPONENT_LENGTH`] 时改用 `%sha256-{hex}` 摘要（`%s` 不会出现在
/// 普通编码结果中）。
pub fn encode_key_component(input: &str) -> String {
    let mut encoded = String::with_capacity(input.len());
    for byte in input.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.') {
            encoded.push(char::from(byte));
        } else {
            encoded.push_str(&format!("%{:02X}", byte));
        }
    }

    if encoded.len() > MAX_KEY_COMPONENT_LENGTH {
        let digest = Sha256::digest(input.as_bytes());
        return format!("%sha256-{}", hex::encode(digest));
    }
    encoded
}

/// 计数存储接口
///
/// 对同一个键的并发 `increment_and_get` 调用不得丢失更新：
/// 最终计数等于调用次数。
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// 原子自增并返回新值
    ///
    /// 键不存在（或已过期）时以 1 创建，并设置 `ttl`；已存在的键不刷新过期时间。
    async fn increment_and_get(&self, key: &CounterKey, ttl: Duration)
        -> Result<u64, StorageError>;

    /// 只读查询
    ///
    /// 不存在或已过期的键返回 `None`。
    async fn peek(&self, key: &CounterKey) -> Result<Option<u64>, StorageError>;

    /// 后端名称（用于日志）
    fn backend_name(&self) -> &'static str;
}

/// 计数条目
#[derive(Debug, Clone, Copy)]
struct CounterEntry {
    count: u64,
    expires_at: DateTime<Utc>,
}

impl CounterEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// 内存存储实现
///
/// 只在单个进程内保证正确性，多实例部署之间不共享计数；
/// 多实例部署请使用 Redis 存储。
pub struct MemoryStorage {
    counters: DashMap<String, CounterEntry>,
    clock: Arc<dyn Clock>,
}

impl MemoryStorage {
    /// 创建新的内存存储
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// 使用指定时钟创建内存存储
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            counters: DashMap::new(),
            clock,
        }
    }

    /// 清理已过期的计数，返回清理数量
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let mut removed = 0;
        self.counters.retain(|_, entry| {
            if entry.is_expired(now) {
                removed += 1;
                false
            } else {
                true
            }
        });
        if removed > 0 {
            debug!("内存存储清理过期计数: {} 条", removed);
        }
        removed
    }

    /// 当前保存的条目数（含尚未清理的过期条目）
    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    /// 启动周期清理任务
    ///
    /// 任务只持有弱引用，存储被释放后自动退出。
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // 第一次 tick 立即完成
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match weak.upgrade() {
                    Some(storage) => {
                        storage.sweep_expired();
                    }
                    None => {
                        trace!("内存存储已释放，清理任务退出");
                        break;
                    }
                }
            }
        })
    }

    fn expiry_from(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
        now + ChronoDuration::from_std(ttl).unwrap_or(ChronoDuration::days(1))
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CounterStore for MemoryStorage {
    async fn increment_and_get(
        &self,
        key: &CounterKey,
        ttl: Duration,
    ) -> Result<u64, StorageError> {
        let now = self.clock.now();

        // entry 在返回前持有分片写锁，读改写对同一个键是原子的
        let count = match self.counters.entry(key.as_str().to_string()) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                if entry.is_expired(now) {
                    *entry = CounterEntry {
                        count: 1,
                        expires_at: Self::expiry_from(now, ttl),
                    };
                } else {
                    entry.count = entry.count.saturating_add(1);
                }
                entry.count
            }
            Entry::Vacant(vacant) => {
                vacant.insert(CounterEntry {
                    count: 1,
                    expires_at: Self::expiry_from(now, ttl),
                });
                1
            }
        };

        trace!("计数自增: key={}, count={}", key, count);
        Ok(count)
    }

    async fn peek(&self, key: &CounterKey) -> Result<Option<u64>, StorageError> {
        let now = self.clock.now();
        let value = self
            .counters
            .get(key.as_str())
            .map(|entry| (entry.is_expired(now), entry.count));

        match value {
            Some((false, count)) => Ok(Some(count)),
            Some((true, _)) => {
                self.counters
                    .remove_if(key.as_str(), |_, entry| entry.is_expired(now));
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
