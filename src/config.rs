//! 配置模块
//!
//! 运行时配置：计数存储后端、Redis连接、降级策略与清理周期。
//! 套餐阈值是编译期常量，不在这里配置。
//!
//! 配置按文件扩展名从 TOML 或 YAML 加载，再由环境变量覆盖。

use crate::constants::{
    DEFAULT_REDIS_CONNECT_TIMEOUT_MS, DEFAULT_REDIS_MAX_RETRIES, DEFAULT_REDIS_RETRY_BACKOFF_MS,
    DEFAULT_STORE_TIMEOUT_MS, DEFAULT_SWEEP_INTERVAL_SECS, ENV_FALLBACK, ENV_REDIS_PASSWORD,
    ENV_REDIS_URL, ENV_STORAGE,
};
use crate::error::GateError;
use crate::fallback::FallbackStrategy;
use secrecy::Secret;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

/// 计数存储后端
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// 进程内存储（单实例）
    #[default]
    Memory,
    /// Redis存储（多实例共享）
    Redis,
}

impl StorageBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageBackend::Memory => "memory",
            StorageBackend::Redis => "redis",
        }
    }
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageBackend {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" => Ok(StorageBackend::Memory),
            "redis" => Ok(StorageBackend::Redis),
            other => Err(GateError::ConfigError(format!(
                "无效的存储类型: {}, 有效值: [\"memory\", \"redis\"]",
                other
            ))),
        }
    }
}

/// 网关配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// 计数存储后端
    pub storage: StorageBackend,
    /// Redis配置（仅 `storage = "redis"` 时使用）
    pub redis: RedisConfig,
    /// 存储不可用时的降级策略
    pub fallback: FallbackStrategy,
    /// 内存存储清理周期（秒）
    pub sweep_interval_secs: u64,
    /// 会话解析与账户存储单次调用的超时（毫秒）
    pub backend_timeout_ms: u64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            storage: StorageBackend::default(),
            redis: RedisConfig::default(),
            fallback: FallbackStrategy::default(),
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            backend_timeout_ms: DEFAULT_STORE_TIMEOUT_MS,
        }
    }
}

impl GateConfig {
    /// 从文件加载配置（按扩展名选择 TOML 或 YAML）
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, GateError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();

        let config = match extension.as_str() {
            "toml" => Self::from_toml_str(&content)?,
            "yaml" | "yml" => Self::from_yaml_str(&content)?,
            other => {
                return Err(GateError::ConfigError(format!(
                    "不支持的配置文件格式: {:?}",
                    other
                )))
            }
        };

        info!("加载配置文件: {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, GateError> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, GateError> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// 使用进程环境变量覆盖配置
    pub fn apply_env(&mut self) -> Result<(), GateError> {
        self.apply_env_from(|name| std::env::var(name).ok())
    }

    /// 使用指定的变量来源覆盖配置
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), GateError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(value) = lookup(ENV_STORAGE) {
            self.storage = value.parse()?;
            debug!("环境变量覆盖: {}={}", ENV_STORAGE, self.storage);
        }
        if let Some(value) = lookup(ENV_REDIS_URL) {
            debug!("环境变量覆盖: {}={}", ENV_REDIS_URL, redact_url(&value));
            self.redis.url = value;
        }
        if let Some(value) = lookup(ENV_REDIS_PASSWORD) {
            debug!("环境变量覆盖: {}=***", ENV_REDIS_PASSWORD);
            self.redis.password = Some(Secret::new(value));
        }
        if let Some(value) = lookup(ENV_FALLBACK) {
            self.fallback = value.parse()?;
            debug!("环境变量覆盖: {}={}", ENV_FALLBACK, self.fallback);
        }
        Ok(())
    }

    /// 校验配置
    pub fn validate(&self) -> Result<(), GateError> {
        if self.sweep_interval_secs == 0 {
            return Err(GateError::ConfigError("清理周期必须大于0".to_string()));
        }
        if self.backend_timeout_ms == 0 {
            return Err(GateError::ConfigError("后端调用超时必须大于0".to_string()));
        }
        if self.storage == StorageBackend::Redis {
            self.redis.validate()?;
        }
        Ok(())
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn backend_timeout(&self) -> Duration {
        Duration::from_millis(self.backend_timeout_ms)
    }
}

/// Redis配置
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    /// Redis连接URL
    pub url: String,
    /// 数据库索引
    pub db: i64,
    /// 密码（使用 Secret 包装以防止意外泄露）
    #[serde(skip_serializing)]
    pub password: Option<Secret<String>>,
    /// 键前缀，多个服务共用一个Redis时区分命名空间
    pub key_prefix: String,
    /// 连接超时
    #[serde(rename = "connection_timeout_ms", with = "duration_ms")]
    pub connection_timeout: Duration,
    /// 单次调用超时
    #[serde(rename = "io_timeout_ms", with = "duration_ms")]
    pub io_timeout: Duration,
    /// 只读操作的最大重试次数
    pub max_retries: u32,
    /// 重试初始退避时间
    #[serde(rename = "retry_initial_backoff_ms", with = "duration_ms")]
    pub retry_initial_backoff: Duration,
}

impl std::fmt::Debug for RedisConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisConfig")
            .field("url", &redact_url(&self.url))
            .field("db", &self.db)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("key_prefix", &self.key_prefix)
            .field("connection_timeout", &self.connection_timeout)
            .field("io_timeout", &self.io_timeout)
            .field("max_retries", &self.max_retries)
            .field("retry_initial_backoff", &self.retry_initial_backoff)
            .finish()
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            db: 0,
            password: None,
            key_prefix: "tiergate".to_string(),
            connection_timeout: Duration::from_millis(DEFAULT_REDIS_CONNECT_TIMEOUT_MS),
            io_timeout: Duration::from_millis(DEFAULT_STORE_TIMEOUT_MS),
            max_retries: DEFAULT_REDIS_MAX_RETRIES,
            retry_initial_backoff: Duration::from_millis(DEFAULT_REDIS_RETRY_BACKOFF_MS),
        }
    }
}

impl RedisConfig {
    /// 创建新的Redis配置
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// 设置数据库索引
    pub fn db(mut self, db: i64) -> Self {
        self.db = db;
        self
    }

    /// 设置密码
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(Secret::new(password.into()));
        self
    }

    /// 设置键前缀
    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// 设置连接超时
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// 设置单次调用超时
    pub fn io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    /// 设置最大重试次数
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// 设置重试初始退避时间
    pub fn retry_initial_backoff(mut self, backoff: Duration) -> Self {
        self.retry_initial_backoff = backoff;
        self
    }

    /// 校验配置
    pub fn validate(&self) -> Result<(), GateError> {
        if self.url.trim().is_empty() {
            return Err(GateError::ConfigError("Redis URL不能为空".to_string()));
        }
        if self.io_timeout.is_zero() || self.connection_timeout.is_zero() {
            return Err(GateError::ConfigError("Redis超时时间必须大于0".to_string()));
        }
        Ok(())
    }
}

/// 去掉URL中的认证信息
pub(crate) fn redact_url(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at_pos)) if at_pos > scheme_end => {
            format!("{}***{}", &url[..scheme_end + 3], &url[at_pos..])
        }
        _ => url.to_string(),
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
