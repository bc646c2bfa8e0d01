//! 日志初始化
//!
//! 库本身只通过 `tracing` 宏输出事件；可执行程序或宿主服务调用
//! [`init_tracing`] 安装 fmt 订阅者。

use tracing::info;
use tracing_subscriber::EnvFilter;

/// 默认过滤规则
pub const DEFAULT_FILTER: &str = "info";

/// 构造过滤器
///
/// 优先使用 `RUST_LOG`，否则使用 `fallback`。
pub fn env_filter(fallback: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback))
}

/// 安装全局 fmt 订阅者
///
/// 已安装过订阅者时返回 `false`，不会 panic。
pub fn init_tracing(fallback: &str) -> bool {
    let installed = tracing_subscriber::fmt()
        .with_env_filter(env_filter(fallback))
        .with_target(true)
        .try_init()
        .is_ok();

    if installed {
        info!("tracing 已初始化");
    }
    installed
}
