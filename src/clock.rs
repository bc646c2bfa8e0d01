//! 时钟抽象
//!
//! 窗口过期与UTC零点重置都依赖当前时间，测试中用 [`ManualClock`] 替换。

use chrono::{DateTime, Duration as ChronoDuration, NaiveTime, TimeZone, Utc};
use parking_lot::RwLock;
use std::time::Duration;

/// 时钟接口
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// 当前UTC时间
    fn now(&self) -> DateTime<Utc>;
}

/// 系统时钟
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// 手动时钟，只在调用 `advance`/`set` 时前进
#[derive(Debug)]
pub struct ManualClock {
    now: RwLock<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: RwLock::new(start),
        }
    }

    /// 时钟前进指定时长
    pub fn advance(&self, by: Duration) {
        let delta = ChronoDuration::from_std(by).unwrap_or(ChronoDuration::zero());
        let mut now = self.now.write();
        *now += delta;
    }

    /// 直接设置当前时间
    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.write() = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read()
    }
}

/// 下一个UTC零点
pub fn next_utc_midnight(now: DateTime<Utc>) -> DateTime<Utc> {
    let tomorrow = now.date_naive().succ_opt().unwrap_or(now.date_naive());
    Utc.from_utc_datetime(&tomorrow.and_time(NaiveTime::MIN))
}

/// 距下一个UTC零点的时长（至少1秒）
pub fn until_next_utc_midnight(now: DateTime<Utc>) -> Duration {
    (next_utc_midnight(now) - now)
        .to_std()
        .unwrap_or(Duration::ZERO)
        .max(Duration::from_secs(1))
}
