//! 额度追踪器集成测试
//!
//! 三个追踪器共享同一个计数存储

use crate::common::*;
use chrono::{TimeZone, Utc};
use std::sync::Arc;
use std::time::Duration;
use tiergate::{
    account::MemoryAccountStore,
    error::GateError,
    identity::Identity,
    limiters::{DailyQuotaTracker, EditQuotaTracker, RateLimiter},
    plan::{Limit, Plan},
};

/// 测试自定义窗口的限流器
#[tokio::test]
async fn test_custom_rate_limiter_in_gatekeeper() {
    let clock = create_manual_clock();
    let store = Arc::new(CountingStore::new(clock.clone()));
    let limiter = RateLimiter::with_limits(store.clone(), Duration::from_secs(10), 2).unwrap();
    let gate = tiergate::Gatekeeper::builder(store.clone())
        .clock(clock.clone())
        .rate_limiter(limiter)
        .build();

    let request = anonymous_request("1.2.3.4");
    assert_eq!(
        gate.admit_generation(&request, None)
            .await
            .unwrap()
            .rate_remaining(),
        1
    );
    gate.admit_generation(&request, None).await.unwrap();
    assert!(gate.admit_generation(&request, None).await.is_err());

    clock.advance(Duration::from_secs(10));
    assert!(gate.admit_generation(&request, None).await.is_ok());
}

/// 测试零窗口配置被拒绝
#[test]
fn test_rate_limiter_rejects_zero_values() {
    let store = Arc::new(CountingStore::new(create_manual_clock()));
    assert!(matches!(
        RateLimiter::with_limits(store.clone(), Duration::ZERO, 10),
        Err(GateError::ConfigError(_))
    ));
    assert!(matches!(
        RateLimiter::with_limits(store, Duration::from_secs(60), 0),
        Err(GateError::ConfigError(_))
    ));
}

/// 测试匿名每日计数的过期时间为下一个 UTC 零点
#[tokio::test]
async fn test_daily_counter_expires_at_midnight() {
    let clock = create_manual_clock();
    clock.set(Utc.with_ymd_and_hms(2026, 3, 14, 23, 59, 0).unwrap());
    let store = Arc::new(CountingStore::new(clock.clone()));
    let accounts = Arc::new(MemoryAccountStore::with_clock(clock.clone()));
    let tracker = DailyQuotaTracker::new(store.clone(), accounts, clock.clone());
    let identity = Identity::anonymous("1.2.3.4");

    tracker.increment(&identity).await.unwrap();
    let decision = tracker.check(&identity, Plan::Free).await.unwrap();
    assert_eq!(decision.remaining_count(), Some(9));
    assert_eq!(
        decision.reset_at,
        Some(Utc.with_ymd_and_hms(2026, 3, 15, 0, 0, 0).unwrap())
    );

    clock.advance(Duration::from_secs(60));
    let decision = tracker.check(&identity, Plan::Free).await.unwrap();
    assert_eq!(decision.remaining_count(), Some(10));
}

/// 测试已认证用户的每日计数不使用计数存储
#[tokio::test]
async fn test_authenticated_daily_uses_account_store() {
    let clock = create_manual_clock();
    let store = Arc::new(CountingStore::new(clock.clone()));
    let accounts = Arc::new(MemoryAccountStore::with_clock(clock.clone()));
    accounts.create_account("u1", Plan::Free);
    let tracker = DailyQuotaTracker::new(store.clone(), accounts.clone(), clock);
    let identity = Identity::authenticated("u1", "1.2.3.4");

    for _ in 0..4 {
        tracker.increment(&identity).await.unwrap();
    }
    let decision = tracker.check(&identity, Plan::Free).await.unwrap();

    assert_eq!(decision.remaining, Limit::Bounded(6));
    assert_eq!(accounts.get("u1").unwrap().usage.generations_today, 4);
    assert_eq!(store.calls("daily"), 0);
}

/// 测试编辑额度按主体隔离
#[tokio::test]
async fn test_edit_quota_isolated_by_subject() {
    let store = Arc::new(CountingStore::new(create_manual_clock()));
    let tracker = EditQuotaTracker::new(store.clone());

    for _ in 0..3 {
        tracker.increment("user-a", "shared-res").await.unwrap();
    }
    assert!(!tracker.check("user-a", "shared-res", Plan::Free).await.unwrap().allowed);
    assert!(tracker.check("user-b", "shared-res", Plan::Free).await.unwrap().allowed);
}

/// 测试付费套餐的编辑检查不访问存储
#[tokio::test]
async fn test_unbounded_edit_check_skips_store() {
    let store = Arc::new(CountingStore::new(create_manual_clock()));
    let tracker = EditQuotaTracker::new(store.clone());

    for plan in [Plan::Pro, Plan::Team] {
        let decision = tracker.check("user-a", "res", plan).await.unwrap();
        assert!(decision.allowed);
        assert!(decision.remaining.is_unbounded());
    }
    assert_eq!(store.calls("edit"), 0);
}
