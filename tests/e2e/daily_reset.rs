//! E2E测试 - 每日额度
//!
//! 匿名调用方按地址计数，已认证调用方按账户计数，都在 UTC 零点重置。

use crate::common::*;
use chrono::{TimeZone, Utc};
use std::time::Duration;
use tiergate::identity::Identity;
use tiergate::plan::Plan;
use tiergate::rejection::{Budget, Rejection};

/// 提交 `n` 次生成，每次之间跨过突发限流窗口
async fn generate_n(env: &TestGate, request: &tiergate::identity::RequestContext, n: usize) {
    for _ in 0..n {
        let admission = env.gate.admit_generation(request, None).await.unwrap();
        env.gate.commit_generation(&admission).await.unwrap();
        env.clock.advance(Duration::from_secs(61));
    }
}

#[tokio::test]
async fn test_anonymous_daily_limit_resets_at_utc_midnight() {
    let env = create_test_gate();
    let request = anonymous_request("1.2.3.4");

    generate_n(&env, &request, 10).await;

    let rejection = env.gate.admit_generation(&request, None).await.unwrap_err();
    assert_eq!(
        rejection,
        Rejection::DailyLimitReached {
            authenticated: false
        }
    );
    assert_eq!(rejection.status(), 429);
    assert_eq!(
        rejection.headers(),
        vec![("X-Daily-Remaining", "0".to_string())]
    );
    let body = rejection.body();
    assert!(!body.success);
    assert_eq!(body.budget, Budget::Daily);
    assert!(body.error.contains("10 free conversions"));

    // 同日稍晚仍被拒绝
    env.clock
        .set(Utc.with_ymd_and_hms(2026, 3, 14, 23, 59, 59).unwrap());
    assert!(env.gate.admit_generation(&request, None).await.is_err());

    // 第二天零点后恢复
    env.clock
        .set(Utc.with_ymd_and_hms(2026, 3, 15, 0, 0, 1).unwrap());
    let admission = env.gate.admit_generation(&request, None).await.unwrap();
    let daily = admission.daily.unwrap();
    assert_eq!(daily.remaining_count(), Some(10));
    assert_eq!(
        daily.reset_at,
        Some(Utc.with_ymd_and_hms(2026, 3, 16, 0, 0, 0).unwrap())
    );
}

#[tokio::test]
async fn test_authenticated_free_user_denied_on_eleventh_generation() {
    let env = create_test_gate();
    let token = env.sign_in("free-user", Plan::Free);
    let request = signed_in_request("1.2.3.4", &token);

    generate_n(&env, &request, 10).await;

    let summary = env.gate.usage_summary("free-user").await.unwrap();
    assert_eq!(summary.generations_today, 10);

    let rejection = env.gate.admit_generation(&request, None).await.unwrap_err();
    assert_eq!(
        rejection,
        Rejection::DailyLimitReached {
            authenticated: true
        }
    );
    assert!(rejection.message().contains("Upgrade to Pro"));

    // 账户计数与地址无关
    assert!(env
        .gate
        .admit_generation(&signed_in_request("5.6.7.8", &token), None)
        .await
        .is_err());
    // 同一地址的匿名请求使用独立的计数
    assert!(env
        .gate
        .admit_generation(&anonymous_request("5.6.7.8"), None)
        .await
        .is_ok());
}

#[tokio::test]
async fn test_authenticated_usage_resets_lazily() {
    let env = create_test_gate();
    let token = env.sign_in("free-user", Plan::Free);
    let request = signed_in_request("1.2.3.4", &token);

    generate_n(&env, &request, 10).await;
    assert!(env.gate.admit_generation(&request, None).await.is_err());

    env.clock
        .set(Utc.with_ymd_and_hms(2026, 3, 15, 0, 0, 1).unwrap());
    let admission = env.gate.admit_generation(&request, None).await.unwrap();
    assert_eq!(admission.daily.unwrap().remaining_count(), Some(10));

    let record = env.accounts.get("free-user").unwrap();
    assert_eq!(record.usage.generations_today, 0);
    assert_eq!(
        record.usage.reset_at,
        Utc.with_ymd_and_hms(2026, 3, 16, 0, 0, 0).unwrap()
    );
}

#[tokio::test]
async fn test_paid_plans_are_not_daily_limited() {
    let env = create_test_gate();
    let token = env.sign_in("pro-user", Plan::Pro);
    let request = signed_in_request("1.2.3.4", &token);

    generate_n(&env, &request, 25).await;

    let admission = env.gate.admit_generation(&request, None).await.unwrap();
    assert!(admission.daily.unwrap().remaining.is_unbounded());
    // 用量仍然记录，便于展示
    let summary = env.gate.usage_summary("pro-user").await.unwrap();
    assert_eq!(summary.generations_today, 25);
    assert_eq!(env.store.calls("daily"), 0);
}

#[tokio::test]
async fn test_upgrade_takes_effect_on_next_request() {
    let env = create_test_gate();
    let token = env.sign_in("upgrader", Plan::Free);
    let request = signed_in_request("1.2.3.4", &token);

    generate_n(&env, &request, 10).await;
    assert!(env.gate.admit_generation(&request, None).await.is_err());

    env.accounts.set_plan("upgrader", Plan::Pro).unwrap();
    let admission = env.gate.admit_generation(&request, Some("react")).await.unwrap();
    assert_eq!(admission.caller.plan, Plan::Pro);
}

#[tokio::test]
async fn test_framework_gate_for_free_plan() {
    let env = create_test_gate();

    let rejection = env
        .gate
        .admit_generation(&anonymous_request("1.2.3.4"), Some("vue"))
        .await
        .unwrap_err();
    assert_eq!(rejection.status(), 403);
    assert_eq!(rejection.body().budget, Budget::Framework);
    assert!(rejection.headers().is_empty());

    assert!(env
        .gate
        .admit_generation(&anonymous_request("1.2.3.4"), Some("html-tailwind"))
        .await
        .is_ok());

    // 框架拒绝不消耗每日额度
    let daily = env
        .gate
        .check_daily(&Identity::anonymous("1.2.3.4"), Plan::Free)
        .await;
    assert_eq!(daily.remaining_count(), Some(10));
}
