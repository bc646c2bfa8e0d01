//! E2E测试 - 突发限流
//!
//! 同一地址一分钟内的第11个请求被拒绝，窗口过去后恢复。

use crate::common::*;
use std::time::Duration;
use tiergate::rejection::Rejection;

#[tokio::test]
async fn test_eleventh_request_in_window_is_rejected() {
    let env = create_test_gate();
    let request = anonymous_request("1.2.3.4");

    for expected in (0..10).rev() {
        let admission = env.gate.admit_generation(&request, None).await.unwrap();
        assert_eq!(admission.rate_remaining(), expected);
        assert_eq!(
            admission.headers(),
            vec![("X-RateLimit-Remaining", expected.to_string())]
        );
    }

    let rejection = env.gate.admit_generation(&request, None).await.unwrap_err();
    assert_eq!(rejection, Rejection::RateLimited);
    assert_eq!(rejection.status(), 429);
    let headers = rejection.headers();
    assert!(headers.contains(&("Retry-After", "60".to_string())));
    assert!(headers.contains(&("X-RateLimit-Remaining", "0".to_string())));

    // 窗口结束后重新计数
    env.clock.advance(Duration::from_secs(60));
    let admission = env.gate.admit_generation(&request, None).await.unwrap();
    assert_eq!(admission.rate_remaining(), 9);
}

#[tokio::test]
async fn test_burst_limit_is_per_address() {
    let env = create_test_gate();

    for _ in 0..10 {
        env.gate
            .admit_generation(&anonymous_request("1.2.3.4"), None)
            .await
            .unwrap();
    }
    assert!(env
        .gate
        .admit_generation(&anonymous_request("1.2.3.4"), None)
        .await
        .is_err());

    let admission = env
        .gate
        .admit_generation(&anonymous_request("5.6.7.8"), None)
        .await
        .unwrap();
    assert_eq!(admission.rate_remaining(), 9);
}

#[tokio::test]
async fn test_burst_limit_applies_to_paid_plans() {
    let env = create_test_gate();
    let token = env.sign_in("team-user", tiergate::plan::Plan::Team);
    let request = signed_in_request("9.9.9.9", &token);

    for _ in 0..10 {
        let admission = env.gate.admit_generation(&request, None).await.unwrap();
        env.gate.commit_generation(&admission).await.unwrap();
    }
    assert_eq!(
        env.gate.admit_generation(&request, None).await.unwrap_err(),
        Rejection::RateLimited
    );
}

#[tokio::test]
async fn test_rate_limited_request_is_checked_before_daily_quota() {
    let env = create_test_gate();
    let request = anonymous_request("1.2.3.4");

    for _ in 0..10 {
        env.gate.admit_generation(&request, None).await.unwrap();
    }
    let daily_peeks = env.store.peeks("daily");

    assert!(env.gate.admit_generation(&request, None).await.is_err());
    // 突发限流拒绝后不再查询每日额度
    assert_eq!(env.store.peeks("daily"), daily_peeks);
}

#[tokio::test]
async fn test_forwarded_for_uses_leftmost_client() {
    let env = create_test_gate();
    let request = tiergate::identity::RequestContext::new()
        .with_header("X-Forwarded-For", "1.2.3.4, 10.0.0.1, 10.0.0.2");

    for _ in 0..10 {
        env.gate.admit_generation(&request, None).await.unwrap();
    }
    // 同一客户端换用 X-Real-IP 仍然命中同一个计数
    assert!(env
        .gate
        .admit_generation(&anonymous_request("1.2.3.4"), None)
        .await
        .is_err());
}
