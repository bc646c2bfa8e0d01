//! 身份解析集成测试

use crate::common::*;
use std::sync::Arc;
use tiergate::{
    account::MemoryAccountStore,
    identity::{IdentityResolver, IpExtractor, RequestContext},
    plan::Plan,
};

fn resolver() -> (Arc<StaticSessionResolver>, Arc<MemoryAccountStore>, IdentityResolver) {
    let sessions = Arc::new(StaticSessionResolver::new());
    let accounts = Arc::new(MemoryAccountStore::with_clock(create_manual_clock()));
    let resolver = IdentityResolver::new(sessions.clone(), accounts.clone());
    (sessions, accounts, resolver)
}

/// 测试已认证调用方的套餐与阈值
#[tokio::test]
async fn test_authenticated_caller_thresholds() {
    let (sessions, accounts, resolver) = resolver();
    accounts.create_account("team-user", Plan::Team);
    sessions.register("tok", "team-user");

    let caller = resolver
        .resolve(&signed_in_request("1.2.3.4", "tok"))
        .await;
    assert_eq!(caller.identity.subject_key, "team-user");
    assert_eq!(caller.identity.client_addr, "1.2.3.4");
    assert_eq!(caller.plan, Plan::Team);
    assert!(caller.thresholds.daily_limit.is_unbounded());
    assert!(caller.thresholds.all_frameworks);
    assert!(!caller.thresholds.watermark);
}

/// 测试套餐字段缺失时按免费套餐处理
#[tokio::test]
async fn test_missing_plan_defaults_to_free() {
    let (sessions, accounts, resolver) = resolver();
    let mut record = accounts.create_account("legacy", Plan::Pro);
    record.plan = None;
    accounts.insert(record);
    sessions.register("tok", "legacy");

    let caller = resolver
        .resolve(&signed_in_request("1.2.3.4", "tok"))
        .await;
    assert!(caller.identity.authenticated);
    assert_eq!(caller.plan, Plan::Free);
}

/// 测试失效令牌按匿名处理
#[tokio::test]
async fn test_revoked_token_is_anonymous() {
    let (sessions, accounts, resolver) = resolver();
    accounts.create_account("u1", Plan::Pro);
    sessions.register("tok", "u1");
    sessions.revoke("tok");

    let caller = resolver
        .resolve(&signed_in_request("1.2.3.4", "tok"))
        .await;
    assert!(!caller.identity.authenticated);
    assert_eq!(caller.identity.subject_key, "1.2.3.4");
    assert_eq!(caller.plan, Plan::Free);
}

/// 测试自定义地址头
#[tokio::test]
async fn test_custom_ip_extractor() {
    let (_, _, resolver) = resolver();
    let resolver = resolver.with_ip_extractor(IpExtractor::new(vec![
        "CF-Connecting-IP".to_string(),
        "X-Real-IP".to_string(),
    ]));

    let request = RequestContext::new()
        .with_header("cf-connecting-ip", "[2001:db8::1]:443")
        .with_header("x-real-ip", "10.0.0.1");
    let caller = resolver.resolve(&request).await;
    assert_eq!(caller.identity.client_addr, "2001:db8::1");
}

/// 测试缺少地址时主体为 unknown
#[tokio::test]
async fn test_unknown_address_shares_one_bucket() {
    let env = create_test_gate();
    let request = RequestContext::new().with_header("x-forwarded-for", "garbage, 10.0.0.9");

    let caller = env.gate.resolve_identity(&request).await;
    assert_eq!(caller.identity.client_addr, "unknown");
    assert_eq!(caller.identity.subject_key, "unknown");

    for _ in 0..10 {
        env.gate
            .admit_generation(&RequestContext::new(), None)
            .await
            .unwrap();
    }
    assert!(env.gate.admit_generation(&request, None).await.is_err());
}

/// 测试无法解析的 x-real-ip 不会退回到 x-forwarded-for
#[tokio::test]
async fn test_unparsable_real_ip_does_not_fall_through() {
    let (_, _, resolver) = resolver();
    let request = RequestContext::new()
        .with_header("x-real-ip", "spoofed")
        .with_header("x-forwarded-for", "10.0.0.9");

    let caller = resolver.resolve(&request).await;
    assert_eq!(caller.identity.client_addr, "unknown");
}
