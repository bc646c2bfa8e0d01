//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! TierGate - Plan-aware request gatekeeping
//!
//! Decides, per incoming call to a pay-walled generation API, whether the
//! caller may proceed. Three independent budgets are stacked, each scaled by
//! the caller's subscription plan:
//!
//! - **Burst rate**: 10 requests per 60 second fixed window, per client address
//! - **Daily quota**: generations per UTC calendar day
//! - **Edit quota**: edits per generated artifact
//!
//! # API Layers
//!
//! ## Prelude (Quick Start)
//!
//! Use `use tiergate::prelude::*;` to import all commonly used types.
//!
//! ## Core API
//!
//! - [`Gatekeeper`] - Composes identity resolution and the three trackers
//! - [`GateConfig`] - Storage backend, Redis connection and fallback policy
//! - [`QuotaDecision`] - Allow/deny result with remaining budget
//! - [`Rejection`] - HTTP status, headers and body for a denied request
//! - [`GateError`] - Error types
//!
//! ## Storage
//!
//! [`CounterStore`] with an in-process [`MemoryStorage`] and, behind the
//! `redis` feature, a shared `RedisStorage`.
//!
//! # Examples
//!
//! ```rust
//! use tiergate::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let gate = Gatekeeper::builder(Arc::new(MemoryStorage::new())).build();
//!
//!     let request = RequestContext::new().with_header("X-Real-IP", "1.2.3.4");
//!     let admission = gate.admit_generation(&request, None).await.unwrap();
//!     assert_eq!(admission.rate_remaining(), 9);
//!
//!     // 业务动作成功后再计数
//!     gate.commit_generation(&admission).await.unwrap();
//! }
//! ```
//!
//! # Features
//!
//! - `memory` (default): in-process counter store
//! - `redis`: shared counter store with server-side atomic increments
//! - `telemetry`: `tracing-subscriber` initialisation helper

pub mod prelude;

pub mod account;
pub mod clock;
pub mod config;
pub mod constants;
pub mod error;
pub mod factory;
pub mod fallback;
pub mod governor;
pub mod identity;
pub mod limiters;
pub mod log_redaction;
pub mod plan;
#[cfg(feature = "redis")]
pub mod redis_storage;
pub mod rejection;
pub mod storage;
#[cfg(feature = "telemetry")]
pub mod telemetry;

// 重新导出常用类型
pub use account::{AccountRecord, AccountStore, DailyUsage, MemoryAccountStore};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{GateConfig, RedisConfig, StorageBackend};
pub use error::{GateError, QuotaDecision, StorageError};
pub use factory::StoreFactory;
pub use fallback::{FallbackManager, FallbackStrategy, QuotaComponent};
pub use governor::{Admission, Gatekeeper, GatekeeperBuilder, UsageSummary};
pub use identity::{
    AnonymousOnly, CallerContext, Identity, IdentityResolver, IpExtractor, RequestContext,
    SessionResolver,
};
pub use limiters::{DailyQuotaTracker, EditQuotaTracker, RateLimiter};
pub use plan::{can_use_framework, thresholds, Limit, Plan, Thresholds};
#[cfg(feature = "redis")]
pub use redis_storage::{RedisStorage, RetryStats};
pub use rejection::{Budget, Rejection, RejectionBody};
pub use storage::{CounterKey, CounterStore, MemoryStorage};
#[cfg(feature = "telemetry")]
pub use telemetry::init_tracing;
