//! Prelude module - Commonly used types for quick imports
//!
//! This module re-exports the most commonly used types from TierGate,
//! allowing users to import them with a single `use tiergate::prelude::*;`
//! statement instead of importing each type individually.

// Core types - always available
pub use crate::config::GateConfig;
pub use crate::error::{GateError, QuotaDecision};
pub use crate::governor::{Admission, Gatekeeper};
pub use crate::rejection::Rejection;

// Identity
pub use crate::identity::{CallerContext, Identity, RequestContext, SessionResolver};
pub use crate::plan::{Limit, Plan};

// Storage
pub use crate::account::{AccountStore, MemoryAccountStore};
pub use crate::fallback::FallbackStrategy;
pub use crate::storage::{CounterStore, MemoryStorage};

// Feature-gated exports
#[cfg(feature = "redis")]
pub use crate::redis_storage::RedisStorage;
