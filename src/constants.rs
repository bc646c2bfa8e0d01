//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! Centralized configuration constants for TierGate.
//!
//! Per-plan thresholds are compile-time constants and are not read from
//! runtime configuration.

// ============================================================================
// Burst Rate Limit
// ============================================================================

/// Fixed window length for the burst limiter (60 seconds).
pub const RATE_LIMIT_WINDOW_SECS: u64 = 60;

/// Requests admitted per client address within one window.
///
/// Applies to every plan.
pub const RATE_LIMIT_MAX_REQUESTS: u64 = 10;

/// Value of the `Retry-After` header on a burst rejection.
pub const RATE_LIMIT_RETRY_AFTER_SECS: u64 = RATE_LIMIT_WINDOW_SECS;

// ============================================================================
// Plan Thresholds
// ============================================================================

/// Daily generations for the free plan.
pub const FREE_DAILY_LIMIT: u64 = 10;

/// Edits per generated artifact for the free plan.
pub const FREE_EDIT_LIMIT_PER_RESOURCE: u64 = 3;

/// Frameworks available without a paid plan.
pub const FREE_FRAMEWORKS: &[&str] = &["html-tailwind"];

/// Lifetime of an artifact's edit counter, measured from the first edit (24 hours).
pub const EDIT_QUOTA_TTL_SECS: u64 = 86_400;

// ============================================================================
// Counter Keys
// ============================================================================

/// Namespace for burst counters.
pub const RATE_KEY_PREFIX: &str = "rate";

/// Namespace for anonymous daily counters.
pub const DAILY_KEY_PREFIX: &str = "daily";

/// Namespace for per-artifact edit counters.
pub const EDIT_KEY_PREFIX: &str = "edit";

/// Maximum length of a single key component.
pub const MAX_KEY_COMPONENT_LENGTH: usize = 255;

/// Subject key used when no client address could be extracted.
pub const UNKNOWN_SUBJECT: &str = "unknown";

// ============================================================================
// Storage
// ============================================================================

/// Default interval between sweeps of the memory store (60 seconds).
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

/// Default bound on a single counter store round-trip (250 milliseconds).
pub const DEFAULT_STORE_TIMEOUT_MS: u64 = 250;

/// Default Redis connection timeout (2 seconds).
pub const DEFAULT_REDIS_CONNECT_TIMEOUT_MS: u64 = 2_000;

/// Default number of retries for idempotent Redis reads.
pub const DEFAULT_REDIS_MAX_RETRIES: u32 = 2;

/// Initial backoff between Redis read retries (20 milliseconds).
pub const DEFAULT_REDIS_RETRY_BACKOFF_MS: u64 = 20;

// ============================================================================
// Environment
// ============================================================================

/// Selects the counter backend (`memory` or `redis`).
pub const ENV_STORAGE: &str = "TIERGATE_STORAGE";

/// Redis endpoint URL.
pub const ENV_REDIS_URL: &str = "TIERGATE_REDIS_URL";

/// Redis password.
pub const ENV_REDIS_PASSWORD: &str = "TIERGATE_REDIS_PASSWORD";

/// Store-unavailable policy (`fail_open` or `fail_closed`).
pub const ENV_FALLBACK: &str = "TIERGATE_FALLBACK";
