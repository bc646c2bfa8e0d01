//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! Daily Quota Tracker
//!
//! Calendar-day generation budget. Anonymous callers are counted in the
//! counter store under `daily:{addr}`, expiring at the next UTC midnight.
//! Authenticated callers are counted in their account record, which is
//! reset lazily on the first read after `reset_at`.
//!
//! Every account store call is bounded by the tracker's timeout; an expired
//! call surfaces as [`StorageError::TimeoutError`].

use crate::account::{with_deadline, AccountStore};
use crate::clock::{next_utc_midnight, until_next_utc_midnight, Clock};
use crate::constants::DEFAULT_STORE_TIMEOUT_MS;
use crate::error::{GateError, QuotaDecision, StorageError};
use crate::identity::Identity;
use crate::log_redaction::{redact_ip, redact_user_id};
use crate::plan::{thresholds, Plan};
use crate::storage::{CounterKey, CounterStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Daily generation budget tracker.
pub struct DailyQuotaTracker {
    store: Arc<dyn CounterStore>,
    accounts: Arc<dyn AccountStore>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
}

impl DailyQuotaTracker {
    pub fn new(
        store: Arc<dyn CounterStore>,
        accounts: Arc<dyn AccountStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            accounts,
            clock,
            timeout: Duration::from_millis(DEFAULT_STORE_TIMEOUT_MS),
        }
    }

    /// Bounds each account store call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Checks the budget without consuming it.
    ///
    /// An unbounded limit allows without touching any storage. A missing
    /// account record on the authenticated path is a deny.
    pub async fn check(
        &self,
        identity: &Identity,
        plan: Plan,
    ) -> Result<QuotaDecision, StorageError> {
        let limit = thresholds(plan).daily_limit;
        if limit.is_unbounded() {
            return Ok(QuotaDecision::unbounded());
        }

        let now = self.clock.now();
        let (used, reset_at) = match identity.user_id() {
            None => {
                let used = self
                    .store
                    .peek(&CounterKey::daily(&identity.subject_key))
                    .await?
                    .unwrap_or(0);
                (used, next_utc_midnight(now))
            }
            Some(user_id) => {
                let usage = with_deadline(
                    self.timeout,
                    "daily_usage",
                    self.accounts.daily_usage(user_id),
                )
                .await?;
                let Some(usage) = usage else {
                    info!(
                        "{}",
                        GateError::AccountRecordMissing(redact_user_id(Some(user_id)))
                    );
                    return Ok(QuotaDecision::deny());
                };

                if usage.is_stale(now) {
                    let next_reset = next_utc_midnight(now);
                    with_deadline(
                        self.timeout,
                        "reset_daily_usage",
                        self.accounts.reset_daily_usage(user_id, next_reset),
                    )
                    .await?;
                    debug!(
                        "每日用量已重置: user={}, next_reset={}",
                        redact_user_id(Some(user_id)),
                        next_reset
                    );
                    (0, next_reset)
                } else {
                    (usage.generations_today, usage.reset_at)
                }
            }
        };

        let decision = if limit.admits(used) {
            QuotaDecision::allow(limit.remaining_after(used))
        } else {
            debug!(
                "每日额度用尽: subject={}, used={}",
                self.redact_subject(identity),
                used
            );
            QuotaDecision::deny()
        };
        Ok(decision.with_reset_at(reset_at))
    }

    /// Records one successful generation.
    pub async fn increment(&self, identity: &Identity) -> Result<(), GateError> {
        match identity.user_id() {
            None => {
                let ttl = until_next_utc_midnight(self.clock.now());
                let count = self
                    .store
                    .increment_and_get(&CounterKey::daily(&identity.subject_key), ttl)
                    .await?;
                debug!(
                    "匿名每日用量: subject={}, count={}",
                    self.redact_subject(identity),
                    count
                );
            }
            Some(user_id) => match with_deadline(
                self.timeout,
                "increment_daily_usage",
                self.accounts.increment_daily_usage(user_id),
            )
            .await
            {
                Ok(count) => {
                    debug!(
                        "账户每日用量: user={}, count={}",
                        redact_user_id(Some(user_id)),
                        count
                    );
                }
                Err(StorageError::NotFound(_)) => {
                    return Err(GateError::AccountRecordMissing(redact_user_id(Some(
                        user_id,
                    ))));
                }
                Err(e) => return Err(e.into()),
            },
        }
        Ok(())
    }

    fn redact_subject(&self, identity: &Identity) -> String {
        if identity.authenticated {
            redact_user_id(Some(&identity.subject_key))
        } else {
            redact_ip(Some(&identity.subject_key))
        }
    }
}
