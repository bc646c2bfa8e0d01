//! 编辑额度追踪器
//!
//! 每个产物单独计数，键为 `edit:{subject}:{resource}`，计数自第一次编辑起保留 24 小时。

use crate::constants::EDIT_QUOTA_TTL_SECS;
use crate::error::{GateError, QuotaDecision, StorageError};
use crate::plan::{thresholds, Plan};
use crate::storage::{CounterKey, CounterStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

pub struct EditQuotaTracker {
    store: Arc<dyn CounterStore>,
    ttl: Duration,
}

impl EditQuotaTracker {
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self {
            store,
            ttl: Duration::from_secs(EDIT_QUOTA_TTL_SECS),
        }
    }

    /// 检查剩余编辑次数（不计数）
    pub async fn check(
        &self,
        subject_key: &str,
        resource_id: &str,
        plan: Plan,
    ) -> Result<QuotaDecision, StorageError> {
        let limit = thresholds(plan).edit_limit_per_resource;
        if limit.is_unbounded() {
            return Ok(QuotaDecision::unbounded());
        }

        let key = CounterKey::edit(subject_key, resource_id);
        let used = self.store.peek(&key).await?.unwrap_or(0);
        if limit.admits(used) {
            trace!("编辑额度: key={}, used={}", key, used);
            Ok(QuotaDecision::allow(limit.remaining_after(used)))
        } else {
            debug!("编辑额度用尽: resource={}", resource_id);
            Ok(QuotaDecision::deny())
        }
    }

    /// 记录一次成功的编辑
    pub async fn increment(&self, subject_key: &str, resource_id: &str) -> Result<u64, GateError> {
        let key = CounterKey::edit(subject_key, resource_id);
        Ok(self.store.increment_and_get(&key, self.ttl).await?)
    }
}
