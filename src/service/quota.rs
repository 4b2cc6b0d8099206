//! Usage quota enforcement.
//!
//! `QuotaStore` is the collaborator that owns usage counters; `QuotaGate` is
//! the engine-side check made once per initiating run before any chargeable
//! work. `InMemoryQuotaStore` keeps counters per user and usage type with
//! lazy monthly rollover.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Months, NaiveTime, Utc};
use dashmap::DashMap;

use crate::config::PlanLimits;
use crate::domain::models::{PlanTier, QuotaCheckResult, UsageType};
use crate::error::AnalysisError;

/// Storage-side quota operations.
#[async_trait]
pub trait QuotaStore: Send + Sync {
    /// Report whether `user_id` may consume one more unit of `usage`.
    async fn check_usage_limit(&self, user_id: &str, usage: UsageType)
        -> Result<QuotaCheckResult>;

    /// Record `amount` units. Returns whether the usage was recorded.
    async fn increment_usage(&self, user_id: &str, usage: UsageType, amount: u32) -> Result<bool>;

    /// Check and consume as one operation.
    ///
    /// The default runs the two calls back to back, which lets concurrent
    /// callers near the limit both pass the check. Stores that can do the
    /// check and the increment atomically should override it.
    async fn reserve(
        &self,
        user_id: &str,
        usage: UsageType,
        amount: u32,
    ) -> Result<QuotaCheckResult> {
        let check = self.check_usage_limit(user_id, usage).await?;
        if !check.allowed {
            return Ok(check);
        }
        anyhow::ensure!(
            self.increment_usage(user_id, usage, amount).await?,
            "usage increment for {} was not recorded",
            user_id
        );
        Ok(QuotaCheckResult {
            remaining_quota: check.remaining_quota.map(|r| r.saturating_sub(amount)),
            ..check
        })
    }
}

// ============================================================================
// GATE
// ============================================================================

#[derive(Clone)]
pub struct QuotaGate {
    store: Arc<dyn QuotaStore>,
}

impl QuotaGate {
    pub fn new(store: Arc<dyn QuotaStore>) -> Self {
        Self { store }
    }

    /// Admit one unit of `usage` for `user_id`, or fail with `QuotaExceeded`.
    pub async fn check_and_reserve(
        &self,
        user_id: &str,
        usage: UsageType,
    ) -> crate::error::Result<QuotaCheckResult> {
        let result = self
            .store
            .reserve(user_id, usage, 1)
            .await
            .map_err(|e| AnalysisError::QuotaUnavailable(format!("{:#}", e)))?;

        if !result.allowed {
            let reason = result
                .reason
                .clone()
                .unwrap_or_else(|| format!("{} limit reached", usage.as_str()));
            tracing::warn!("Quota denied for user {}: {}", user_id, reason);
            return Err(AnalysisError::quota_exceeded(reason, result.reset_date));
        }

        tracing::debug!(
            "Reserved 1 {} unit for user {} (remaining: {:?})",
            usage.as_str(),
            user_id,
            result.remaining_quota
        );
        Ok(result)
    }
}

// ============================================================================
// IN-MEMORY STORE
// ============================================================================

/// Source of "now" for period bookkeeping.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Debug, Clone)]
struct UsageRecord {
    used: u32,
    period_end: DateTime<Utc>,
}

impl UsageRecord {
    fn starting(now: DateTime<Utc>) -> Self {
        Self {
            used: 0,
            period_end: month_bounds(now).1,
        }
    }

    fn roll_over(&mut self, now: DateTime<Utc>) {
        if now >= self.period_end {
            tracing::info!("Usage period ended {}, resetting counters", self.period_end);
            self.used = 0;
            self.period_end = month_bounds(now).1;
        }
    }

    fn evaluate(&self, plan: PlanTier, usage: UsageType, limit: Option<u32>, amount: u32) -> QuotaCheckResult {
        match limit {
            None => QuotaCheckResult::allowed(None, self.period_end),
            Some(limit) if self.used.saturating_add(amount) <= limit => {
                QuotaCheckResult::allowed(Some(limit - self.used), self.period_end)
            }
            Some(limit) => QuotaCheckResult::denied(
                format!(
                    "Monthly {} limit of {} reached for the {} plan",
                    usage.as_str(),
                    limit,
                    plan
                ),
                self.period_end,
            ),
        }
    }
}

/// Calendar month (UTC) containing `now`, as `[start, end)`.
pub fn month_bounds(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let today = now.date_naive();
    let first = today.with_day(1).unwrap_or(today);
    let next = first.checked_add_months(Months::new(1)).unwrap_or(first);
    (
        first.and_time(NaiveTime::MIN).and_utc(),
        next.and_time(NaiveTime::MIN).and_utc(),
    )
}

pub struct InMemoryQuotaStore {
    limits: PlanLimits,
    plans: DashMap<String, PlanTier>,
    usage: DashMap<(String, UsageType), UsageRecord>,
    clock: Clock,
}

impl InMemoryQuotaStore {
    pub fn new(limits: PlanLimits) -> Self {
        Self {
            limits,
            plans: DashMap::new(),
            usage: DashMap::new(),
            clock: Arc::new(Utc::now),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Register the plan a user is billed on. Unknown users are `free`.
    pub fn set_plan(&self, user_id: &str, plan: PlanTier) {
        self.plans.insert(user_id.to_string(), plan);
    }

    pub fn plan_of(&self, user_id: &str) -> PlanTier {
        self.plans.get(user_id).map(|p| *p).unwrap_or_default()
    }

    /// Units consumed in the current period.
    pub fn used(&self, user_id: &str, usage: UsageType) -> u32 {
        self.usage
            .get(&(user_id.to_string(), usage))
            .map(|record| record.used)
            .unwrap_or(0)
    }

    fn with_record<R>(
        &self,
        user_id: &str,
        usage: UsageType,
        f: impl FnOnce(&mut UsageRecord, DateTime<Utc>) -> R,
    ) -> R {
        let now = (self.clock)();
        let mut record = self
            .usage
            .entry((user_id.to_string(), usage))
            .or_insert_with(|| UsageRecord::starting(now));
        record.roll_over(now);
        f(&mut record, now)
    }
}

#[async_trait]
impl QuotaStore for InMemoryQuotaStore {
    async fn check_usage_limit(
        &self,
        user_id: &str,
        usage: UsageType,
    ) -> Result<QuotaCheckResult> {
        let plan = self.plan_of(user_id);
        let limit = self.limits.limit(plan, usage);
        Ok(self.with_record(user_id, usage, |record, _| {
            record.evaluate(plan, usage, limit, 1)
        }))
    }

    async fn increment_usage(&self, user_id: &str, usage: UsageType, amount: u32) -> Result<bool> {
        self.with_record(user_id, usage, |record, _| {
            record.used = record.used.saturating_add(amount);
        });
        Ok(true)
    }

    // The entry lock is held across check and increment.
    async fn reserve(
        &self,
        user_id: &str,
        usage: UsageType,
        amount: u32,
    ) -> Result<QuotaCheckResult> {
        let plan = self.plan_of(user_id);
        let limit = self.limits.limit(plan, usage);
        Ok(self.with_record(user_id, usage, |record, _| {
            let mut result = record.evaluate(plan, usage, limit, amount);
            if result.allowed {
                record.used = record.used.saturating_add(amount);
                result.remaining_quota = result.remaining_quota.map(|r| r.saturating_sub(amount));
            }
            result
        }))
    }
}
