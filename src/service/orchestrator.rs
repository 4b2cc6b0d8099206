//! Analysis orchestration.
//!
//! A run goes through these steps:
//! 1. Request validation and keying
//! 2. Plan-aware cache lookup (a hit is free)
//! 3. Joining an identical run already in flight, or registering a new one
//! 4. Inside a new run: cache re-check, quota reservation, pipeline
//! 5. Aggregation into a report, cached under the requester's plan
//!
//! The flight is registered before any quota I/O, so callers arriving
//! while the starter waits on the quota store join instead of paying.
//!
//! A fatal failure (other than a rejected request or exhausted quota) falls
//! back to any unexpired cached report for the same key.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use tokio::time::Instant;
use uuid::Uuid;

use crate::config::{EngineConfig, JoinerQuotaPolicy};
use crate::domain::models::{AnalysisReport, AnalysisRequest, CacheKey, QuotaCheckResult, UsageType};
use crate::error::{AnalysisError, Result};
use crate::service::aggregator;
use crate::service::cache::{CacheStats, CacheStore, EvictionReason};
use crate::service::in_flight::{FlightRole, InFlightRegistry};
use crate::service::keyer::derive_key;
use crate::service::pipeline::PipelineRunner;
use crate::service::quota::{QuotaGate, QuotaStore};
use crate::service::stages::Collaborators;

type ReportCache = CacheStore<Arc<AnalysisReport>>;

/// Outcome counts of a preload batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PreloadSummary {
    pub succeeded: usize,
    pub failed: usize,
}

// ============================================================================
// ORCHESTRATOR
// ============================================================================

/// Entry point for analysis runs.
///
/// Owns the result cache and the in-flight registry; build one per
/// application and share it behind an `Arc`.
pub struct AnalysisOrchestrator {
    config: EngineConfig,
    cache: Arc<ReportCache>,
    in_flight: InFlightRegistry<Arc<AnalysisReport>>,
    quota: QuotaGate,
    runner: Arc<PipelineRunner>,
}

impl AnalysisOrchestrator {
    // ========================================================================
    // CONSTRUCTION
    // ========================================================================

    pub fn new(
        config: EngineConfig,
        collaborators: Collaborators,
        quota_store: Arc<dyn QuotaStore>,
    ) -> Self {
        let cache = CacheStore::new(config.cache.capacity, config.cache.ttl())
            .with_weigher(|report: &Arc<AnalysisReport>| report.approx_size())
            .with_dispose_hook(Arc::new(|key: &CacheKey, reason: EvictionReason| {
                tracing::debug!("Evicted cached analysis {} ({:?})", key, reason);
            }));

        tracing::info!(
            "Analysis engine ready (cache: {} entries / {}s, concurrency: {})",
            config.cache.capacity,
            config.cache.ttl_secs,
            config.pipeline.concurrency
        );

        Self {
            runner: Arc::new(PipelineRunner::new(collaborators, &config.pipeline)),
            cache: Arc::new(cache),
            in_flight: InFlightRegistry::new(),
            quota: QuotaGate::new(quota_store),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ========================================================================
    // RUNS
    // ========================================================================

    /// Produce a report for `request`, from cache when allowed.
    ///
    /// Per-item collaborator failures only make the report partial; the
    /// call fails for rejected requests, quota refusals and fatal run
    /// errors with no cached report to fall back on.
    pub async fn run_analysis(&self, request: AnalysisRequest) -> Result<Arc<AnalysisReport>> {
        request.validate()?;
        let key = derive_key(&request);

        if let Some(report) = self.cache.get(&key, request.plan) {
            tracing::info!("Cache hit for {} ({} plan)", key, request.plan);
            return Ok(report);
        }

        match self.execute(&key, &request).await {
            Ok(report) => Ok(report),
            Err(e) if self.config.fallback_to_cache && e.allows_cache_fallback() => {
                match self.cache.get_any(&key) {
                    Some(cached) => {
                        tracing::warn!("Analysis {} failed ({}), serving cached report", key, e);
                        Ok(cached)
                    }
                    None => {
                        tracing::error!("Analysis {} failed: {}", key, e);
                        Err(e)
                    }
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn execute(&self, key: &CacheKey, request: &AnalysisRequest) -> Result<Arc<AnalysisReport>> {
        let (role, flight) = self
            .in_flight
            .join_or_start(key.clone(), || self.start_run(key.clone(), request.clone()));

        if role == FlightRole::Joined {
            tracing::debug!("Joining in-flight analysis {}", key);
            if self.config.quota.joiner_policy == JoinerQuotaPolicy::Charge {
                self.quota
                    .check_and_reserve(&request.user_id, UsageType::Analysis)
                    .await?;
            }
        }
        flight.await
    }

    fn start_run(
        &self,
        key: CacheKey,
        request: AnalysisRequest,
    ) -> impl Future<Output = Result<Arc<AnalysisReport>>> + Send + 'static {
        let runner = self.runner.clone();
        let cache = self.cache.clone();
        let quota = self.quota.clone();
        let run_timeout = self.config.pipeline.run_timeout();

        async move {
            // a flight for this key may have settled between lookup and start
            if let Some(report) = cache.peek(&key, request.plan) {
                tracing::debug!("Analysis {} cached while starting, reusing it", key);
                return Ok(report);
            }

            let reservation = quota
                .check_and_reserve(&request.user_id, UsageType::Analysis)
                .await?;

            let started = Instant::now();
            tracing::info!(
                "Starting {} analysis {} of {} URL(s) for {}",
                request.mode,
                key,
                request.urls.len(),
                request.user_id
            );

            let run = build_report(&runner, &request, reservation);
            let report = match run_timeout {
                Some(limit) => tokio::time::timeout(limit, run)
                    .await
                    .map_err(|_| AnalysisError::Timeout(limit.as_millis()))??,
                None => run.await?,
            };

            cache.set(key.clone(), report.clone(), request.plan);
            tracing::info!(
                "Analysis {} complete in {}ms - score: {}, failures: {}",
                key,
                started.elapsed().as_millis(),
                report.overall_score,
                report.results.failures.len()
            );
            Ok(report)
        }
    }

    /// Run every request, never failing as a whole.
    pub async fn preload_analysis(&self, requests: Vec<AnalysisRequest>) -> PreloadSummary {
        let total = requests.len();
        let outcomes = join_all(requests.into_iter().map(|request| async move {
            let urls = request.urls.join(", ");
            self.run_analysis(request)
                .await
                .map_err(|e| tracing::warn!("Preload of [{}] failed: {}", urls, e))
        }))
        .await;

        let succeeded = outcomes.iter().filter(|outcome| outcome.is_ok()).count();
        let summary = PreloadSummary {
            succeeded,
            failed: total - succeeded,
        };
        tracing::info!(
            "Preloaded {} analyses ({} failed)",
            summary.succeeded,
            summary.failed
        );
        summary
    }

    // ========================================================================
    // CACHE MANAGEMENT
    // ========================================================================

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Drop every cached report and forget in-flight runs.
    pub fn clear_cache(&self) {
        self.cache.clear();
        self.in_flight.clear();
        tracing::info!("Analysis cache cleared");
    }

    /// Remove cached reports older than `max_age`.
    pub fn evict_stale(&self, max_age: Duration) -> usize {
        self.cache.sweep_stale(max_age)
    }
}

async fn build_report(
    runner: &PipelineRunner,
    request: &AnalysisRequest,
    quota: QuotaCheckResult,
) -> Result<Arc<AnalysisReport>> {
    let results = runner.run(request).await;
    let aggregation = aggregator::aggregate(&results)?;

    Ok(Arc::new(AnalysisReport {
        id: Uuid::new_v4().to_string(),
        timestamp: Utc::now(),
        urls: request.urls.clone(),
        keywords: request.keywords.clone(),
        mode: request.mode,
        results,
        breakdown: aggregation.breakdown,
        overall_score: aggregation.overall_score,
        key_insights: aggregation.key_insights,
        actionable_tasks: aggregation.actionable_tasks,
        quota,
    }))
}
