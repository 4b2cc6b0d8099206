//! Engine lifecycle: logging, construction and background maintenance.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

use crate::config::EngineConfig;
use crate::service::{AnalysisOrchestrator, Collaborators, QuotaStore};

const DEFAULT_DIRECTIVES: &str = "info,seoinsikt_engine=debug";

/// Initialize logging with tracing_subscriber.
///
/// `RUST_LOG` wins when set. Calling this twice is harmless.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES));

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .compact()
        .with_target(false)
        .with_ansi(true)
        .try_init();
    if installed.is_err() {
        tracing::debug!("Global subscriber already installed");
    }
}

/// Build the engine the application shares across request handlers.
pub fn start(
    config: EngineConfig,
    collaborators: Collaborators,
    quota_store: Arc<dyn QuotaStore>,
) -> Arc<AnalysisOrchestrator> {
    Arc::new(AnalysisOrchestrator::new(config, collaborators, quota_store))
}

/// Periodically drop cached reports older than the configured TTL.
///
/// Expired entries are already invisible to readers; sweeping just frees
/// their memory before LRU pressure would. Abort the handle on shutdown.
pub fn spawn_cache_sweeper(
    engine: Arc<AnalysisOrchestrator>,
    every: Duration,
) -> JoinHandle<()> {
    let max_age = engine.config().cache.ttl();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // the first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = engine.evict_stale(max_age);
            if removed > 0 {
                tracing::debug!("Cache sweeper removed {} entries", removed);
            }
        }
    })
}

/// Stop background tasks and drop cached state.
pub async fn shutdown(engine: &AnalysisOrchestrator, sweeper: Option<JoinHandle<()>>) {
    if let Some(handle) = sweeper {
        handle.abort();
        let _ = handle.await;
    }
    engine.clear_cache();
    tracing::info!("Analysis engine stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlanLimits;
    use crate::service::InMemoryQuotaStore;
    use crate::test_utils::{fixtures, ScriptedStages};

    #[tokio::test(start_paused = true)]
    async fn sweeper_evicts_expired_reports() {
        let stages = ScriptedStages::new();
        let mut config = EngineConfig::default();
        config.cache.ttl_secs = 60;
        let engine = start(
            config,
            stages.collaborators(),
            Arc::new(InMemoryQuotaStore::new(PlanLimits::default())),
        );

        engine.run_analysis(fixtures::request()).await.unwrap();
        assert_eq!(engine.cache_stats().size, 1);

        let sweeper = spawn_cache_sweeper(engine.clone(), Duration::from_secs(30));
        tokio::time::sleep(Duration::from_secs(95)).await;
        assert_eq!(engine.cache_stats().size, 0);

        shutdown(&engine, Some(sweeper)).await;
    }

    #[test]
    fn init_logging_twice_is_fine() {
        init_logging();
        init_logging();
    }
}
