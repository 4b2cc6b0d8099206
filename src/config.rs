//! Engine configuration.
//!
//! Every field has a default, so `EngineConfig::default()` is a working
//! configuration and a TOML file only needs the keys it wants to override.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::domain::models::{CrawlOptions, PlanTier, UsageType};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub cache: CacheConfig,
    pub pipeline: PipelineConfig,
    pub quota: QuotaConfig,
    /// Serve a cached report (any writer plan) when a run fails fatally.
    pub fallback_to_cache: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            pipeline: PipelineConfig::default(),
            quota: QuotaConfig::default(),
            fallback_to_cache: true,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(raw).context("Invalid engine configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&raw)
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.cache.capacity > 0, "cache.capacity must be at least 1");
        anyhow::ensure!(self.cache.ttl_secs > 0, "cache.ttl_secs must be at least 1");
        anyhow::ensure!(
            self.pipeline.concurrency > 0,
            "pipeline.concurrency must be at least 1"
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub capacity: usize,
    pub ttl_secs: u64,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            ttl_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum per-item calls in flight within one phase.
    pub concurrency: usize,
    /// Per collaborator call; a timed-out item counts as failed.
    pub item_timeout_secs: Option<u64>,
    pub crawl_timeout_secs: u64,
    pub user_agent: String,
    /// Wall-clock limit for a whole run. Off by default.
    pub run_timeout_secs: Option<u64>,
}

impl PipelineConfig {
    pub fn item_timeout(&self) -> Option<Duration> {
        self.item_timeout_secs.map(Duration::from_secs)
    }

    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_secs.map(Duration::from_secs)
    }

    pub fn crawl_options(&self) -> CrawlOptions {
        CrawlOptions {
            timeout: Duration::from_secs(self.crawl_timeout_secs),
            user_agent: self.user_agent.clone(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let defaults = CrawlOptions::default();
        Self {
            concurrency: num_cpus::get().clamp(2, 16),
            item_timeout_secs: None,
            crawl_timeout_secs: defaults.timeout.as_secs(),
            user_agent: defaults.user_agent,
            run_timeout_secs: None,
        }
    }
}

/// What a caller that joins an in-flight run pays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinerQuotaPolicy {
    /// Only the caller that started the run is charged.
    #[default]
    Exempt,
    /// Every joiner reserves its own unit before awaiting the shared result.
    Charge,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    pub joiner_policy: JoinerQuotaPolicy,
    pub limits: PlanLimits,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            joiner_policy: JoinerQuotaPolicy::Exempt,
            limits: PlanLimits::default(),
        }
    }
}

/// Monthly limits for one plan; an absent value means unlimited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct UsageLimits {
    pub analysis: Option<u32>,
    pub content_rewrite: Option<u32>,
    pub competitor_tracking: Option<u32>,
}

impl UsageLimits {
    const fn capped(analysis: u32, content_rewrite: u32, competitor_tracking: u32) -> Self {
        Self {
            analysis: Some(analysis),
            content_rewrite: Some(content_rewrite),
            competitor_tracking: Some(competitor_tracking),
        }
    }

    pub fn get(&self, usage: UsageType) -> Option<u32> {
        match usage {
            UsageType::Analysis => self.analysis,
            UsageType::ContentRewrite => self.content_rewrite,
            UsageType::CompetitorTracking => self.competitor_tracking,
        }
    }
}

/// Per-plan limits. A plan table given in TOML replaces that plan's
/// defaults entirely.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlanLimits {
    pub free: UsageLimits,
    pub starter: UsageLimits,
    pub agency: UsageLimits,
    pub enterprise: UsageLimits,
    pub admin: UsageLimits,
}

impl PlanLimits {
    pub fn limit(&self, plan: PlanTier, usage: UsageType) -> Option<u32> {
        let limits = match plan {
            PlanTier::Free => &self.free,
            PlanTier::Starter => &self.starter,
            PlanTier::Agency => &self.agency,
            PlanTier::Enterprise => &self.enterprise,
            PlanTier::Admin => &self.admin,
        };
        limits.get(usage)
    }
}

impl Default for PlanLimits {
    fn default() -> Self {
        Self {
            free: UsageLimits::capped(3, 1, 0),
            starter: UsageLimits::capped(50, 20, 5),
            agency: UsageLimits::capped(250, 100, 25),
            enterprise: UsageLimits::capped(1000, 500, 100),
            admin: UsageLimits::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.fallback_to_cache);
        assert_eq!(config.quota.joiner_policy, JoinerQuotaPolicy::Exempt);
        assert_eq!(config.quota.limits.limit(PlanTier::Free, UsageType::Analysis), Some(3));
        assert_eq!(config.quota.limits.limit(PlanTier::Admin, UsageType::Analysis), None);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
            fallback_to_cache = false

            [cache]
            capacity = 5

            [quota]
            joiner_policy = "charge"
            "#,
        )
        .unwrap();

        assert_eq!(config.cache.capacity, 5);
        assert_eq!(config.cache.ttl_secs, 3600);
        assert!(!config.fallback_to_cache);
        assert_eq!(config.quota.joiner_policy, JoinerQuotaPolicy::Charge);
    }

    #[test]
    fn custom_plan_limits() {
        let config = EngineConfig::from_toml_str(
            r#"
            [quota.limits.free]
            analysis = 10
            "#,
        )
        .unwrap();

        let limits = &config.quota.limits;
        assert_eq!(limits.limit(PlanTier::Free, UsageType::Analysis), Some(10));
        assert_eq!(limits.limit(PlanTier::Free, UsageType::ContentRewrite), None);
        assert_eq!(limits.limit(PlanTier::Starter, UsageType::Analysis), Some(50));
    }

    #[test]
    fn rejects_zero_capacity() {
        let err = EngineConfig::from_toml_str("[cache]\ncapacity = 0").unwrap_err();
        assert!(err.to_string().contains("capacity"));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[pipeline]\nconcurrency = 3\nitem_timeout_secs = 5").unwrap();

        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config.pipeline.concurrency, 3);
        assert_eq!(config.pipeline.item_timeout(), Some(Duration::from_secs(5)));
        assert_eq!(config.pipeline.run_timeout(), None);
    }
}
