//! Scripted collaborators and fixtures shared by unit and integration tests.
//!
//! `ScriptedStages` implements every stage trait with canned scores, per-call
//! counters and injectable failures, so tests can assert exactly how often
//! each collaborator was reached.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use crate::domain::models::{
    AnalysisRequest, CrawlOptions, CrawlResult, Heading, Phase, QuotaCheckResult,
    RewriteAnalysis, RewriteRequest, RewriteSuggestion, SemanticResult, TrustReport, UsageType,
    VisibilityReport,
};
use crate::service::quota::{InMemoryQuotaStore, QuotaStore};
use crate::service::stages::{
    Collaborators, Crawler, RewriteGenerator, SemanticAnalyzer, TrustAnalyzer, VisibilityAnalyzer,
};

/// Default per-phase scores. They aggregate to an overall score of 71.
pub const DEFAULT_SCORES: [(Phase, f64); 4] = [
    (Phase::Crawl, 80.0),
    (Phase::Visibility, 60.0),
    (Phase::Trust, 90.0),
    (Phase::Semantic, 50.0),
];

/// One fake behind all five stage traits.
///
/// The scripted crawler uses the URL as the page title, which is how the
/// semantic fake (which only sees title and content) knows which URL it is
/// scoring.
pub struct ScriptedStages {
    scores: Mutex<HashMap<Phase, f64>>,
    url_scores: Mutex<HashMap<(Phase, String), f64>>,
    failures: Mutex<HashSet<(Phase, String)>>,
    failing_phases: Mutex<HashSet<Phase>>,
    panicking_phases: Mutex<HashSet<Phase>>,
    delay: Mutex<Option<Duration>>,
    calls: Mutex<HashMap<Phase, usize>>,
}

impl ScriptedStages {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            scores: Mutex::new(DEFAULT_SCORES.into_iter().collect()),
            url_scores: Mutex::default(),
            failures: Mutex::default(),
            failing_phases: Mutex::default(),
            panicking_phases: Mutex::default(),
            delay: Mutex::default(),
            calls: Mutex::default(),
        })
    }

    pub fn collaborators(self: &Arc<Self>) -> Collaborators {
        Collaborators {
            crawler: self.clone(),
            semantic: self.clone(),
            visibility: self.clone(),
            trust: self.clone(),
            rewrites: self.clone(),
        }
    }

    pub fn set_score(&self, phase: Phase, score: f64) {
        self.scores.lock().unwrap().insert(phase, score);
    }

    pub fn set_url_score(&self, phase: Phase, url: &str, score: f64) {
        self.url_scores
            .lock()
            .unwrap()
            .insert((phase, url.to_string()), score);
    }

    /// Make `phase` fail for `url` only.
    pub fn fail(&self, phase: Phase, url: &str) {
        self.failures.lock().unwrap().insert((phase, url.to_string()));
    }

    /// Make every item of `phase` fail.
    pub fn fail_phase(&self, phase: Phase) {
        self.failing_phases.lock().unwrap().insert(phase);
    }

    pub fn panic_on(&self, phase: Phase) {
        self.panicking_phases.lock().unwrap().insert(phase);
    }

    /// Clear every scripted failure and panic.
    pub fn heal(&self) {
        self.failures.lock().unwrap().clear();
        self.failing_phases.lock().unwrap().clear();
        self.panicking_phases.lock().unwrap().clear();
    }

    /// Sleep this long inside every call.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self, phase: Phase) -> usize {
        self.calls.lock().unwrap().get(&phase).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    fn score(&self, phase: Phase, url: &str) -> f64 {
        if let Some(score) = self.url_scores.lock().unwrap().get(&(phase, url.to_string())) {
            return *score;
        }
        self.scores.lock().unwrap().get(&phase).copied().unwrap_or(0.0)
    }

    async fn enter(&self, phase: Phase, url: &str) -> Result<()> {
        *self.calls.lock().unwrap().entry(phase).or_insert(0) += 1;

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let panics = self.panicking_phases.lock().unwrap().contains(&phase);
        if panics {
            panic!("scripted {} panic for {}", phase.as_str(), url);
        }
        let fails = self.failing_phases.lock().unwrap().contains(&phase)
            || self
                .failures
                .lock()
                .unwrap()
                .contains(&(phase, url.to_string()));
        if fails {
            anyhow::bail!("scripted {} failure for {}", phase.as_str(), url);
        }
        Ok(())
    }
}

#[async_trait]
impl Crawler for ScriptedStages {
    async fn crawl(&self, url: &str, _options: &CrawlOptions) -> Result<CrawlResult> {
        self.enter(Phase::Crawl, url).await?;
        let content = format!("Scripted body for {} covering technical seo", url);
        Ok(CrawlResult {
            url: url.to_string(),
            status_code: 200,
            title: Some(url.to_string()),
            meta_description: None,
            headings: vec![Heading {
                level: 1,
                text: url.to_string(),
            }],
            word_count: content.split_whitespace().count(),
            content,
            author: Some("Scripted Author".to_string()),
            load_time_ms: 12.0,
            seo_score: self.score(Phase::Crawl, url),
        })
    }
}

#[async_trait]
impl SemanticAnalyzer for ScriptedStages {
    async fn analyze(
        &self,
        content: &str,
        keywords: &[String],
        title: Option<&str>,
    ) -> Result<SemanticResult> {
        let url = title.unwrap_or(content);
        self.enter(Phase::Semantic, url).await?;
        Ok(SemanticResult {
            coverage_score: self.score(Phase::Semantic, url),
            topics: keywords.to_vec(),
            missing_topics: vec!["internal linking".to_string()],
        })
    }
}

#[async_trait]
impl VisibilityAnalyzer for ScriptedStages {
    async fn analyze_visibility(
        &self,
        url: &str,
        _keywords: &[String],
        _competitor_urls: &[String],
    ) -> Result<VisibilityReport> {
        self.enter(Phase::Visibility, url).await?;
        Ok(VisibilityReport {
            visibility_score: self.score(Phase::Visibility, url),
            citations: Vec::new(),
        })
    }
}

#[async_trait]
impl TrustAnalyzer for ScriptedStages {
    async fn analyze_trust(
        &self,
        url: &str,
        _content: &str,
        author_hint: Option<&str>,
        _competitor_urls: &[String],
    ) -> Result<TrustReport> {
        self.enter(Phase::Trust, url).await?;
        Ok(TrustReport {
            trust_score: self.score(Phase::Trust, url),
            signals: author_hint
                .map(|author| vec![format!("author: {}", author)])
                .unwrap_or_default(),
            recommendations: Vec::new(),
        })
    }
}

#[async_trait]
impl RewriteGenerator for ScriptedStages {
    async fn generate_rewrites(&self, request: &RewriteRequest) -> Result<RewriteAnalysis> {
        self.enter(Phase::Rewrite, &request.url).await?;
        Ok(RewriteAnalysis {
            suggestions: request
                .missing_topics
                .iter()
                .map(|topic| RewriteSuggestion {
                    section: "body".to_string(),
                    original: String::new(),
                    suggested: format!("Add a section on {}", topic),
                    rationale: "Topic is missing from the page".to_string(),
                })
                .collect(),
        })
    }
}

/// Quota store that can be switched into an outage, made slow, and counts
/// reservations.
pub struct FlakyQuotaStore {
    inner: InMemoryQuotaStore,
    unavailable: AtomicBool,
    latency: Mutex<Option<Duration>>,
    reservations: AtomicUsize,
}

impl FlakyQuotaStore {
    pub fn new(inner: InMemoryQuotaStore) -> Arc<Self> {
        Arc::new(Self {
            inner,
            unavailable: AtomicBool::new(false),
            latency: Mutex::default(),
            reservations: AtomicUsize::new(0),
        })
    }

    pub fn inner(&self) -> &InMemoryQuotaStore {
        &self.inner
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Sleep this long before answering every call.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = Some(latency);
    }

    pub fn reservations(&self) -> usize {
        self.reservations.load(Ordering::SeqCst)
    }

    async fn ensure_available(&self) -> Result<()> {
        let latency = *self.latency.lock().unwrap();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        anyhow::ensure!(
            !self.unavailable.load(Ordering::SeqCst),
            "quota backend unreachable"
        );
        Ok(())
    }
}

#[async_trait]
impl QuotaStore for FlakyQuotaStore {
    async fn check_usage_limit(
        &self,
        user_id: &str,
        usage: UsageType,
    ) -> Result<QuotaCheckResult> {
        self.ensure_available().await?;
        self.inner.check_usage_limit(user_id, usage).await
    }

    async fn increment_usage(&self, user_id: &str, usage: UsageType, amount: u32) -> Result<bool> {
        self.ensure_available().await?;
        self.inner.increment_usage(user_id, usage, amount).await
    }

    async fn reserve(
        &self,
        user_id: &str,
        usage: UsageType,
        amount: u32,
    ) -> Result<QuotaCheckResult> {
        self.reservations.fetch_add(1, Ordering::SeqCst);
        self.ensure_available().await?;
        self.inner.reserve(user_id, usage, amount).await
    }
}

pub mod fixtures {
    use super::*;
    use crate::domain::models::{AnalysisMode, PlanTier};

    pub const SITE_A: &str = "https://site-a.test/";
    pub const SITE_B: &str = "https://site-b.test/pricing";
    pub const RIVAL: &str = "https://rival.test/";

    /// A two-URL comprehensive request for user `user-1` on the free plan.
    pub fn request() -> AnalysisRequest {
        AnalysisRequest::new([SITE_A, SITE_B], ["technical seo", "site audit"], "user-1")
    }

    pub fn request_for(plan: PlanTier, mode: AnalysisMode) -> AnalysisRequest {
        request().with_plan(plan).with_mode(mode)
    }
}
