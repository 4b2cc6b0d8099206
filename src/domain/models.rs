//! Domain entities for analysis runs - requests, phase outputs and reports.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, Result};

// ====== Enums ======

/// Subscription level of a requester.
///
/// The declaration order is the rank order used for cache sharing.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    #[default]
    Free,
    Starter,
    Agency,
    Enterprise,
    Admin,
}

impl PlanTier {
    pub const ALL: [PlanTier; 5] = [
        PlanTier::Free,
        PlanTier::Starter,
        PlanTier::Agency,
        PlanTier::Enterprise,
        PlanTier::Admin,
    ];

    pub fn rank(&self) -> u8 {
        match self {
            PlanTier::Free => 0,
            PlanTier::Starter => 1,
            PlanTier::Agency => 2,
            PlanTier::Enterprise => 3,
            PlanTier::Admin => 4,
        }
    }

    /// A reader may see data written by a plan of equal or lower rank.
    pub fn can_read(&self, writer: PlanTier) -> bool {
        self.rank() >= writer.rank()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Free => "free",
            PlanTier::Starter => "starter",
            PlanTier::Agency => "agency",
            PlanTier::Enterprise => "enterprise",
            PlanTier::Admin => "admin",
        }
    }
}

impl FromStr for PlanTier {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self> {
        PlanTier::ALL
            .into_iter()
            .find(|plan| plan.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| AnalysisError::invalid(format!("unknown plan tier: {}", s)))
    }
}

impl fmt::Display for PlanTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnalysisMode {
    #[default]
    Comprehensive,
    SeoFocused,
    ContentFocused,
    Competitive,
}

impl AnalysisMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisMode::Comprehensive => "comprehensive",
            AnalysisMode::SeoFocused => "seo-focused",
            AnalysisMode::ContentFocused => "content-focused",
            AnalysisMode::Competitive => "competitive",
        }
    }

    pub fn runs_rewrites(&self) -> bool {
        matches!(
            self,
            AnalysisMode::ContentFocused | AnalysisMode::Comprehensive
        )
    }

    pub fn runs_competitive(&self) -> bool {
        matches!(self, AnalysisMode::Competitive | AnalysisMode::Comprehensive)
    }
}

impl FromStr for AnalysisMode {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "comprehensive" => Ok(AnalysisMode::Comprehensive),
            "seo-focused" => Ok(AnalysisMode::SeoFocused),
            "content-focused" => Ok(AnalysisMode::ContentFocused),
            "competitive" => Ok(AnalysisMode::Competitive),
            other => Err(AnalysisError::invalid(format!(
                "unknown analysis mode: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for AnalysisMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metered feature a quota unit is charged against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageType {
    Analysis,
    ContentRewrite,
    CompetitorTracking,
}

impl UsageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UsageType::Analysis => "analysis",
            UsageType::ContentRewrite => "content_rewrite",
            UsageType::CompetitorTracking => "competitor_tracking",
        }
    }
}

// ====== Request ======

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub urls: Vec<String>,
    pub keywords: Vec<String>,
    #[serde(default)]
    pub competitor_urls: Vec<String>,
    #[serde(default)]
    pub mode: AnalysisMode,
    #[serde(default)]
    pub plan: PlanTier,
    pub user_id: String,
}

impl AnalysisRequest {
    pub fn new<U, K>(urls: U, keywords: K, user_id: impl Into<String>) -> Self
    where
        U: IntoIterator,
        U::Item: Into<String>,
        K: IntoIterator,
        K::Item: Into<String>,
    {
        Self {
            urls: urls.into_iter().map(Into::into).collect(),
            keywords: keywords.into_iter().map(Into::into).collect(),
            competitor_urls: Vec::new(),
            mode: AnalysisMode::default(),
            plan: PlanTier::default(),
            user_id: user_id.into(),
        }
    }

    pub fn with_mode(mut self, mode: AnalysisMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_plan(mut self, plan: PlanTier) -> Self {
        self.plan = plan;
        self
    }

    pub fn with_competitors<C>(mut self, competitors: C) -> Self
    where
        C: IntoIterator,
        C::Item: Into<String>,
    {
        self.competitor_urls = competitors.into_iter().map(Into::into).collect();
        self
    }

    /// Reject requests that cannot produce a meaningful run.
    pub fn validate(&self) -> Result<()> {
        if self.urls.is_empty() {
            return Err(AnalysisError::invalid("at least one URL is required"));
        }
        if let Some(idx) = self.urls.iter().position(|u| u.trim().is_empty()) {
            return Err(AnalysisError::invalid(format!("URL at index {} is blank", idx)));
        }
        if self.user_id.trim().is_empty() {
            return Err(AnalysisError::invalid("requester id is required"));
        }
        Ok(())
    }
}

/// Content fingerprint of a request, shared across requesters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(pub String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ====== Quota ======

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotaCheckResult {
    pub allowed: bool,
    pub reason: Option<String>,
    /// `None` means the plan is unlimited for this usage type.
    pub remaining_quota: Option<u32>,
    pub reset_date: DateTime<Utc>,
}

impl QuotaCheckResult {
    pub fn allowed(remaining_quota: Option<u32>, reset_date: DateTime<Utc>) -> Self {
        Self {
            allowed: true,
            reason: None,
            remaining_quota,
            reset_date,
        }
    }

    pub fn denied(reason: impl Into<String>, reset_date: DateTime<Utc>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
            remaining_quota: Some(0),
            reset_date,
        }
    }
}

// ====== Collaborator payloads ======

/// Options handed to the crawl collaborator for every URL.
#[derive(Debug, Clone)]
pub struct CrawlOptions {
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: "SEOINSKT-Bot/1.0".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heading {
    pub level: u8,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlResult {
    pub url: String,
    pub status_code: u16,
    pub title: Option<String>,
    pub meta_description: Option<String>,
    pub headings: Vec<Heading>,
    pub content: String,
    pub word_count: usize,
    pub author: Option<String>,
    pub load_time_ms: f64,
    /// On-page SEO score, 0-100.
    pub seo_score: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SemanticResult {
    /// Topic coverage score, 0-100.
    pub coverage_score: f64,
    pub topics: Vec<String>,
    pub missing_topics: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub platform: String,
    pub cited: bool,
    pub position: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VisibilityReport {
    /// Citation/visibility score, 0-100.
    pub visibility_score: f64,
    pub citations: Vec<Citation>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TrustReport {
    /// E-A-T style trust score, 0-100.
    pub trust_score: f64,
    pub signals: Vec<String>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewriteRequest {
    pub url: String,
    pub title: Option<String>,
    pub content: String,
    pub keywords: Vec<String>,
    pub missing_topics: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewriteSuggestion {
    pub section: String,
    pub original: String,
    pub suggested: String,
    pub rationale: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RewriteAnalysis {
    pub suggestions: Vec<RewriteSuggestion>,
}

impl RewriteAnalysis {
    pub fn has_rewrites(&self) -> bool {
        !self.suggestions.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompetitorStanding {
    pub url: String,
    pub visibility_score: f64,
}

/// Where the analysed site stands against the supplied competitors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompetitivePositioning {
    pub own_visibility: f64,
    pub competitor_average: f64,
    /// Positive when the site is ahead of the competitor average.
    pub visibility_gap: f64,
    /// 1-based position of the site among itself and its competitors.
    pub rank: usize,
    pub field_size: usize,
    pub competitors: Vec<CompetitorStanding>,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
}

impl CompetitivePositioning {
    pub fn is_outranked(&self) -> bool {
        !self.competitors.is_empty() && self.visibility_gap < 0.0
    }
}

// ====== Phase bookkeeping ======

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Crawl,
    Semantic,
    Visibility,
    Trust,
    Rewrite,
    Competitive,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Crawl => "crawl",
            Phase::Semantic => "semantic",
            Phase::Visibility => "visibility",
            Phase::Trust => "trust",
            Phase::Rewrite => "rewrite",
            Phase::Competitive => "competitive",
        }
    }
}

/// A per-item result tied to the URL it was produced for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UrlResult<T> {
    pub url: String,
    pub data: T,
}

impl<T> UrlResult<T> {
    pub fn new(url: impl Into<String>, data: T) -> Self {
        Self {
            url: url.into(),
            data,
        }
    }
}

/// A 0-100 score contributed by one phase item.
pub trait Scored {
    fn score(&self) -> f64;
}

impl Scored for CrawlResult {
    fn score(&self) -> f64 {
        self.seo_score
    }
}

impl Scored for SemanticResult {
    fn score(&self) -> f64 {
        self.coverage_score
    }
}

impl Scored for VisibilityReport {
    fn score(&self) -> f64 {
        self.visibility_score
    }
}

impl Scored for TrustReport {
    fn score(&self) -> f64 {
        self.trust_score
    }
}

impl<T: Scored> Scored for UrlResult<T> {
    fn score(&self) -> f64 {
        self.data.score()
    }
}

fn is_valid_score(score: f64) -> bool {
    score.is_finite() && (0.0..=100.0).contains(&score)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFailure {
    pub phase: Phase,
    pub url: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseStats {
    pub phase: Phase,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub elapsed_ms: u64,
}

/// Output of one phase, as it crosses into the report.
#[derive(Debug, Clone, PartialEq)]
pub enum PhaseOutput {
    Crawl(Vec<UrlResult<CrawlResult>>),
    Semantic(Vec<UrlResult<SemanticResult>>),
    Visibility {
        own: Vec<UrlResult<VisibilityReport>>,
        competitors: Vec<UrlResult<VisibilityReport>>,
    },
    Trust(Vec<UrlResult<TrustReport>>),
    Rewrite(Vec<UrlResult<RewriteAnalysis>>),
    Competitive(CompetitivePositioning),
}

impl PhaseOutput {
    pub fn phase(&self) -> Phase {
        match self {
            PhaseOutput::Crawl(_) => Phase::Crawl,
            PhaseOutput::Semantic(_) => Phase::Semantic,
            PhaseOutput::Visibility { .. } => Phase::Visibility,
            PhaseOutput::Trust(_) => Phase::Trust,
            PhaseOutput::Rewrite(_) => Phase::Rewrite,
            PhaseOutput::Competitive(_) => Phase::Competitive,
        }
    }

    /// Drop items whose score is not a finite value in 0-100.
    ///
    /// Rejected items are reported back as failures of this phase.
    pub fn validate(self) -> (PhaseOutput, Vec<ItemFailure>) {
        let phase = self.phase();
        let mut failures = Vec::new();
        let output = match self {
            PhaseOutput::Crawl(items) => PhaseOutput::Crawl(retain_scored(phase, items, &mut failures)),
            PhaseOutput::Semantic(items) => {
                PhaseOutput::Semantic(retain_scored(phase, items, &mut failures))
            }
            PhaseOutput::Visibility { own, competitors } => PhaseOutput::Visibility {
                own: retain_scored(phase, own, &mut failures),
                competitors: retain_scored(phase, competitors, &mut failures),
            },
            PhaseOutput::Trust(items) => PhaseOutput::Trust(retain_scored(phase, items, &mut failures)),
            other => other,
        };
        (output, failures)
    }
}

fn retain_scored<T: Scored>(
    phase: Phase,
    items: Vec<T>,
    failures: &mut Vec<ItemFailure>,
) -> Vec<T>
where
    T: HasUrl,
{
    items
        .into_iter()
        .filter(|item| {
            let score = item.score();
            if is_valid_score(score) {
                true
            } else {
                failures.push(ItemFailure {
                    phase,
                    url: item.url().to_string(),
                    message: format!("score {} outside 0-100", score),
                });
                false
            }
        })
        .collect()
}

pub trait HasUrl {
    fn url(&self) -> &str;
}

impl<T> HasUrl for UrlResult<T> {
    fn url(&self) -> &str {
        &self.url
    }
}

/// Everything the phases produced for one run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PhaseResults {
    pub crawl: Vec<UrlResult<CrawlResult>>,
    pub semantic: Vec<UrlResult<SemanticResult>>,
    pub visibility: Vec<UrlResult<VisibilityReport>>,
    pub competitor_visibility: Vec<UrlResult<VisibilityReport>>,
    pub trust: Vec<UrlResult<TrustReport>>,
    /// `None` when the rewrite phase did not run for this mode.
    pub rewrites: Option<Vec<UrlResult<RewriteAnalysis>>>,
    pub competitive: Option<CompetitivePositioning>,
    pub stats: Vec<PhaseStats>,
    pub failures: Vec<ItemFailure>,
}

impl PhaseResults {
    /// Validate a phase output and fold it into the run's results.
    pub fn absorb(&mut self, output: PhaseOutput) {
        let (output, failures) = output.validate();
        if !failures.is_empty() {
            tracing::warn!(
                "Dropped {} {} item(s) with invalid scores",
                failures.len(),
                output.phase().as_str()
            );
            if let Some(stats) = self.stats.iter_mut().find(|s| s.phase == output.phase()) {
                stats.succeeded = stats.succeeded.saturating_sub(failures.len());
                stats.failed += failures.len();
            }
        }
        self.failures.extend(failures);

        match output {
            PhaseOutput::Crawl(items) => self.crawl = items,
            PhaseOutput::Semantic(items) => self.semantic = items,
            PhaseOutput::Visibility { own, competitors } => {
                self.visibility = own;
                self.competitor_visibility = competitors;
            }
            PhaseOutput::Trust(items) => self.trust = items,
            PhaseOutput::Rewrite(items) => self.rewrites = Some(items),
            PhaseOutput::Competitive(positioning) => self.competitive = Some(positioning),
        }
    }

    /// Estimated bytes held: page text, rewrite text and per-item overhead.
    pub fn approx_size(&self) -> usize {
        let pages: usize = self
            .crawl
            .iter()
            .map(|item| {
                let page = &item.data;
                item.url.len()
                    + page.content.len()
                    + page.title.as_ref().map_or(0, String::len)
                    + page.meta_description.as_ref().map_or(0, String::len)
                    + page.headings.iter().map(|h| h.text.len()).sum::<usize>()
            })
            .sum();
        let rewrites: usize = self
            .rewrites
            .iter()
            .flatten()
            .flat_map(|item| &item.data.suggestions)
            .map(|s| s.section.len() + s.original.len() + s.suggested.len() + s.rationale.len())
            .sum();

        pages
            + rewrites
            + self.crawl.len() * size_of::<UrlResult<CrawlResult>>()
            + self.semantic.len() * size_of::<UrlResult<SemanticResult>>()
            + (self.visibility.len() + self.competitor_visibility.len())
                * size_of::<UrlResult<VisibilityReport>>()
            + self.trust.len() * size_of::<UrlResult<TrustReport>>()
            + self.failures.len() * size_of::<ItemFailure>()
    }
}

fn text_len(items: &[String]) -> usize {
    items.iter().map(String::len).sum()
}

// ====== Report ======

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    Critical,
    High,
    Medium,
    Low,
}

impl Impact {
    pub fn rank(&self) -> u8 {
        match self {
            Impact::Critical => 4,
            Impact::High => 3,
            Impact::Medium => 2,
            Impact::Low => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsightCategory {
    Seo,
    Content,
    Trust,
    Competitive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub category: InsightCategory,
    pub impact: Impact,
    pub title: String,
    pub description: String,
    pub recommendation: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Urgent,
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn rank(&self) -> u8 {
        match self {
            Priority::Urgent => 4,
            Priority::High => 3,
            Priority::Medium => 2,
            Priority::Low => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effort {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskCategory {
    Technical,
    Content,
    Authority,
    Visibility,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionableTask {
    pub id: String,
    pub title: String,
    pub description: String,
    pub category: TaskCategory,
    pub priority: Priority,
    pub effort: Effort,
    pub timeframe: String,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub seo: f64,
    pub visibility: f64,
    pub trust: f64,
    pub semantic: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub urls: Vec<String>,
    pub keywords: Vec<String>,
    pub mode: AnalysisMode,
    pub results: PhaseResults,
    pub breakdown: ScoreBreakdown,
    pub overall_score: u8,
    pub key_insights: Vec<Insight>,
    pub actionable_tasks: Vec<ActionableTask>,
    pub quota: QuotaCheckResult,
}

impl AnalysisReport {
    /// Rough in-memory footprint, used for cache accounting.
    pub fn approx_size(&self) -> usize {
        size_of::<Self>()
            + text_len(&self.urls)
            + text_len(&self.keywords)
            + self.key_insights.len() * size_of::<Insight>()
            + self.actionable_tasks.len() * size_of::<ActionableTask>()
            + self.results.approx_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_rank_follows_declared_order() {
        for pair in PlanTier::ALL.windows(2) {
            assert!(pair[0].rank() < pair[1].rank());
            assert!(pair[1].can_read(pair[0]));
            assert!(!pair[0].can_read(pair[1]));
        }
        assert_eq!("Enterprise".parse::<PlanTier>().unwrap(), PlanTier::Enterprise);
        assert!("platinum".parse::<PlanTier>().is_err());
    }

    #[test]
    fn mode_wire_names() {
        let mode: AnalysisMode = serde_json::from_str("\"seo-focused\"").unwrap();
        assert_eq!(mode, AnalysisMode::SeoFocused);
        assert_eq!(
            serde_json::to_string(&AnalysisMode::ContentFocused).unwrap(),
            "\"content-focused\""
        );
        assert!(AnalysisMode::Comprehensive.runs_rewrites());
        assert!(AnalysisMode::Comprehensive.runs_competitive());
        assert!(!AnalysisMode::SeoFocused.runs_rewrites());
        assert!(!AnalysisMode::ContentFocused.runs_competitive());
    }

    #[test]
    fn validate_rejects_empty_and_blank_urls() {
        let empty = AnalysisRequest::new(Vec::<String>::new(), ["seo"], "u1");
        assert!(matches!(empty.validate(), Err(AnalysisError::InvalidRequest(_))));

        let blank = AnalysisRequest::new(["https://a.test", "  "], ["seo"], "u1");
        assert!(blank.validate().is_err());

        let ok = AnalysisRequest::new(["https://a.test"], Vec::<String>::new(), "u1");
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn approx_size_follows_page_content() {
        let page = |content: String| {
            UrlResult::new(
                "https://a.test",
                CrawlResult {
                    url: "https://a.test".to_string(),
                    status_code: 200,
                    title: None,
                    meta_description: None,
                    headings: Vec::new(),
                    content,
                    word_count: 0,
                    author: None,
                    load_time_ms: 0.0,
                    seo_score: 50.0,
                },
            )
        };
        let small = PhaseResults {
            crawl: vec![page("short".to_string())],
            ..Default::default()
        };
        let large = PhaseResults {
            crawl: vec![page("word ".repeat(1000))],
            ..Default::default()
        };

        assert_eq!(PhaseResults::default().approx_size(), 0);
        assert_eq!(large.approx_size() - small.approx_size(), 5000 - 5);
    }

    #[test]
    fn absorb_drops_out_of_range_scores() {
        let mut results = PhaseResults::default();
        results.absorb(PhaseOutput::Trust(vec![
            UrlResult::new("https://a.test", TrustReport { trust_score: 80.0, ..Default::default() }),
            UrlResult::new("https://b.test", TrustReport { trust_score: f64::NAN, ..Default::default() }),
            UrlResult::new("https://c.test", TrustReport { trust_score: 140.0, ..Default::default() }),
        ]));

        assert_eq!(results.trust.len(), 1);
        assert_eq!(results.trust[0].url, "https://a.test");
        assert_eq!(results.failures.len(), 2);
        assert!(results.failures.iter().all(|f| f.phase == Phase::Trust));
    }
}
