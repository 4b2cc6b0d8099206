//! Analysis stage collaborators.
//!
//! Each stage is an async trait so the pipeline can run against the HTTP
//! crawler and remote analyzers in production and against scripted fakes
//! in tests. Every call may fail on its own; the pipeline isolates the
//! failure to the item that produced it.

mod crawler;

pub use crawler::HttpCrawler;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::domain::models::{
    CrawlOptions, CrawlResult, RewriteAnalysis, RewriteRequest, SemanticResult, TrustReport,
    VisibilityReport,
};

/// Fetches a page and extracts its content.
#[async_trait]
pub trait Crawler: Send + Sync {
    async fn crawl(&self, url: &str, options: &CrawlOptions) -> Result<CrawlResult>;
}

/// Scores topic coverage of crawled content against the target keywords.
#[async_trait]
pub trait SemanticAnalyzer: Send + Sync {
    async fn analyze(
        &self,
        content: &str,
        keywords: &[String],
        title: Option<&str>,
    ) -> Result<SemanticResult>;
}

/// Estimates how visible a URL is for the keywords (citations, answers).
#[async_trait]
pub trait VisibilityAnalyzer: Send + Sync {
    async fn analyze_visibility(
        &self,
        url: &str,
        keywords: &[String],
        competitor_urls: &[String],
    ) -> Result<VisibilityReport>;
}

/// Scores authority and trust signals of a crawled page.
#[async_trait]
pub trait TrustAnalyzer: Send + Sync {
    async fn analyze_trust(
        &self,
        url: &str,
        content: &str,
        author_hint: Option<&str>,
        competitor_urls: &[String],
    ) -> Result<TrustReport>;
}

#[async_trait]
pub trait RewriteGenerator: Send + Sync {
    async fn generate_rewrites(&self, request: &RewriteRequest) -> Result<RewriteAnalysis>;
}

/// The full set of stage collaborators a pipeline runs against.
#[derive(Clone)]
pub struct Collaborators {
    pub crawler: Arc<dyn Crawler>,
    pub semantic: Arc<dyn SemanticAnalyzer>,
    pub visibility: Arc<dyn VisibilityAnalyzer>,
    pub trust: Arc<dyn TrustAnalyzer>,
    pub rewrites: Arc<dyn RewriteGenerator>,
}
