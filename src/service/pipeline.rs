//! Runs the analysis phases for one request.
//!
//! Phases run one after another. Inside a phase every item is an
//! independent collaborator call; calls run concurrently up to the
//! configured limit through an order-preserving buffered stream, and a
//! failed item is logged, recorded and left out without touching the rest.

use std::future::Future;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio::time::Instant;

use crate::config::PipelineConfig;
use crate::domain::models::{
    AnalysisRequest, CompetitivePositioning, CompetitorStanding, CrawlOptions, ItemFailure, Phase,
    PhaseOutput, PhaseResults, PhaseStats, RewriteRequest, UrlResult, VisibilityReport,
};
use crate::service::aggregator::average;
use crate::service::stages::Collaborators;

const STRONG_SEO: f64 = 70.0;
const STRONG_TRUST: f64 = 70.0;

/// Outcome of fanning one phase out over its items.
struct PhaseRun<T> {
    items: Vec<UrlResult<T>>,
    stats: PhaseStats,
    failures: Vec<ItemFailure>,
}

impl<T> PhaseRun<T> {
    /// Record stats and failures on `results` and hand back the items.
    fn settle(self, results: &mut PhaseResults) -> Vec<UrlResult<T>> {
        results.stats.push(self.stats);
        results.failures.extend(self.failures);
        self.items
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Own,
    Competitor,
}

pub struct PipelineRunner {
    collaborators: Collaborators,
    concurrency: usize,
    item_timeout: Option<Duration>,
    crawl_options: CrawlOptions,
}

impl PipelineRunner {
    pub fn new(collaborators: Collaborators, config: &PipelineConfig) -> Self {
        Self {
            collaborators,
            concurrency: config.concurrency.max(1),
            item_timeout: config.item_timeout(),
            crawl_options: config.crawl_options(),
        }
    }

    /// Run every phase the request's mode calls for.
    ///
    /// Never fails: per-item errors end up in `PhaseResults::failures`.
    pub async fn run(&self, request: &AnalysisRequest) -> PhaseResults {
        let mut results = PhaseResults::default();
        let keywords = request.keywords.as_slice();
        let competitors = request.competitor_urls.as_slice();

        // 1. crawl
        let crawl = self
            .fan_out(
                Phase::Crawl,
                request.urls.iter().map(|url| (url.clone(), ())).collect(),
                |url, ()| async move {
                    self.collaborators.crawler.crawl(&url, &self.crawl_options).await
                },
            )
            .await
            .settle(&mut results);
        results.absorb(PhaseOutput::Crawl(crawl));
        if results.crawl.is_empty() {
            tracing::warn!(
                "No URL could be crawled ({} attempted), continuing with empty content",
                request.urls.len()
            );
        }

        // 2. semantic
        let run = self
            .fan_out(
                Phase::Semantic,
                results.crawl.iter().map(|c| (c.url.clone(), &c.data)).collect(),
                |_, page| async move {
                    self.collaborators
                        .semantic
                        .analyze(&page.content, keywords, page.title.as_deref())
                        .await
                },
            )
            .await;
        let semantic = run.settle(&mut results);
        results.absorb(PhaseOutput::Semantic(semantic));

        // 3. visibility, own URLs and competitors in one phase
        let targets = request
            .urls
            .iter()
            .map(|url| (url.clone(), Side::Own))
            .chain(competitors.iter().map(|url| (url.clone(), Side::Competitor)))
            .collect();
        let visibility = self
            .fan_out(Phase::Visibility, targets, |url, side| async move {
                let rivals: &[String] = match side {
                    Side::Own => competitors,
                    Side::Competitor => &[],
                };
                self.collaborators
                    .visibility
                    .analyze_visibility(&url, keywords, rivals)
                    .await
                    .map(|report| (side, report))
            })
            .await
            .settle(&mut results);
        let (own, rivals): (Vec<_>, Vec<_>) = visibility
            .into_iter()
            .partition(|item| item.data.0 == Side::Own);
        results.absorb(PhaseOutput::Visibility {
            own: untag(own),
            competitors: untag(rivals),
        });

        // 4. trust
        let run = self
            .fan_out(
                Phase::Trust,
                results.crawl.iter().map(|c| (c.url.clone(), &c.data)).collect(),
                |url, page| async move {
                    self.collaborators
                        .trust
                        .analyze_trust(&url, &page.content, page.author.as_deref(), competitors)
                        .await
                },
            )
            .await;
        let trust = run.settle(&mut results);
        results.absorb(PhaseOutput::Trust(trust));

        // 5. rewrites
        if request.mode.runs_rewrites() {
            let inputs = results
                .crawl
                .iter()
                .map(|c| {
                    let missing_topics = results
                        .semantic
                        .iter()
                        .find(|s| s.url == c.url)
                        .map(|s| s.data.missing_topics.clone())
                        .unwrap_or_default();
                    let rewrite = RewriteRequest {
                        url: c.url.clone(),
                        title: c.data.title.clone(),
                        content: c.data.content.clone(),
                        keywords: keywords.to_vec(),
                        missing_topics,
                    };
                    (c.url.clone(), rewrite)
                })
                .collect();
            let rewrites = self
                .fan_out(Phase::Rewrite, inputs, |_, rewrite| async move {
                    self.collaborators.rewrites.generate_rewrites(&rewrite).await
                })
                .await
                .settle(&mut results);
            results.absorb(PhaseOutput::Rewrite(rewrites));
        }

        // 6. competitive positioning
        if request.mode.runs_competitive() {
            let started = Instant::now();
            let positioning = position(&results);
            results.stats.push(PhaseStats {
                phase: Phase::Competitive,
                attempted: 1,
                succeeded: 1,
                failed: 0,
                elapsed_ms: started.elapsed().as_millis() as u64,
            });
            results.absorb(PhaseOutput::Competitive(positioning));
        }

        results
    }

    async fn fan_out<I, T, F, Fut>(
        &self,
        phase: Phase,
        inputs: Vec<(String, I)>,
        call: F,
    ) -> PhaseRun<T>
    where
        F: Fn(String, I) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let started = Instant::now();
        let attempted = inputs.len();
        let item_timeout = self.item_timeout;

        let outcomes: Vec<(String, anyhow::Result<T>)> = stream::iter(inputs)
            .map(|(url, input)| {
                let work = call(url.clone(), input);
                async move {
                    let outcome = match item_timeout {
                        Some(limit) => match tokio::time::timeout(limit, work).await {
                            Ok(outcome) => outcome,
                            Err(_) => Err(anyhow::anyhow!("timed out after {:?}", limit)),
                        },
                        None => work.await,
                    };
                    (url, outcome)
                }
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut items = Vec::with_capacity(attempted);
        let mut failures = Vec::new();
        for (url, outcome) in outcomes {
            match outcome {
                Ok(data) => items.push(UrlResult::new(url, data)),
                Err(e) => {
                    tracing::warn!("{} failed for {}: {:#}", phase.as_str(), url, e);
                    failures.push(ItemFailure {
                        phase,
                        url,
                        message: format!("{:#}", e),
                    });
                }
            }
        }

        let stats = PhaseStats {
            phase,
            attempted,
            succeeded: items.len(),
            failed: failures.len(),
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        tracing::debug!(
            "Phase {} finished: {}/{} succeeded in {}ms",
            phase.as_str(),
            stats.succeeded,
            stats.attempted,
            stats.elapsed_ms
        );

        PhaseRun {
            items,
            stats,
            failures,
        }
    }
}

fn untag(items: Vec<UrlResult<(Side, VisibilityReport)>>) -> Vec<UrlResult<VisibilityReport>> {
    items
        .into_iter()
        .map(|item| UrlResult::new(item.url, item.data.1))
        .collect()
}

/// Place the site among its competitors using what the earlier phases
/// produced.
pub fn position(results: &PhaseResults) -> CompetitivePositioning {
    let own_visibility = average(&results.visibility);
    let competitors: Vec<CompetitorStanding> = results
        .competitor_visibility
        .iter()
        .map(|item| CompetitorStanding {
            url: item.url.clone(),
            visibility_score: item.data.visibility_score,
        })
        .collect();
    let competitor_average = average(&results.competitor_visibility);
    let visibility_gap = if competitors.is_empty() {
        0.0
    } else {
        own_visibility - competitor_average
    };
    let rank = 1 + competitors
        .iter()
        .filter(|c| c.visibility_score > own_visibility)
        .count();

    let mut strengths = Vec::new();
    let mut weaknesses = Vec::new();

    if !competitors.is_empty() {
        if visibility_gap >= 0.0 {
            strengths.push(format!(
                "Visibility {:.0} points above the competitor average",
                visibility_gap
            ));
        }
        for leader in competitors
            .iter()
            .filter(|c| c.visibility_score > own_visibility)
        {
            weaknesses.push(format!(
                "Less visible than {} ({:.0} vs {:.0})",
                leader.url, leader.visibility_score, own_visibility
            ));
        }
    }

    if !results.crawl.is_empty() {
        let seo = average(&results.crawl);
        if seo >= STRONG_SEO {
            strengths.push(format!("Solid on-page SEO ({:.0}/100)", seo));
        } else {
            weaknesses.push(format!("On-page SEO below benchmark ({:.0}/100)", seo));
        }
    }
    if !results.trust.is_empty() {
        let trust = average(&results.trust);
        if trust >= STRONG_TRUST {
            strengths.push(format!("Credible trust signals ({:.0}/100)", trust));
        } else {
            weaknesses.push(format!("Trust signals below benchmark ({:.0}/100)", trust));
        }
    }

    CompetitivePositioning {
        own_visibility,
        competitor_average,
        visibility_gap,
        rank,
        field_size: competitors.len() + 1,
        competitors,
        strengths,
        weaknesses,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::AnalysisMode;
    use crate::test_utils::fixtures::{self, RIVAL, SITE_A, SITE_B};
    use crate::test_utils::ScriptedStages;

    fn runner(stages: &std::sync::Arc<ScriptedStages>) -> PipelineRunner {
        let config = PipelineConfig {
            concurrency: 2,
            ..Default::default()
        };
        PipelineRunner::new(stages.collaborators(), &config)
    }

    #[tokio::test]
    async fn every_phase_runs_for_comprehensive_mode() {
        let stages = ScriptedStages::new();
        let results = runner(&stages).run(&fixtures::request()).await;

        assert_eq!(results.crawl.len(), 2);
        assert_eq!(results.semantic.len(), 2);
        assert_eq!(results.visibility.len(), 2);
        assert_eq!(results.trust.len(), 2);
        assert_eq!(results.rewrites.as_ref().map(Vec::len), Some(2));
        assert!(results.competitive.is_some());
        assert!(results.failures.is_empty());

        let phases: Vec<Phase> = results.stats.iter().map(|s| s.phase).collect();
        assert_eq!(
            phases,
            vec![
                Phase::Crawl,
                Phase::Semantic,
                Phase::Visibility,
                Phase::Trust,
                Phase::Rewrite,
                Phase::Competitive
            ]
        );
    }

    #[tokio::test]
    async fn results_keep_request_order() {
        let stages = ScriptedStages::new();
        let request = AnalysisRequest::new(
            (0..8).map(|i| format!("https://site.test/{}", i)),
            ["seo"],
            "u1",
        );
        let results = runner(&stages).run(&request).await;

        let urls: Vec<&str> = results.crawl.iter().map(|c| c.url.as_str()).collect();
        let expected: Vec<&str> = request.urls.iter().map(String::as_str).collect();
        assert_eq!(urls, expected);
        assert!(results.crawl.iter().all(|c| c.url == c.data.url));
    }

    #[tokio::test]
    async fn seo_focused_skips_conditional_phases() {
        let stages = ScriptedStages::new();
        let request = fixtures::request().with_mode(AnalysisMode::SeoFocused);
        let results = runner(&stages).run(&request).await;

        assert!(results.rewrites.is_none());
        assert!(results.competitive.is_none());
        assert_eq!(stages.calls(Phase::Rewrite), 0);
    }

    #[tokio::test]
    async fn failed_crawl_is_excluded_downstream() {
        let stages = ScriptedStages::new();
        stages.fail(Phase::Crawl, SITE_B);
        let results = runner(&stages).run(&fixtures::request()).await;

        assert_eq!(results.crawl.len(), 1);
        assert_eq!(results.crawl[0].url, SITE_A);
        assert_eq!(stages.calls(Phase::Semantic), 1);
        assert_eq!(stages.calls(Phase::Trust), 1);
        // visibility covers every submitted URL
        assert_eq!(results.visibility.len(), 2);

        assert_eq!(results.failures.len(), 1);
        assert_eq!(results.failures[0].phase, Phase::Crawl);
        assert_eq!(results.failures[0].url, SITE_B);
        let crawl_stats = &results.stats[0];
        assert_eq!((crawl_stats.attempted, crawl_stats.succeeded, crawl_stats.failed), (2, 1, 1));
    }

    #[tokio::test]
    async fn zero_crawled_pages_is_not_fatal() {
        let stages = ScriptedStages::new();
        stages.fail_phase(Phase::Crawl);
        let results = runner(&stages).run(&fixtures::request()).await;

        assert!(results.crawl.is_empty());
        assert!(results.semantic.is_empty());
        assert_eq!(results.visibility.len(), 2);
        assert_eq!(stages.calls(Phase::Semantic), 0);
    }

    #[tokio::test]
    async fn competitor_reports_stay_separate() {
        let stages = ScriptedStages::new();
        stages.set_url_score(Phase::Visibility, RIVAL, 90.0);
        let request = fixtures::request()
            .with_mode(AnalysisMode::Competitive)
            .with_competitors([RIVAL]);
        let results = runner(&stages).run(&request).await;

        assert_eq!(results.visibility.len(), 2);
        assert_eq!(results.competitor_visibility.len(), 1);
        assert_eq!(results.competitor_visibility[0].url, RIVAL);

        let positioning = results.competitive.unwrap();
        assert_eq!(positioning.own_visibility, 60.0);
        assert_eq!(positioning.competitor_average, 90.0);
        assert_eq!(positioning.visibility_gap, -30.0);
        assert_eq!((positioning.rank, positioning.field_size), (2, 2));
        assert!(positioning.is_outranked());
        assert!(positioning.weaknesses.iter().any(|w| w.contains(RIVAL)));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_items_time_out_individually() {
        let stages = ScriptedStages::new();
        stages.set_delay(Duration::from_secs(5));
        let config = PipelineConfig {
            concurrency: 4,
            item_timeout_secs: Some(1),
            ..Default::default()
        };
        let runner = PipelineRunner::new(stages.collaborators(), &config);
        let results = runner.run(&fixtures::request()).await;

        assert!(results.crawl.is_empty());
        assert!(results
            .failures
            .iter()
            .all(|f| f.message.contains("timed out")));
        assert_eq!(results.failures.len(), 4); // 2 crawl + 2 visibility
    }

    #[tokio::test]
    async fn invalid_scores_become_failures() {
        let stages = ScriptedStages::new();
        stages.set_url_score(Phase::Trust, SITE_A, f64::NAN);
        let results = runner(&stages).run(&fixtures::request()).await;

        assert_eq!(results.trust.len(), 1);
        assert_eq!(results.trust[0].url, SITE_B);
        let trust_stats = results.stats.iter().find(|s| s.phase == Phase::Trust).unwrap();
        assert_eq!((trust_stats.succeeded, trust_stats.failed), (1, 1));
    }
}
