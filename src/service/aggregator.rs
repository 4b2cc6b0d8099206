//! Turns phase results into the scored part of a report.
//!
//! Everything here is a pure function of `PhaseResults`: same input, same
//! score, insights and tasks in the same order.

use crate::domain::models::{
    ActionableTask, Effort, Impact, Insight, InsightCategory, Phase, PhaseResults, Priority,
    ScoreBreakdown, Scored, TaskCategory,
};
use crate::error::{AnalysisError, Result};

const SEO_WEIGHT: f64 = 0.25;
const VISIBILITY_WEIGHT: f64 = 0.35;
const TRUST_WEIGHT: f64 = 0.25;
const SEMANTIC_WEIGHT: f64 = 0.15;

const SEO_THRESHOLD: f64 = 70.0;
const VISIBILITY_THRESHOLD: f64 = 60.0;
const TRUST_THRESHOLD: f64 = 70.0;
const SEMANTIC_THRESHOLD: f64 = 60.0;
const STRONG_OVERALL: u8 = 80;

#[derive(Debug, Clone, PartialEq)]
pub struct Aggregation {
    pub breakdown: ScoreBreakdown,
    pub overall_score: u8,
    pub key_insights: Vec<Insight>,
    pub actionable_tasks: Vec<ActionableTask>,
}

pub fn aggregate(results: &PhaseResults) -> Result<Aggregation> {
    let breakdown = breakdown(results);
    let overall_score = overall_score(&breakdown)?;
    let key_insights = insights(results, &breakdown, overall_score);
    let actionable_tasks = tasks(&key_insights, results);

    Ok(Aggregation {
        breakdown,
        overall_score,
        key_insights,
        actionable_tasks,
    })
}

/// Mean score of a phase; exactly 0 when the phase produced nothing.
pub fn average<T: Scored>(items: &[T]) -> f64 {
    if items.is_empty() {
        return 0.0;
    }
    items.iter().map(Scored::score).sum::<f64>() / items.len() as f64
}

pub fn breakdown(results: &PhaseResults) -> ScoreBreakdown {
    ScoreBreakdown {
        seo: average(&results.crawl),
        visibility: average(&results.visibility),
        trust: average(&results.trust),
        semantic: average(&results.semantic),
    }
}

pub fn overall_score(breakdown: &ScoreBreakdown) -> Result<u8> {
    let weighted = breakdown.seo * SEO_WEIGHT
        + breakdown.visibility * VISIBILITY_WEIGHT
        + breakdown.trust * TRUST_WEIGHT
        + breakdown.semantic * SEMANTIC_WEIGHT;
    let rounded = weighted.round();

    if !rounded.is_finite() || !(0.0..=100.0).contains(&rounded) {
        return Err(AnalysisError::aggregation(format!(
            "overall score {} is outside 0-100 (breakdown: {:?})",
            weighted, breakdown
        )));
    }
    Ok(rounded as u8)
}

fn insight(
    category: InsightCategory,
    impact: Impact,
    title: &str,
    description: String,
    recommendation: &str,
) -> Insight {
    Insight {
        category,
        impact,
        title: title.to_string(),
        description,
        recommendation: recommendation.to_string(),
    }
}

/// Threshold insights, most impactful first.
pub fn insights(results: &PhaseResults, breakdown: &ScoreBreakdown, overall: u8) -> Vec<Insight> {
    let mut insights = Vec::new();

    if results.crawl.is_empty() {
        insights.push(insight(
            InsightCategory::Seo,
            Impact::Critical,
            "No pages could be analysed",
            format!(
                "None of the {} submitted page(s) could be crawled",
                results.failures.iter().filter(|f| f.phase == Phase::Crawl).count()
            ),
            "Check that the pages are reachable, return 200 and are not blocking crawlers",
        ));
    }

    if breakdown.seo < SEO_THRESHOLD {
        insights.push(insight(
            InsightCategory::Seo,
            Impact::High,
            "On-page SEO needs work",
            format!("Average on-page SEO score is {:.0}/100", breakdown.seo),
            "Fix titles, meta descriptions, heading structure and image alt text",
        ));
    }

    if breakdown.visibility < VISIBILITY_THRESHOLD {
        insights.push(insight(
            InsightCategory::Competitive,
            Impact::Critical,
            "Low search and AI visibility",
            format!("Average visibility score is {:.0}/100", breakdown.visibility),
            "Publish citable, answer-first content for the target keywords",
        ));
    }

    if breakdown.trust < TRUST_THRESHOLD {
        insights.push(insight(
            InsightCategory::Trust,
            Impact::High,
            "Weak trust signals",
            format!("Average trust score is {:.0}/100", breakdown.trust),
            "Add author bios, cite sources and surface credentials",
        ));
    }

    if breakdown.semantic < SEMANTIC_THRESHOLD {
        insights.push(insight(
            InsightCategory::Content,
            Impact::Medium,
            "Incomplete topic coverage",
            format!("Average topic coverage is {:.0}/100", breakdown.semantic),
            "Cover the missing subtopics for the target keywords",
        ));
    }

    if let Some(positioning) = results.competitive.as_ref().filter(|p| p.is_outranked()) {
        insights.push(insight(
            InsightCategory::Competitive,
            Impact::High,
            "Competitors are more visible",
            format!(
                "Ranked {} of {}, {:.0} points behind the competitor average",
                positioning.rank,
                positioning.field_size,
                -positioning.visibility_gap
            ),
            "Study the leading competitors' content and close the coverage gaps",
        ));
    }

    if overall >= STRONG_OVERALL {
        insights.push(insight(
            InsightCategory::Seo,
            Impact::Low,
            "Strong overall performance",
            format!("Overall score is {}/100", overall),
            "Keep monitoring and refresh content regularly",
        ));
    }

    // stable: equal impacts keep rule order
    insights.sort_by(|a, b| b.impact.rank().cmp(&a.impact.rank()));
    insights
}

/// Category, effort and timeframe for a task derived from an insight.
fn task_profile(category: InsightCategory) -> (TaskCategory, Effort, &'static str) {
    match category {
        InsightCategory::Seo => (TaskCategory::Technical, Effort::Medium, "1-2 weeks"),
        InsightCategory::Content => (TaskCategory::Content, Effort::Medium, "2-4 weeks"),
        InsightCategory::Trust => (TaskCategory::Authority, Effort::High, "1-2 months"),
        InsightCategory::Competitive => (TaskCategory::Visibility, Effort::High, "1-3 months"),
    }
}

pub fn tasks(insights: &[Insight], results: &PhaseResults) -> Vec<ActionableTask> {
    let mut tasks: Vec<ActionableTask> = insights
        .iter()
        .filter_map(|insight| {
            let priority = match insight.impact {
                Impact::Critical => Priority::Urgent,
                Impact::High => Priority::High,
                Impact::Medium | Impact::Low => return None,
            };
            let (category, effort, timeframe) = task_profile(insight.category);
            Some(ActionableTask {
                id: String::new(),
                title: insight.title.clone(),
                description: insight.recommendation.clone(),
                category,
                priority,
                effort,
                timeframe: timeframe.to_string(),
                url: None,
            })
        })
        .collect();

    for item in results.rewrites.iter().flatten() {
        if !item.data.has_rewrites() {
            continue;
        }
        tasks.push(ActionableTask {
            id: String::new(),
            title: format!("Apply content rewrites for {}", item.url),
            description: format!(
                "{} rewrite suggestion(s) ready to apply",
                item.data.suggestions.len()
            ),
            category: TaskCategory::Content,
            priority: Priority::Medium,
            effort: Effort::Low,
            timeframe: "1 week".to_string(),
            url: Some(item.url.clone()),
        });
    }

    tasks.sort_by(|a, b| b.priority.rank().cmp(&a.priority.rank()));
    for (idx, task) in tasks.iter_mut().enumerate() {
        task.id = format!("task-{}", idx + 1);
    }
    tasks
}
