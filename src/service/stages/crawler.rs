//! HTTP crawler - fetches a page and scores its on-page SEO basics.
//!
//! No JavaScript rendering. The score is the mean of a handful of
//! structural checks (title, description, viewport, canonical, single H1,
//! image alt text, indexability), scaled to 0-100.

use std::sync::OnceLock;
use std::time::Instant;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::USER_AGENT;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use super::Crawler;
use crate::domain::models::{CrawlOptions, CrawlResult, Heading};

pub struct HttpCrawler {
    client: Client,
}

impl HttpCrawler {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .build()
            .context("Failed to build crawler HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Crawler for HttpCrawler {
    async fn crawl(&self, url: &str, options: &CrawlOptions) -> Result<CrawlResult> {
        let parsed = Url::parse(url).with_context(|| format!("Invalid URL: {}", url))?;
        tracing::debug!("Crawling {}", parsed);
        let started = Instant::now();

        let response = self
            .client
            .get(parsed.as_str())
            .timeout(options.timeout)
            .header(USER_AGENT, options.user_agent.as_str())
            .send()
            .await
            .with_context(|| format!("Failed to fetch {}", url))?;

        let status = response.status();
        anyhow::ensure!(
            !status.is_client_error() && !status.is_server_error(),
            "{} returned HTTP {}",
            url,
            status.as_u16()
        );

        let html = response
            .text()
            .await
            .with_context(|| format!("Failed to read body of {}", url))?;
        let load_time_ms = started.elapsed().as_secs_f64() * 1000.0;

        let page = PageSummary::parse(&html);
        tracing::debug!(
            "Crawled {} - status: {}, words: {}, seo: {:.1}, load: {:.0}ms",
            url,
            status.as_u16(),
            page.word_count,
            page.seo_score,
            load_time_ms
        );

        Ok(CrawlResult {
            url: url.to_string(),
            status_code: status.as_u16(),
            title: page.title,
            meta_description: page.meta_description,
            headings: page.headings,
            word_count: page.word_count,
            content: page.content,
            author: page.author,
            load_time_ms,
            seo_score: page.seo_score,
        })
    }
}

/// What the crawler keeps from a parsed document.
///
/// `Html` is not `Send`, so parsing happens in one synchronous step after
/// the body has been read.
struct PageSummary {
    title: Option<String>,
    meta_description: Option<String>,
    headings: Vec<Heading>,
    content: String,
    word_count: usize,
    author: Option<String>,
    seo_score: f64,
}

impl PageSummary {
    fn parse(html: &str) -> Self {
        let document = Html::parse_document(html);
        let title = extract_title(&document);
        let meta_description = meta_content(&document, description_selector());
        let headings = extract_headings(&document);
        let content = extract_content(&document);

        let checks = [
            length_check(title.as_deref(), 30, 60),
            length_check(meta_description.as_deref(), 70, 160),
            check_viewport(&document),
            check_canonical(&document),
            check_single_h1(&headings),
            check_image_alt(&document),
            check_indexable(&document),
        ];
        let seo_score = checks.iter().sum::<f64>() / checks.len() as f64 * 100.0;

        Self {
            title,
            meta_description,
            word_count: content.split_whitespace().count(),
            author: meta_content(&document, author_selector()),
            headings,
            content,
            seo_score,
        }
    }
}

fn description_selector() -> &'static Selector {
    static SELECTOR: OnceLock<Selector> = OnceLock::new();
    SELECTOR.get_or_init(|| Selector::parse("meta[name='description']").unwrap())
}

fn author_selector() -> &'static Selector {
    static SELECTOR: OnceLock<Selector> = OnceLock::new();
    SELECTOR.get_or_init(|| Selector::parse("meta[name='author']").unwrap())
}

fn extract_title(document: &Html) -> Option<String> {
    static SELECTOR: OnceLock<Selector> = OnceLock::new();
    let selector = SELECTOR.get_or_init(|| Selector::parse("title").unwrap());
    document
        .select(selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

fn meta_content(document: &Html, selector: &Selector) -> Option<String> {
    document
        .select(selector)
        .next()
        .and_then(|el| el.value().attr("content"))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn extract_headings(document: &Html) -> Vec<Heading> {
    static SELECTOR: OnceLock<Selector> = OnceLock::new();
    let selector = SELECTOR.get_or_init(|| Selector::parse("h1, h2, h3, h4, h5, h6").unwrap());

    document
        .select(selector)
        .filter_map(|element| {
            let level = element.value().name().trim_start_matches('h').parse::<u8>().ok()?;
            let text = element.text().collect::<String>().trim().to_string();
            (!text.is_empty()).then_some(Heading { level, text })
        })
        .collect()
}

/// Visible body text with whitespace collapsed.
fn extract_content(document: &Html) -> String {
    static SELECTOR: OnceLock<Selector> = OnceLock::new();
    let selector = SELECTOR.get_or_init(|| Selector::parse("body").unwrap());

    let Some(body) = document.select(selector).next() else {
        return String::new();
    };

    let mut words: Vec<&str> = Vec::new();
    for node in body.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().filter_map(ElementRef::wrap).any(|el| {
            matches!(el.value().name(), "script" | "style" | "noscript" | "template")
        });
        if !hidden {
            words.extend(text.split_whitespace());
        }
    }
    words.join(" ")
}

// Each check returns a 0.0-1.0 score.

fn length_check(value: Option<&str>, min: usize, max: usize) -> f64 {
    match value.map(|v| v.chars().count()) {
        None | Some(0) => 0.0,
        Some(len) if len < min => 0.5,
        Some(len) if len > max => 0.7,
        Some(_) => 1.0,
    }
}

fn check_viewport(document: &Html) -> f64 {
    static SELECTOR: OnceLock<Selector> = OnceLock::new();
    let selector = SELECTOR.get_or_init(|| Selector::parse("meta[name='viewport']").unwrap());

    match meta_content(document, selector) {
        Some(v) if v.contains("width=device-width") => 1.0,
        Some(_) => 0.5,
        None => 0.0,
    }
}

fn check_canonical(document: &Html) -> f64 {
    static SELECTOR: OnceLock<Selector> = OnceLock::new();
    let selector = SELECTOR.get_or_init(|| Selector::parse("link[rel='canonical']").unwrap());

    let present = document
        .select(selector)
        .next()
        .and_then(|el| el.value().attr("href"))
        .is_some_and(|href| !href.trim().is_empty());
    if present {
        1.0
    } else {
        0.0
    }
}

fn check_single_h1(headings: &[Heading]) -> f64 {
    match headings.iter().filter(|h| h.level == 1).count() {
        0 => 0.0,
        1 => 1.0,
        _ => 0.5,
    }
}

fn check_image_alt(document: &Html) -> f64 {
    static SELECTOR: OnceLock<Selector> = OnceLock::new();
    let selector = SELECTOR.get_or_init(|| Selector::parse("img").unwrap());

    let (total, with_alt) = document.select(selector).fold((0usize, 0usize), |(total, ok), img| {
        let has_alt = img.value().attr("alt").is_some_and(|a| !a.trim().is_empty());
        (total + 1, ok + usize::from(has_alt))
    });

    if total == 0 {
        1.0
    } else {
        with_alt as f64 / total as f64
    }
}

fn check_indexable(document: &Html) -> f64 {
    static SELECTOR: OnceLock<Selector> = OnceLock::new();
    let selector = SELECTOR.get_or_init(|| Selector::parse("meta[name='robots']").unwrap());

    match meta_content(document, selector) {
        Some(robots) if robots.to_lowercase().contains("noindex") => 0.0,
        _ => 1.0,
    }
}
