//! News search for advocate research.
//!
//! A [`SearchTool`] returns raw articles for a query inside a
//! [`SearchWindow`]. The [`Researcher`] wraps a tool with the shared
//! policy: cutoff guard, dedup by link, credible-source ranking, a result
//! cap, per-query memoization, and text formatting for prompts. Search
//! failures never fail a turn; they produce an empty report.

pub mod serp;
pub mod tavily;

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{SearchProvider, SearchSettings};
use crate::errors::ForecastError;

pub use serp::GoogleNewsSearch;
pub use tavily::TavilySearch;

/// Outlets ranked ahead of others at equal position.
pub const CREDIBLE_SOURCES: &[&str] = &[
    "Reuters",
    "Associated Press",
    "BBC",
    "NPR",
    "Wall Street Journal",
    "Financial Times",
    "Bloomberg",
    "The Economist",
    "Nature",
    "Science",
    "IEEE Spectrum",
    "New York Times",
    "Washington Post",
    "CNN",
    "CNBC",
];

/// Articles older than this relative to today are dropped when their date
/// is unknown and a cutoff is in force.
const UNDATED_GRACE_DAYS: i64 = 30;

/// One news hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    pub source: String,
    pub link: String,
    pub snippet: String,
    /// Date as the provider printed it.
    pub date_text: String,
    pub published: Option<NaiveDate>,
    /// Provider rank, 1-based.
    pub position: u32,
}

impl Article {
    pub fn is_credible(&self) -> bool {
        is_credible_source(&self.source)
    }
}

pub fn is_credible_source(source: &str) -> bool {
    let source = source.to_lowercase();
    CREDIBLE_SOURCES
        .iter()
        .any(|c| source.contains(&c.to_lowercase()))
}

/// Best-effort publication date from the formats news APIs emit.
pub fn parse_published(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.date_naive());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return Some(dt.date_naive());
    }
    // "06/10/2024, 07:00 AM, +0000 UTC" and "2024-06-10 12:00:00"
    let head = text.split([',', ' ', 'T']).next().unwrap_or(text);
    ["%Y-%m-%d", "%m/%d/%Y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(head, fmt).ok())
}

// ── Window ────────────────────────────────────────────────────────────────────

/// Inclusive date range a search may cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub cutoff: Option<NaiveDate>,
}

impl SearchWindow {
    /// Window ending the day before `cutoff`, or at `today` without one.
    pub fn for_cutoff(cutoff: Option<NaiveDate>, today: NaiveDate, lookback_days: i64) -> Self {
        let end = match cutoff {
            Some(c) => (c - Duration::days(1)).min(today),
            None => today,
        };
        Self {
            start: end - Duration::days(lookback_days.max(1)),
            end,
            cutoff,
        }
    }

    /// Whether an article may reach an advocate.
    pub fn admits(&self, article: &Article, today: NaiveDate) -> bool {
        let Some(cutoff) = self.cutoff else {
            return true;
        };
        match article.published {
            Some(date) => date < cutoff,
            None => cutoff >= today - Duration::days(UNDATED_GRACE_DAYS),
        }
    }

    /// Google `tbs` custom date range.
    pub fn tbs(&self) -> String {
        format!(
            "cdr:1,cd_min:{},cd_max:{}",
            self.start.format("%m/%d/%Y"),
            self.end.format("%m/%d/%Y")
        )
    }
}

// ── Tool trait ────────────────────────────────────────────────────────────────

/// A news provider.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SearchTool: Send + Sync {
    fn name(&self) -> &str;

    async fn search(&self, query: &str, window: SearchWindow) -> Result<Vec<Article>, ForecastError>;
}

/// Provider used when no search key is configured. Always empty.
pub struct NoSearch;

#[async_trait]
impl SearchTool for NoSearch {
    fn name(&self) -> &str {
        "none"
    }

    async fn search(&self, _query: &str, _window: SearchWindow) -> Result<Vec<Article>, ForecastError> {
        Ok(Vec::new())
    }
}

/// Build the configured provider.
pub fn tool_from_settings(settings: &SearchSettings) -> Result<Arc<dyn SearchTool>, ForecastError> {
    let missing = |var: &str| ForecastError::Configuration(format!("{var} is not set"));
    Ok(match settings.resolved_provider() {
        SearchProvider::GoogleNews => {
            let key = settings.serp_api_key.clone().ok_or_else(|| missing("SERP_API_KEY"))?;
            Arc::new(GoogleNewsSearch::new(key, settings.timeout_secs)?)
        }
        SearchProvider::Tavily => {
            let key = settings
                .tavily_api_key
                .clone()
                .ok_or_else(|| missing("TAVILY_API_KEY"))?;
            Arc::new(TavilySearch::new(key, settings.timeout_secs)?)
        }
        SearchProvider::Auto | SearchProvider::None => Arc::new(NoSearch),
    })
}

// ── Ranking & formatting ──────────────────────────────────────────────────────

/// Dedup by link, order by provider position with credible outlets first
/// among ties, keep at most `limit`.
pub fn rank_articles(articles: Vec<Article>, limit: usize) -> Vec<Article> {
    let mut seen = HashSet::new();
    let mut unique: Vec<Article> = articles
        .into_iter()
        .filter(|a| !a.link.is_empty() && seen.insert(a.link.clone()))
        .collect();
    unique.sort_by_key(|a| (a.position, !a.is_credible()));
    unique.truncate(limit);
    unique
}

/// Text block embedded in an advocate prompt.
pub fn format_articles(query: &str, articles: &[Article], window: &SearchWindow) -> String {
    if articles.is_empty() {
        return format!("No articles found for '{query}'.");
    }
    let mut out = format!("Found {} articles for '{query}':\n\n", articles.len());
    for (i, a) in articles.iter().enumerate() {
        out.push_str(&format!(
            "{}. **{}**\n   Source: {}\n   Date: {}\n   Summary: {}\n   URL: {}\n\n",
            i + 1,
            a.title,
            a.source,
            if a.date_text.is_empty() { "unknown" } else { &a.date_text },
            a.snippet,
            a.link
        ));
    }
    out.push_str(&format!("Search period: {} to {}", window.start, window.end));
    out
}

// ── Researcher ────────────────────────────────────────────────────────────────

/// Evidence gathered for one turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchReport {
    pub query: String,
    pub articles: Vec<Article>,
    /// Formatted block for the prompt.
    pub text: String,
    /// Provider error, if the search failed.
    pub error: Option<String>,
}

/// Search policy around a [`SearchTool`].
pub struct Researcher {
    tool: Arc<dyn SearchTool>,
    max_articles: usize,
    lookback_days: i64,
    cache: Mutex<HashMap<String, Vec<Article>>>,
}

impl Researcher {
    pub fn new(tool: Arc<dyn SearchTool>) -> Self {
        let defaults = SearchSettings::default();
        Self {
            tool,
            max_articles: defaults.max_articles,
            lookback_days: defaults.lookback_days,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_limits(mut self, max_articles: usize, lookback_days: i64) -> Self {
        self.max_articles = max_articles.max(1);
        self.lookback_days = lookback_days;
        self
    }

    pub fn provider(&self) -> &str {
        self.tool.name()
    }

    /// Search `query` for evidence published before `cutoff`. Never fails.
    pub async fn research(&self, query: &str, cutoff: Option<NaiveDate>) -> ResearchReport {
        let today = Utc::now().date_naive();
        let window = SearchWindow::for_cutoff(cutoff, today, self.lookback_days);
        let cache_key = format!("{query}|{}|{}", window.start, window.end);

        let cached = self
            .cache
            .lock()
            .ok()
            .and_then(|cache| cache.get(&cache_key).cloned());
        if let Some(articles) = cached {
            debug!(query, provider = self.tool.name(), "search cache hit");
            return ResearchReport {
                query: query.to_string(),
                text: format_articles(query, &articles, &window),
                articles,
                error: None,
            };
        }

        match self.tool.search(query, window).await {
            Ok(raw) => {
                let total = raw.len();
                let admitted: Vec<Article> =
                    raw.into_iter().filter(|a| window.admits(a, today)).collect();
                if admitted.len() < total {
                    debug!(
                        query,
                        filtered = total - admitted.len(),
                        "dropped articles at or after cutoff"
                    );
                }
                let articles = rank_articles(admitted, self.max_articles);
                if let Ok(mut cache) = self.cache.lock() {
                    cache.insert(cache_key, articles.clone());
                }
                ResearchReport {
                    query: query.to_string(),
                    text: format_articles(query, &articles, &window),
                    articles,
                    error: None,
                }
            }
            Err(e) => {
                warn!(query, provider = self.tool.name(), error = %e, "search failed");
                ResearchReport {
                    query: query.to_string(),
                    articles: Vec::new(),
                    text: format!("Search for '{query}' failed; no evidence available."),
                    error: Some(e.to_string()),
                }
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::article;
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_parse_published_formats() {
        let june10 = Some(date(2024, 6, 10));
        assert_eq!(parse_published("2024-06-10"), june10);
        assert_eq!(parse_published("2024-06-10T08:30:00Z"), june10);
        assert_eq!(parse_published("2024-06-10 08:30:00"), june10);
        assert_eq!(parse_published("06/10/2024, 07:00 AM, +0000 UTC"), june10);
        assert_eq!(parse_published("Mon, 10 Jun 2024 12:00:00 GMT"), june10);
        assert_eq!(parse_published("3 days ago"), None);
        assert_eq!(parse_published(""), None);
    }

    #[test]
    fn test_window_ends_day_before_cutoff() {
        let w = SearchWindow::for_cutoff(Some(date(2024, 7, 1)), date(2025, 1, 1), 30);
        assert_eq!(w.end, date(2024, 6, 30));
        assert_eq!(w.start, date(2024, 5, 31));
        assert_eq!(w.tbs(), "cdr:1,cd_min:05/31/2024,cd_max:06/30/2024");

        let open = SearchWindow::for_cutoff(None, date(2025, 1, 1), 30);
        assert_eq!(open.end, date(2025, 1, 1));
    }

    #[test]
    fn test_cutoff_guard() {
        let today = date(2025, 1, 1);
        let w = SearchWindow::for_cutoff(Some(date(2024, 7, 1)), today, 365);
        assert!(w.admits(&article("a", "x", 1, Some("2024-06-30")), today));
        assert!(!w.admits(&article("b", "x", 1, Some("2024-07-01")), today));
        // Undated and the cutoff is long past: excluded.
        assert!(!w.admits(&article("c", "x", 1, None), today));

        let recent = SearchWindow::for_cutoff(Some(date(2024, 12, 20)), today, 365);
        assert!(recent.admits(&article("d", "x", 1, None), today));
    }

    #[test]
    fn test_rank_dedups_and_prefers_credible() {
        let ranked = rank_articles(
            vec![
                article("l1", "Some Blog", 2, None),
                article("l2", "Reuters", 2, None),
                article("l1", "Some Blog", 5, None),
                article("l3", "Local Paper", 1, None),
                article("", "Empty", 1, None),
            ],
            2,
        );
        let links: Vec<_> = ranked.iter().map(|a| a.link.as_str()).collect();
        assert_eq!(links, vec!["l3", "l2"]);
    }

    #[test]
    fn test_format_articles() {
        let window = SearchWindow::for_cutoff(None, date(2024, 6, 30), 29);
        let text = format_articles(
            "fusion",
            &[article("https://x/1", "BBC News", 1, Some("2024-06-01"))],
            &window,
        );
        assert!(text.starts_with("Found 1 articles for 'fusion':"));
        assert!(text.contains("1. **title https://x/1**"));
        assert!(text.contains("Source: BBC News"));
        assert!(text.ends_with("Search period: 2024-06-01 to 2024-06-30"));
        assert!(format_articles("q", &[], &window).contains("No articles"));
    }

    #[tokio::test]
    async fn test_researcher_memoizes_queries() {
        let mut tool = MockSearchTool::new();
        tool.expect_name().return_const("mock".to_string());
        tool.expect_search()
            .times(1)
            .returning(|_, _| Ok(vec![article("https://x/1", "Reuters", 1, None)]));

        let researcher = Researcher::new(Arc::new(tool));
        let first = researcher.research("fusion power", None).await;
        let second = researcher.research("fusion power", None).await;
        assert_eq!(first.articles.len(), 1);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_researcher_absorbs_failures() {
        let mut tool = MockSearchTool::new();
        tool.expect_name().return_const("mock".to_string());
        tool.expect_search().returning(|_, _| {
            Err(ForecastError::Search {
                provider: "mock".into(),
                message: "quota".into(),
            })
        });

        let report = Researcher::new(Arc::new(tool)).research("q", None).await;
        assert!(report.articles.is_empty());
        assert!(report.error.unwrap().contains("quota"));
    }

    #[tokio::test]
    async fn test_researcher_filters_post_cutoff() {
        let mut tool = MockSearchTool::new();
        tool.expect_name().return_const("mock".to_string());
        tool.expect_search().returning(|_, _| {
            Ok(vec![
                article("before", "AP", 1, Some("2024-03-01")),
                article("after", "AP", 2, Some("2024-03-15")),
            ])
        });

        let report = Researcher::new(Arc::new(tool))
            .research("q", Some(date(2024, 3, 10)))
            .await;
        assert_eq!(report.articles.len(), 1);
        assert_eq!(report.articles[0].link, "before");
    }

    #[tokio::test]
    async fn test_no_search_is_empty() {
        let window = SearchWindow::for_cutoff(None, date(2024, 1, 1), 10);
        assert!(NoSearch.search("q", window).await.unwrap().is_empty());
    }
}
