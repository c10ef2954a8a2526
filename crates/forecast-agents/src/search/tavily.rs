//! Tavily news search.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};

use super::{parse_published, Article, SearchTool, SearchWindow};
use crate::errors::ForecastError;

const TAVILY_ENDPOINT: &str = "https://api.tavily.com/search";
const MAX_RESULTS: u32 = 10;
/// Extra days requested beyond the window so older articles still surface.
const RANGE_BUFFER_DAYS: i64 = 30;

pub struct TavilySearch {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    timeout_secs: u64,
}

impl TavilySearch {
    pub fn new(api_key: String, timeout_secs: u64) -> Result<Self, ForecastError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ForecastError::Configuration(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key,
            endpoint: TAVILY_ENDPOINT.to_string(),
            timeout_secs,
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn request_body(&self, query: &str, window: &SearchWindow) -> Value {
        // Tavily only filters by "last N days"; reach back far enough to
        // cover the window start and let the cutoff guard trim the rest.
        let days = (Utc::now().date_naive() - window.start).num_days() + RANGE_BUFFER_DAYS;
        json!({
            "api_key": self.api_key,
            "query": query,
            "topic": "news",
            "search_depth": "basic",
            "max_results": MAX_RESULTS,
            "days": days.max(1),
        })
    }
}

/// Articles from a Tavily `results` payload.
pub fn parse_results(body: &Value) -> Vec<Article> {
    let Some(results) = body["results"].as_array() else {
        return Vec::new();
    };
    results
        .iter()
        .enumerate()
        .filter_map(|(i, item)| {
            let link = item["url"].as_str()?.to_string();
            let date_text = ["published_date", "date", "published"]
                .iter()
                .find_map(|k| item[*k].as_str())
                .unwrap_or_default()
                .to_string();
            let source = reqwest::Url::parse(&link)
                .ok()
                .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_string()))
                .unwrap_or_else(|| "Unknown".to_string());
            Some(Article {
                title: item["title"].as_str().unwrap_or_default().to_string(),
                source,
                link,
                snippet: item["content"].as_str().unwrap_or_default().chars().take(300).collect(),
                published: parse_published(&date_text),
                date_text,
                position: i as u32 + 1,
            })
        })
        .collect()
}

#[async_trait]
impl SearchTool for TavilySearch {
    fn name(&self) -> &str {
        "tavily"
    }

    async fn search(&self, query: &str, window: SearchWindow) -> Result<Vec<Article>, ForecastError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&self.request_body(query, &window))
            .send()
            .await
            .map_err(|e| ForecastError::from_transport(e, self.timeout_secs))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ForecastError::Search {
                provider: "tavily".into(),
                message: format!("Tavily API error ({status}): {body}"),
            });
        }
        let body: Value = response.json().await.map_err(|e| ForecastError::Search {
            provider: "tavily".into(),
            message: format!("unreadable response: {e}"),
        })?;
        Ok(parse_results(&body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_parse_results() {
        let body = json!({
            "results": [
                {
                    "title": "Rates held",
                    "url": "https://www.bloomberg.com/news/x",
                    "content": "The central bank held rates.",
                    "published_date": "Mon, 10 Jun 2024 12:00:00 GMT"
                },
                {"title": "no url"}
            ]
        });
        let articles = parse_results(&body);
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].source, "bloomberg.com");
        assert!(articles[0].is_credible());
        assert_eq!(articles[0].published, NaiveDate::from_ymd_opt(2024, 6, 10));
    }

    #[test]
    fn test_request_covers_window() {
        let search = TavilySearch::new("tv".into(), 5).unwrap();
        let today = Utc::now().date_naive();
        let window = SearchWindow::for_cutoff(None, today, 90);
        let body = search.request_body("q", &window);
        assert_eq!(body["topic"], "news");
        assert_eq!(body["days"], 120);
    }
}
