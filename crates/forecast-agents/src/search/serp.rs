//! Google News through SerpAPI.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::{parse_published, Article, SearchTool, SearchWindow};
use crate::errors::ForecastError;

const SERP_ENDPOINT: &str = "https://serpapi.com/search.json";
/// Raw hits requested per query; ranking trims afterwards.
const RESULTS_PER_QUERY: u32 = 20;

pub struct GoogleNewsSearch {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    timeout_secs: u64,
}

impl GoogleNewsSearch {
    pub fn new(api_key: String, timeout_secs: u64) -> Result<Self, ForecastError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ForecastError::Configuration(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key,
            endpoint: SERP_ENDPOINT.to_string(),
            timeout_secs,
        })
    }

    /// Point at a different SerpAPI-compatible endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn params(&self, query: &str, window: &SearchWindow) -> Vec<(&'static str, String)> {
        vec![
            ("engine", "google".to_string()),
            ("q", query.to_string()),
            ("tbm", "nws".to_string()),
            ("tbs", window.tbs()),
            ("num", RESULTS_PER_QUERY.to_string()),
            ("hl", "en".to_string()),
            ("gl", "us".to_string()),
            ("api_key", self.api_key.clone()),
        ]
    }

    fn error(&self, message: impl Into<String>) -> ForecastError {
        ForecastError::Search {
            provider: "google_news".into(),
            message: message.into(),
        }
    }
}

/// Articles from a SerpAPI `news_results` payload.
pub fn parse_news_results(body: &Value) -> Vec<Article> {
    let Some(results) = body["news_results"].as_array() else {
        return Vec::new();
    };
    results
        .iter()
        .enumerate()
        .filter_map(|(i, item)| {
            let link = item["link"].as_str()?.to_string();
            // `source` is a plain string or `{ "name": ... }` depending on engine.
            let source = item["source"]
                .as_str()
                .or_else(|| item["source"]["name"].as_str())
                .unwrap_or("Unknown")
                .to_string();
            let date_text = item["date"].as_str().unwrap_or_default().to_string();
            Some(Article {
                title: item["title"].as_str().unwrap_or_default().to_string(),
                source,
                link,
                snippet: item["snippet"].as_str().unwrap_or_default().to_string(),
                published: parse_published(&date_text),
                date_text,
                position: item["position"]
                    .as_u64()
                    .map(|p| p as u32)
                    .unwrap_or(i as u32 + 1),
            })
        })
        .collect()
}

#[async_trait]
impl SearchTool for GoogleNewsSearch {
    fn name(&self) -> &str {
        "google_news"
    }

    async fn search(&self, query: &str, window: SearchWindow) -> Result<Vec<Article>, ForecastError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&self.params(query, &window))
            .send()
            .await
            .map_err(|e| ForecastError::from_transport(e, self.timeout_secs))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(self.error(format!("SerpAPI error ({status}): {body}")));
        }
        let body: Value = response
            .json()
            .await
            .map_err(|e| self.error(format!("unreadable response: {e}")))?;
        if let Some(message) = body["error"].as_str() {
            return Err(self.error(message));
        }
        Ok(parse_news_results(&body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    #[test]
    fn test_parse_news_results() {
        let body = json!({
            "news_results": [
                {
                    "position": 1,
                    "title": "Launch delayed",
                    "source": {"name": "Reuters"},
                    "link": "https://reuters.com/a",
                    "snippet": "The launch slipped.",
                    "date": "06/10/2024, 07:00 AM, +0000 UTC"
                },
                {"title": "No link", "source": "Blog"},
                {"title": "Second", "source": "Local", "link": "https://local/b"}
            ]
        });
        let articles = parse_news_results(&body);
        assert_eq!(articles.len(), 2);
        assert_eq!(articles[0].source, "Reuters");
        assert_eq!(articles[0].published, NaiveDate::from_ymd_opt(2024, 6, 10));
        assert_eq!(articles[1].position, 3);
        assert!(articles[1].published.is_none());
        assert!(parse_news_results(&json!({})).is_empty());
    }

    #[test]
    fn test_query_params() {
        let search = GoogleNewsSearch::new("key".into(), 5).unwrap();
        let window = SearchWindow::for_cutoff(
            NaiveDate::from_ymd_opt(2024, 7, 1),
            NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            30,
        );
        let params = search.params("fusion", &window);
        let get = |k: &str| params.iter().find(|(n, _)| *n == k).map(|(_, v)| v.as_str());
        assert_eq!(get("tbm"), Some("nws"));
        assert_eq!(get("tbs"), Some("cdr:1,cd_min:05/31/2024,cd_max:06/30/2024"));
        assert_eq!(get("num"), Some("20"));
        assert_eq!(get("api_key"), Some("key"));
    }
}
