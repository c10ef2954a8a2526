//! Runtime configuration.
//!
//! Layered as built-in defaults, then an optional TOML file, then
//! environment variables. CLI flags are applied last by the binary.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use forecast_coordination::TimeHorizon;
use serde::{Deserialize, Serialize};

use crate::errors::ForecastError;

/// Free model used when `DEFAULT_MODEL` is unset.
pub const DEFAULT_MODEL: &str = "meta-llama/llama-3.1-8b-instruct:free";
pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Which news provider feeds the advocates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchProvider {
    /// Google News if a SERP key is present, else Tavily if its key is
    /// present, else no search.
    #[default]
    Auto,
    GoogleNews,
    Tavily,
    None,
}

impl FromStr for SearchProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "auto" => Ok(Self::Auto),
            "google_news" | "google" | "serp" | "serpapi" => Ok(Self::GoogleNews),
            "tavily" => Ok(Self::Tavily),
            "none" | "off" => Ok(Self::None),
            other => Err(format!("unknown search provider: {other}")),
        }
    }
}

/// OpenRouter chat-completions endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.into(),
            model: DEFAULT_MODEL.into(),
            temperature: 0.7,
            max_tokens: 2048,
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub provider: SearchProvider,
    #[serde(skip_serializing)]
    pub serp_api_key: Option<String>,
    #[serde(skip_serializing)]
    pub tavily_api_key: Option<String>,
    /// Articles kept per query after dedup and ranking.
    pub max_articles: usize,
    /// Search window length ending at the cutoff (or today).
    pub lookback_days: i64,
    pub timeout_secs: u64,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            provider: SearchProvider::Auto,
            serp_api_key: None,
            tavily_api_key: None,
            max_articles: 15,
            lookback_days: 365,
            timeout_secs: 30,
        }
    }
}

impl SearchSettings {
    /// Provider after resolving `Auto` against available keys.
    pub fn resolved_provider(&self) -> SearchProvider {
        match self.provider {
            SearchProvider::Auto if self.serp_api_key.is_some() => SearchProvider::GoogleNews,
            SearchProvider::Auto if self.tavily_api_key.is_some() => SearchProvider::Tavily,
            SearchProvider::Auto => SearchProvider::None,
            explicit => explicit,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebateSettings {
    pub rounds: u32,
    /// Advisory number of searches each advocate may spend.
    pub search_budget: u32,
    pub horizons: Vec<TimeHorizon>,
}

impl Default for DebateSettings {
    fn default() -> Self {
        Self {
            rounds: 3,
            search_budget: 10,
            horizons: TimeHorizon::default_set(),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    pub model: ModelSettings,
    pub search: SearchSettings,
    pub debate: DebateSettings,
    /// Concurrent forecasts during a benchmark.
    pub workers: usize,
    /// JSON session store; `None` disables persistence.
    pub store_path: Option<PathBuf>,
}

impl ForecastConfig {
    /// Defaults, then `path` if given, then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).context(format!("Failed to read {}", path.display()))?;
        let config: ForecastConfig =
            toml::from_str(&content).context("Failed to parse forecast config TOML")?;
        Ok(config)
    }

    /// Overlay environment variables read through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = var("OPENROUTER_API_KEY") {
            self.model.api_key = Some(key);
        }
        if let Some(url) = var("OPENROUTER_BASE_URL") {
            self.model.base_url = url;
        }
        if let Some(model) = var("DEFAULT_MODEL") {
            self.model.model = model;
        }
        if let Some(key) = var("SERP_API_KEY") {
            self.search.serp_api_key = Some(key);
        }
        if let Some(key) = var("TAVILY_API_KEY") {
            self.search.tavily_api_key = Some(key);
        }
        if let Some(provider) = var("FORECAST_SEARCH_PROVIDER") {
            match provider.parse() {
                Ok(p) => self.search.provider = p,
                Err(e) => tracing::warn!("Ignoring FORECAST_SEARCH_PROVIDER: {e}"),
            }
        }
        if let Some(path) = var("FORECAST_STORE_PATH") {
            self.store_path = Some(PathBuf::from(path));
        }
    }

    /// Reject settings no run could succeed with.
    pub fn validate(&self) -> Result<(), ForecastError> {
        let invalid = |msg: String| Err(ForecastError::Configuration(msg));

        if self.model.api_key.is_none() {
            return invalid("OPENROUTER_API_KEY is not set".into());
        }
        if self.model.model.trim().is_empty() {
            return invalid("model name is empty".into());
        }
        if !self.model.base_url.starts_with("http") {
            return invalid(format!("base_url must be http(s): {}", self.model.base_url));
        }
        if !(0.0..=2.0).contains(&self.model.temperature) {
            return invalid(format!(
                "temperature must be in [0, 2], got {}",
                self.model.temperature
            ));
        }
        if self.model.max_tokens == 0 {
            return invalid("max_tokens must be > 0".into());
        }
        if self.debate.rounds == 0 {
            return invalid("rounds must be >= 1".into());
        }
        if self.debate.horizons.is_empty() {
            return invalid("at least one time horizon is required".into());
        }
        if self.workers == 0 {
            return invalid("workers must be >= 1".into());
        }
        match self.search.provider {
            SearchProvider::GoogleNews if self.search.serp_api_key.is_none() => {
                invalid("google_news search requires SERP_API_KEY".into())
            }
            SearchProvider::Tavily if self.search.tavily_api_key.is_none() => {
                invalid("tavily search requires TAVILY_API_KEY".into())
            }
            _ => Ok(()),
        }
    }
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            model: ModelSettings::default(),
            search: SearchSettings::default(),
            debate: DebateSettings::default(),
            workers: 3,
            store_path: None,
        }
    }
}
