//! Benchmark runner — forecasts resolved questions concurrently and scores
//! them.
//!
//! ```text
//! questions ──► JoinSet::spawn(debate) × N   (Semaphore-bounded)
//!                  │
//!                  └─► score per horizon ──► BenchmarkSummary
//! ```
//!
//! Each question gets its own orchestrator and run log. A question whose
//! debate degrades is still scored on its fallback predictions; a worker
//! panic yields an unscored entry.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use forecast_coordination::benchmark::{BenchmarkQuestion, BenchmarkSummary, HorizonScore, QuestionScore};
use forecast_coordination::{ForecastResult, SessionStore};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::{DebateSettings, ForecastConfig};
use crate::errors::ForecastError;
use crate::llm::{LanguageModel, OpenRouterClient};
use crate::orchestrator::{DebateOrchestrator, DebateRequest};
use crate::run_log::RunLog;
use crate::search::{tool_from_settings, SearchTool};

/// Scores for one benchmark pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkReport {
    pub model: String,
    pub rounds: u32,
    pub workers: usize,
    pub started_at: DateTime<Utc>,
    pub results: Vec<QuestionScore>,
    pub summary: BenchmarkSummary,
}

/// Score one finished forecast against its resolved outcomes.
pub fn score_result(question: &BenchmarkQuestion, result: &ForecastResult) -> QuestionScore {
    let scores = question
        .outcomes
        .iter()
        .filter_map(|(horizon, outcome)| {
            result
                .horizon(*horizon)
                .map(|f| HorizonScore::new(*horizon, f.prediction.probability, *outcome))
        })
        .collect();
    let calibration_error = question
        .market_probability
        .zip(result.primary())
        .map(|(market, f)| (f.prediction.probability - market).abs());

    QuestionScore {
        question_id: question.id.clone(),
        scores,
        calibration_error,
        degraded: result.is_degraded(),
        elapsed_ms: result.metadata.elapsed_ms,
        error: result.metadata.failure.clone(),
    }
}

fn unscored(question: &BenchmarkQuestion, error: String) -> QuestionScore {
    QuestionScore {
        question_id: question.id.clone(),
        scores: Vec::new(),
        calibration_error: None,
        degraded: true,
        elapsed_ms: 0,
        error: Some(error),
    }
}

pub struct BenchmarkRunner {
    model: Arc<dyn LanguageModel>,
    search: Arc<dyn SearchTool>,
    store: Option<Arc<dyn SessionStore>>,
    settings: DebateSettings,
    workers: usize,
    max_articles: usize,
    lookback_days: i64,
}

impl BenchmarkRunner {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        search: Arc<dyn SearchTool>,
        store: Option<Arc<dyn SessionStore>>,
        settings: DebateSettings,
        workers: usize,
    ) -> Self {
        let defaults = ForecastConfig::default();
        Self {
            model,
            search,
            store,
            settings,
            workers: workers.max(1),
            max_articles: defaults.search.max_articles,
            lookback_days: defaults.search.lookback_days,
        }
    }

    pub fn from_config(
        config: &ForecastConfig,
        store: Option<Arc<dyn SessionStore>>,
    ) -> Result<Self, ForecastError> {
        config.validate()?;
        let model: Arc<dyn LanguageModel> = Arc::new(OpenRouterClient::new(&config.model)?);
        let search = tool_from_settings(&config.search)?;
        let mut runner = Self::new(model, search, store, config.debate.clone(), config.workers);
        runner.max_articles = config.search.max_articles;
        runner.lookback_days = config.search.lookback_days;
        Ok(runner)
    }

    /// Forecast and score every question, at most `workers` at a time.
    /// Results keep the input order.
    pub async fn run(&self, questions: Vec<BenchmarkQuestion>) -> BenchmarkReport {
        let started_at = Utc::now();
        let clock = Instant::now();
        info!(
            questions = questions.len(),
            workers = self.workers,
            rounds = self.settings.rounds,
            "benchmark started"
        );

        let sem = Arc::new(Semaphore::new(self.workers));
        let questions: Vec<Arc<BenchmarkQuestion>> = questions.into_iter().map(Arc::new).collect();
        let mut join_set: JoinSet<(usize, QuestionScore)> = JoinSet::new();

        for (index, question) in questions.iter().enumerate() {
            let sem = sem.clone();
            let question = question.clone();
            let orchestrator = DebateOrchestrator::new(
                self.model.clone(),
                self.search.clone(),
                self.store.clone(),
                RunLog::new(&format!("benchmark_{}", question.id)),
            )
            .with_search_limits(self.max_articles, self.lookback_days);
            let request = DebateRequest::from_settings(question.to_forecast_question(), &self.settings);

            join_set.spawn(async move {
                let Ok(_permit) = sem.acquire().await else {
                    return (index, unscored(&question, "worker pool closed".into()));
                };
                let result = orchestrator.run(request).await;
                let score = score_result(&question, &result);
                debug!(
                    question = %question.id,
                    brier = ?score.mean_brier(),
                    degraded = score.degraded,
                    "question scored"
                );
                (index, score)
            });
        }

        let mut slots: Vec<Option<QuestionScore>> = vec![None; questions.len()];
        while let Some(res) = join_set.join_next().await {
            match res {
                Ok((index, score)) => slots[index] = Some(score),
                Err(e) => warn!(error = %e, "benchmark worker panicked"),
            }
        }
        let results: Vec<QuestionScore> = slots
            .into_iter()
            .zip(&questions)
            .map(|(slot, q)| slot.unwrap_or_else(|| unscored(q, "worker panicked".into())))
            .collect();

        let mut summary = BenchmarkSummary::from_scores(&results);
        summary.total_time_ms = clock.elapsed().as_millis() as u64;
        info!(
            scored = summary.scored_questions,
            degraded = summary.degraded_questions,
            brier = ?summary.mean_brier,
            "benchmark finished"
        );

        BenchmarkReport {
            model: self.model.model_name().to_string(),
            rounds: self.settings.rounds,
            workers: self.workers,
            started_at,
            results,
            summary,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forecast_coordination::benchmark::parse_questions;
    use forecast_coordination::{ForecastQuestion, HorizonForecast, TimeHorizon};

    #[test]
    fn test_score_result_matches_horizons() {
        let question = parse_questions(
            r#"[{"id": "q", "question": "?", "market_probability": 0.6,
                "outcomes": {"7d": 1.0, "30d": 0.0}}]"#,
            "inline",
        )
        .unwrap()
        .remove(0);

        let mut fallback = HorizonForecast::failed(TimeHorizon::new(7), "x");
        fallback.prediction.probability = 0.8;
        let result = ForecastResult {
            question: ForecastQuestion::new("?"),
            horizons: vec![fallback],
            methodology_components: Default::default(),
            full_analysis: serde_json::Value::Null,
            metadata: forecast_coordination::ForecastMetadata {
                session_id: None,
                model: "m".into(),
                prompt_version: "v".into(),
                rounds_requested: 1,
                rounds_completed: 0,
                search_budget_per_advocate: 0,
                queries: vec![],
                sources: vec![],
                articles_found: 0,
                started_at: Utc::now(),
                completed_at: Utc::now(),
                elapsed_ms: 42,
                failure: Some("judge: boom".into()),
            },
            calibration: None,
            transcript: vec![],
        };

        let score = score_result(&question, &result);
        // 30d has no forecast and is skipped.
        assert_eq!(score.scores.len(), 1);
        assert!((score.scores[0].brier - 0.04).abs() < 1e-12);
        assert!((score.calibration_error.unwrap() - 0.2).abs() < 1e-12);
        assert!(score.degraded);
        assert_eq!(score.elapsed_ms, 42);
    }
}
