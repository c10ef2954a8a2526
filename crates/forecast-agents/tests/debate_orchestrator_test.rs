//! Debate orchestrator integration tests.
//!
//! A scripted in-process model stands in for OpenRouter; no network.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use forecast_agents::benchmark::BenchmarkRunner;
use forecast_agents::config::{DebateSettings, ForecastConfig};
use forecast_agents::search::{Article, SearchWindow};
use forecast_agents::{
    ChatMessage, DebateOrchestrator, DebateRequest, ForecastError, LanguageModel, NoSearch,
    RunLog, SearchTool,
};
use forecast_coordination::benchmark::parse_questions;
use forecast_coordination::prompts::{advocate_backstory, judge_backstory};
use forecast_coordination::{
    ActivityOutcome, ConfidenceLabel, DebateRole, ExtractionPath, ForecastQuestion,
    InMemorySessionStore, SessionStatus, SessionStore, TimeHorizon,
};

// ── Helpers ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Call {
    role: DebateRole,
    round: u32,
    prompt: String,
    history: usize,
}

/// Answers by role; optionally fails one (role, round) slot.
struct ScriptedModel {
    high: f64,
    low: f64,
    judge_reply: String,
    fail_at: Option<(DebateRole, u32)>,
    delay: Duration,
    calls: Mutex<Vec<Call>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedModel {
    fn new(high: f64, low: f64, judge_reply: &str) -> Self {
        Self {
            high,
            low,
            judge_reply: judge_reply.to_string(),
            fail_at: None,
            delay: Duration::from_millis(5),
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    fn failing_at(mut self, role: DebateRole, round: u32) -> Self {
        self.fail_at = Some((role, round));
        self
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

fn role_for(system: &str) -> DebateRole {
    if system == advocate_backstory(DebateRole::HighAdvocate) {
        DebateRole::HighAdvocate
    } else if system == advocate_backstory(DebateRole::LowAdvocate) {
        DebateRole::LowAdvocate
    } else {
        assert_eq!(system, judge_backstory());
        DebateRole::Judge
    }
}

/// Round from "(round N of R)" in an advocate task; 0 for the judge.
fn round_for(prompt: &str) -> u32 {
    prompt
        .split("(round ")
        .nth(1)
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|n| n.parse().ok())
        .unwrap_or(0)
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        transcript: &[ChatMessage],
    ) -> Result<String, ForecastError> {
        let role = role_for(system_prompt);
        let round = round_for(user_prompt);
        self.calls.lock().unwrap().push(Call {
            role,
            round,
            prompt: user_prompt.to_string(),
            history: transcript.len(),
        });

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail_at == Some((role, round)) {
            return Err(ForecastError::InvocationFailure("HTTP 500".into()));
        }
        let p = match role {
            DebateRole::HighAdvocate => self.high,
            DebateRole::LowAdvocate => self.low,
            DebateRole::Judge => return Ok(self.judge_reply.clone()),
        };
        let tag = match role {
            DebateRole::HighAdvocate => "HIGH",
            _ => "LOW",
        };
        Ok(format!(
            r#"{{"position_statement": "{tag}-R{round}", "time_horizon_predictions": {{"7_day": {p}, "30_day": {p}}}, "confidence_level": "MEDIUM"}}"#
        ))
    }
}

/// Three fixed articles for every query.
struct StaticSearch;

#[async_trait]
impl SearchTool for StaticSearch {
    fn name(&self) -> &str {
        "static"
    }

    async fn search(&self, query: &str, _window: SearchWindow) -> Result<Vec<Article>, ForecastError> {
        Ok((1..=3)
            .map(|i| Article {
                title: format!("{query} #{i}"),
                source: "Reuters".into(),
                link: format!("https://example.com/{i}"),
                snippet: "evidence".into(),
                date_text: String::new(),
                published: None,
                position: i,
            })
            .collect())
    }
}

const JUDGE_OK: &str = r#"{
    "final_predictions": {"7_day": 0.45, "30_day": 0.55},
    "confidence_scores": {"7_day": "MEDIUM", "30_day": "MEDIUM"},
    "reasoning": {"7_day": "Near term unlikely.", "30_day": "Plausible."},
    "base_rate": 0.5,
    "evidence_quality": 0.7
}"#;

fn question() -> ForecastQuestion {
    ForecastQuestion::new("Will the bridge reopen to traffic?")
        .with_horizons(vec![TimeHorizon::new(7), TimeHorizon::new(30)])
}

fn orchestrator(
    model: Arc<ScriptedModel>,
    search: Arc<dyn SearchTool>,
    store: Option<Arc<dyn SessionStore>>,
) -> DebateOrchestrator {
    DebateOrchestrator::new(model, search, store, RunLog::new("test"))
}

// ── Happy path ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_three_round_debate_runs_every_turn_in_order() {
    let model = Arc::new(ScriptedModel::new(0.7, 0.4, JUDGE_OK));
    let orch = orchestrator(model.clone(), Arc::new(StaticSearch), None);

    let result = orch.run(DebateRequest::new(question()).with_rounds(3)).await;

    let slots: Vec<(u32, DebateRole)> = result
        .transcript
        .iter()
        .map(|t| (t.round_number, t.role))
        .collect();
    assert_eq!(
        slots,
        vec![
            (1, DebateRole::HighAdvocate),
            (1, DebateRole::LowAdvocate),
            (2, DebateRole::HighAdvocate),
            (2, DebateRole::LowAdvocate),
            (3, DebateRole::HighAdvocate),
            (3, DebateRole::LowAdvocate),
            (3, DebateRole::Judge),
        ]
    );
    assert!(!result.is_degraded());
    assert!(result.methodology_components.values().all(|ok| *ok));
    assert_eq!(result.metadata.rounds_completed, 3);
    assert_eq!(result.metadata.queries.len(), 6);
    let distinct: std::collections::HashSet<_> = result.metadata.queries.iter().collect();
    assert_eq!(distinct.len(), 6);
    // The same three links come back for every query.
    assert_eq!(result.metadata.sources.len(), 3);
    assert_eq!(
        result.metadata.articles_found as usize,
        result.metadata.sources.len()
    );
    assert!(result.calibration.is_some());
    assert_eq!(result.full_analysis["base_rate"], 0.5);

    for h in &result.horizons {
        assert!((0.01..=0.99).contains(&h.prediction.probability));
        assert_eq!(h.path, ExtractionPath::Json);
    }
    assert_eq!(model.calls().len(), 7);
}

#[tokio::test]
async fn test_opening_round_runs_advocates_concurrently() {
    let model = Arc::new(
        ScriptedModel::new(0.7, 0.4, JUDGE_OK).with_delay(Duration::from_millis(50)),
    );
    let orch = orchestrator(model.clone(), Arc::new(NoSearch), None);

    orch.run(DebateRequest::new(question()).with_rounds(2)).await;

    assert_eq!(model.max_in_flight.load(Ordering::SeqCst), 2);
    // Opening turns see no history; later turns see everything before them.
    let calls = model.calls();
    let opening: Vec<_> = calls.iter().filter(|c| c.round == 1).collect();
    assert!(opening.iter().all(|c| c.history == 0));
    let low_r2 = calls
        .iter()
        .find(|c| c.role == DebateRole::LowAdvocate && c.round == 2)
        .unwrap();
    assert_eq!(low_r2.history, 3);
}

#[tokio::test]
async fn test_rebuttals_embed_opponents_latest_turn() {
    let model = Arc::new(ScriptedModel::new(0.7, 0.4, JUDGE_OK));
    let orch = orchestrator(model.clone(), Arc::new(NoSearch), None);

    orch.run(DebateRequest::new(question()).with_rounds(2)).await;

    let calls = model.calls();
    let find = |role, round| {
        calls
            .iter()
            .find(|c| c.role == role && c.round == round)
            .unwrap()
            .prompt
            .clone()
    };
    let high_r2 = find(DebateRole::HighAdvocate, 2);
    assert!(high_r2.contains("LOW-R1"));
    let low_r2 = find(DebateRole::LowAdvocate, 2);
    assert!(low_r2.contains("HIGH-R2"));
    assert!(!find(DebateRole::HighAdvocate, 1).contains("LOW-R1"));

    let judge = calls.iter().find(|c| c.role == DebateRole::Judge).unwrap();
    for tag in ["HIGH-R1", "LOW-R1", "HIGH-R2", "LOW-R2"] {
        assert!(judge.prompt.contains(tag), "judge prompt missing {tag}");
    }
}

// ── Failure isolation ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_failed_rebuttal_short_circuits_with_fallbacks() {
    let model = Arc::new(
        ScriptedModel::new(0.7, 0.4, JUDGE_OK).failing_at(DebateRole::HighAdvocate, 2),
    );
    let store = Arc::new(InMemorySessionStore::new());
    let orch = orchestrator(model.clone(), Arc::new(NoSearch), Some(store.clone()));

    let result = orch.run(DebateRequest::new(question()).with_rounds(3)).await;

    assert!(result.component("round_1_high_advocate"));
    assert!(result.component("round_1_low_advocate"));
    assert!(!result.component("round_2_high_advocate"));
    assert!(!result.component("round_2_low_advocate"));
    assert!(!result.component("judge"));
    assert!(!result.component("calibration"));

    assert!(result.is_degraded());
    assert_eq!(result.horizons.len(), 2);
    for h in &result.horizons {
        assert!(h.prediction.reasoning.starts_with("error: "));
        assert_eq!(h.prediction.probability, 0.5);
        assert_eq!(h.prediction.confidence_label, ConfidenceLabel::Low);
    }
    assert_eq!(result.transcript.len(), 2);
    assert_eq!(result.metadata.rounds_completed, 1);
    assert!(result.metadata.failure.as_deref().unwrap().contains("HTTP 500"));
    assert_eq!(result.full_analysis["failed_stage"], "round_2_high_advocate");
    // Judge and the rest of round 2 never ran.
    assert_eq!(model.calls().len(), 3);

    let id = result.metadata.session_id.clone().unwrap();
    let session = store.get_session(&id).unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Error);
    let activities = store.activities(&id).unwrap();
    let failed = activities
        .iter()
        .find(|a| a.stage == "round_2_high_advocate")
        .unwrap();
    assert!(matches!(failed.outcome, ActivityOutcome::Error(_)));
}

#[tokio::test]
async fn test_opening_failure_keeps_sibling_turn_flag() {
    let model = Arc::new(
        ScriptedModel::new(0.7, 0.4, JUDGE_OK).failing_at(DebateRole::LowAdvocate, 1),
    );
    let orch = orchestrator(model, Arc::new(NoSearch), None);

    let result = orch.run(DebateRequest::new(question()).with_rounds(2)).await;

    assert!(result.component("round_1_high_advocate"));
    assert!(!result.component("round_1_low_advocate"));
    assert!(result.is_degraded());
    assert_eq!(result.metadata.rounds_completed, 0);
}

#[tokio::test]
async fn test_unparseable_judge_falls_back_to_domain_rate() {
    let model = Arc::new(ScriptedModel::new(0.6, 0.5, "I cannot decide."));
    let orch = orchestrator(model, Arc::new(NoSearch), None);

    let result = orch.run(DebateRequest::new(question()).with_rounds(1)).await;

    assert!(result.component("judge"));
    assert!(result.metadata.failure.is_none());
    for h in &result.horizons {
        assert_eq!(h.path, ExtractionPath::DomainFallback);
        assert!(!h.is_failure());
    }

    let judge_entries = orch.log().entries_for("judge");
    let details = judge_entries[0].details.as_ref().unwrap();
    assert_eq!(details["absorbed"][0], "7d: parse_failure");
}

// ── Calibration ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_overconfident_judge_without_evidence_is_anchored() {
    let model = Arc::new(ScriptedModel::new(
        0.9,
        0.7,
        r#"{"final_predictions": {"30_day": 0.95}, "confidence_scores": {"30_day": "HIGH"}}"#,
    ));
    let orch = orchestrator(model, Arc::new(NoSearch), None);
    let q = ForecastQuestion::new("Will Bitcoin exceed $100k by end of 2024?")
        .with_horizons(vec![TimeHorizon::new(30)]);

    let result = orch.run(DebateRequest::new(q).with_rounds(1)).await;

    let h = result.primary().unwrap();
    assert_eq!(h.raw_probability, 0.95);
    assert!((h.prediction.probability - 0.75).abs() < 1e-9);
    assert_eq!(h.prediction.confidence_label, ConfidenceLabel::Low);
    assert!(!h.adjustments.is_empty());
    assert_eq!(result.calibration.unwrap().evidence_quality, 0.2);

    let calibration = orch.log().entries_for("calibration");
    let details = calibration[0].details.as_ref().unwrap();
    assert_eq!(details["absorbed"][0], "30d: calibration_violation");
}

#[tokio::test]
async fn test_judge_reported_evidence_ignored_without_articles() {
    let model = Arc::new(ScriptedModel::new(
        0.9,
        0.7,
        r#"{"final_predictions": {"30_day": 0.95}, "confidence_scores": {"30_day": "HIGH"}, "evidence_quality": 0.9}"#,
    ));
    let orch = orchestrator(model, Arc::new(NoSearch), None);
    let q = ForecastQuestion::new("Will Bitcoin exceed $100k by end of 2024?")
        .with_horizons(vec![TimeHorizon::new(30)]);

    let result = orch.run(DebateRequest::new(q).with_rounds(1)).await;

    assert_eq!(result.metadata.articles_found, 0);
    let context = result.calibration.clone().unwrap();
    assert_eq!(context.evidence_quality, 0.2);
    let h = result.primary().unwrap();
    assert!((0.55..=0.75 + 1e-9).contains(&h.prediction.probability));
    assert_eq!(h.prediction.confidence_label, ConfidenceLabel::Low);
}

// ── Store ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_completed_run_is_recorded() {
    let model = Arc::new(ScriptedModel::new(0.7, 0.4, JUDGE_OK));
    let store = Arc::new(InMemorySessionStore::new());
    let orch = orchestrator(model, Arc::new(NoSearch), Some(store.clone()));

    let result = orch.run(DebateRequest::new(question()).with_rounds(1)).await;

    let id = result.metadata.session_id.unwrap();
    let session = store.get_session(&id).unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(
        session.forecast_probability,
        Some(result.horizons[0].prediction.probability)
    );
    assert!(session.completed_at.is_some());

    let stages: Vec<String> = store
        .activities(&id)
        .unwrap()
        .into_iter()
        .map(|a| a.stage)
        .collect();
    assert!(stages.contains(&"round_1_high_advocate".to_string()));
    assert!(stages.contains(&"judge".to_string()));
    assert!(stages.contains(&"calibration".to_string()));
}

// ── Configuration ────────────────────────────────────────────────────────────

#[test]
fn test_missing_api_key_surfaces_before_run() {
    let err = DebateOrchestrator::from_config(&ForecastConfig::default(), None, RunLog::new("t"))
        .err()
        .expect("no key configured");
    assert!(matches!(err, ForecastError::Configuration(_)));
    assert!(!err.failure_kind().is_recoverable());
}

// ── Benchmark ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_benchmark_scores_in_input_order() {
    let questions = parse_questions(
        r#"[
            {"id": "a", "question": "Will A happen?", "outcomes": {"7d": 1.0}},
            {"id": "b", "question": "Will B happen?", "outcomes": {"7d": 0.0, "30d": 0.0}},
            {"id": "c", "question": "Will C happen?", "outcomes": {"30d": 1.0}, "market_probability": 0.5}
        ]"#,
        "inline",
    )
    .unwrap();
    let model = Arc::new(ScriptedModel::new(0.7, 0.4, JUDGE_OK));
    let settings = DebateSettings {
        rounds: 1,
        ..DebateSettings::default()
    };
    let runner = BenchmarkRunner::new(model, Arc::new(NoSearch), None, settings, 2);

    let report = runner.run(questions).await;

    let ids: Vec<_> = report.results.iter().map(|r| r.question_id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
    assert_eq!(report.results[1].scores.len(), 2);
    assert!(report.results[2].calibration_error.is_some());
    assert_eq!(report.summary.total_questions, 3);
    assert_eq!(report.summary.degraded_questions, 0);
    assert!(report.summary.mean_brier.is_some());
    assert!(report.summary.format_report().contains("| Questions | 3 |"));
}
