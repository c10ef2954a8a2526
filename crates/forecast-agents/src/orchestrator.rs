//! Debate orchestrator: one forecast question through advocate rounds, the
//! judge, and programmatic calibration.
//!
//! ```text
//! round 1      high ∥ low        (joined; neither sees the other)
//! round 2..R   high → low        (each rebuts the opponent's latest turn)
//! judge        all advocate turns → one ruling per horizon
//! calibrate    evidence gate, disagreement anchor, extremization guard
//! ```
//!
//! [`DebateOrchestrator::run`] never returns an error. The first failed
//! turn stops the debate; every horizon then carries a fallback prediction
//! and the failed stage stays `false` in `methodology_components`.
//! Configuration problems surface earlier, from
//! [`DebateOrchestrator::from_config`].

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use forecast_coordination::calibration::EvidenceStats;
use forecast_coordination::debate::{synthesize, DebatePhase, DebateSession};
use forecast_coordination::extract::HorizonExtraction;
use forecast_coordination::prompts::{
    advocate_backstory, advocate_task, judge_backstory, judge_task, research_query,
    AdvocateBrief, PROMPT_VERSION,
};
use forecast_coordination::result::{
    methodology_stages, stage_name, STAGE_CALIBRATION, STAGE_EVIDENCE_SEARCH,
};
use forecast_coordination::{
    extract_horizon_predictions, ActivityOutcome, CalibrationRules, DebateRole, DebateTurn,
    ForecastMetadata, ForecastQuestion, ForecastResult, HorizonForecast, SessionStore,
    SessionUpdate, StoreError, Transcript,
};
use serde_json::json;
use tracing::{info, warn};

use crate::config::{DebateSettings, ForecastConfig};
use crate::errors::{FailureKind, ForecastError};
use crate::llm::{ChatMessage, LanguageModel, OpenRouterClient};
use crate::run_log::RunLog;
use crate::search::{tool_from_settings, ResearchReport, Researcher, SearchTool};

/// One question plus debate shape.
#[derive(Debug, Clone, PartialEq)]
pub struct DebateRequest {
    pub question: ForecastQuestion,
    pub rounds: u32,
    /// Advisory searches per advocate, quoted in prompts.
    pub search_budget: u32,
}

impl DebateRequest {
    pub fn new(question: ForecastQuestion) -> Self {
        Self::from_settings(question, &DebateSettings::default())
    }

    pub fn from_settings(question: ForecastQuestion, settings: &DebateSettings) -> Self {
        Self {
            question,
            rounds: settings.rounds.max(1),
            search_budget: settings.search_budget,
        }
    }

    pub fn with_rounds(mut self, rounds: u32) -> Self {
        self.rounds = rounds.max(1);
        self
    }

    pub fn with_search_budget(mut self, budget: u32) -> Self {
        self.search_budget = budget;
        self
    }
}

/// Shared inputs for every turn of one debate.
#[derive(Debug, Clone, Copy)]
pub struct RoundContext<'a> {
    pub question: &'a ForecastQuestion,
    pub search_budget: u32,
}

/// A completed turn with the extraction and evidence behind it.
#[derive(Debug, Clone)]
pub struct RoundOutput {
    pub turn: DebateTurn,
    pub extraction: HorizonExtraction,
    /// `None` for the judge, which does not search.
    pub research: Option<ResearchReport>,
}

/// A debate stopped at `stage`.
#[derive(Debug)]
struct StageFailure {
    stage: String,
    error: ForecastError,
}

impl StageFailure {
    fn new(stage: impl Into<String>, error: impl Into<ForecastError>) -> Self {
        Self {
            stage: stage.into(),
            error: error.into(),
        }
    }
}

/// Evidence bookkeeping across all advocate turns.
#[derive(Debug, Default)]
struct EvidenceLedger {
    stats: EvidenceStats,
    queries: Vec<String>,
    sources: Vec<String>,
}

impl EvidenceLedger {
    /// Articles already cited by an earlier turn are not counted again.
    fn record(&mut self, report: &ResearchReport) {
        let before = self.sources.len();
        for article in &report.articles {
            if !self.sources.contains(&article.link) {
                self.sources.push(article.link.clone());
            }
        }
        self.stats
            .record_distinct(report.articles.len(), self.sources.len() - before);
        self.queries.push(report.query.clone());
    }
}

/// Mutable state of one run, threaded through the phases.
struct DebateRun {
    session: DebateSession,
    transcript: Transcript,
    components: BTreeMap<String, bool>,
    evidence: EvidenceLedger,
    session_id: Option<String>,
}

pub struct DebateOrchestrator {
    model: Arc<dyn LanguageModel>,
    researcher: Researcher,
    store: Option<Arc<dyn SessionStore>>,
    log: RunLog,
    rules: CalibrationRules,
}

impl DebateOrchestrator {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        search: Arc<dyn SearchTool>,
        store: Option<Arc<dyn SessionStore>>,
        log: RunLog,
    ) -> Self {
        Self {
            model,
            researcher: Researcher::new(search),
            store,
            log,
            rules: CalibrationRules::default(),
        }
    }

    /// Validate `config` and build the OpenRouter client and search provider.
    pub fn from_config(
        config: &ForecastConfig,
        store: Option<Arc<dyn SessionStore>>,
        log: RunLog,
    ) -> Result<Self, ForecastError> {
        config.validate()?;
        let model: Arc<dyn LanguageModel> = Arc::new(OpenRouterClient::new(&config.model)?);
        let search = tool_from_settings(&config.search)?;
        Ok(Self::new(model, search, store, log)
            .with_search_limits(config.search.max_articles, config.search.lookback_days))
    }

    pub fn with_rules(mut self, rules: CalibrationRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_search_limits(mut self, max_articles: usize, lookback_days: i64) -> Self {
        self.researcher = self.researcher.with_limits(max_articles, lookback_days);
        self
    }

    pub fn log(&self) -> &RunLog {
        &self.log
    }

    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    // ── Turns ─────────────────────────────────────────────────────────────────

    /// Run one turn for `role` against the transcript so far.
    ///
    /// Advocates research first and see the opponent's latest turn from
    /// round 2 on. The judge sees every advocate turn.
    pub async fn run_round(
        &self,
        role: DebateRole,
        round: u32,
        ctx: RoundContext<'_>,
        transcript: &Transcript,
    ) -> Result<RoundOutput, ForecastError> {
        let question = ctx.question;
        let (system, prompt, history, research) = match role {
            DebateRole::Judge => (
                judge_backstory(),
                judge_task(question, transcript.advocate_turns(), &question.time_horizons),
                Vec::new(),
                None,
            ),
            advocate => {
                let query = research_query(&question.text, advocate, round);
                let research = self
                    .researcher
                    .research(&query, question.training_cutoff_date)
                    .await;
                let brief = AdvocateBrief {
                    question,
                    stance: advocate,
                    round,
                    total_rounds: transcript.total_rounds(),
                    search_budget: ctx.search_budget,
                    evidence: &research.text,
                };
                (
                    advocate_backstory(advocate),
                    advocate_task(&brief, transcript.opponent_latest(advocate)),
                    ChatMessage::history_for(advocate, transcript.turns()),
                    Some(research),
                )
            }
        };

        let raw = self.model.generate(system, &prompt, &history).await?;
        let extraction =
            extract_horizon_predictions(&raw, &question.text, &question.time_horizons);
        let parsed = (!extraction.json.is_null()).then(|| extraction.json.clone());
        let turn = DebateTurn::new(round, role, prompt, raw)
            .with_extraction(parsed, extraction.predictions.clone());

        Ok(RoundOutput {
            turn,
            extraction,
            research,
        })
    }

    // ── Run ───────────────────────────────────────────────────────────────────

    /// Debate `request.question` and return a calibrated forecast. Never fails.
    pub async fn run(&self, request: DebateRequest) -> ForecastResult {
        let started_at = Utc::now();
        let clock = Instant::now();
        let DebateRequest {
            question,
            rounds,
            search_budget,
        } = request;
        let rounds = rounds.max(1);

        let session_id = self.open_session(&question).await;
        let mut state = DebateRun {
            session: DebateSession::new(session_id.as_deref().unwrap_or("unrecorded"), rounds),
            transcript: Transcript::new(rounds),
            components: methodology_stages(rounds)
                .into_iter()
                .map(|stage| (stage, false))
                .collect(),
            evidence: EvidenceLedger::default(),
            session_id,
        };

        self.log.log(
            "orchestrator",
            format!("Starting {rounds}-round debate"),
            Some(json!({
                "question": question.text,
                "horizons": question.time_horizons,
                "model": self.model.model_name(),
                "search": self.researcher.provider(),
            })),
        );

        let ctx = RoundContext {
            question: &question,
            search_budget,
        };
        let outcome = self.debate(ctx, &mut state).await;
        state.components.insert(
            STAGE_EVIDENCE_SEARCH.to_string(),
            state.evidence.stats.searches_with_results > 0,
        );

        let (horizons, full_analysis, calibration, failure) = match outcome {
            Ok(judge) => {
                let synthesis = synthesize(
                    &self.rules,
                    &question,
                    &state.transcript,
                    &judge,
                    &state.evidence.stats,
                    &state.components,
                );
                state.components.insert(STAGE_CALIBRATION.to_string(), true);

                let adjusted: Vec<_> = synthesis
                    .horizons
                    .iter()
                    .flat_map(|h| h.adjustments.iter().map(move |a| (h.horizon, a)))
                    .map(|(h, a)| format!("{h}: {} {:.2}→{:.2}", a.rule, a.before, a.after))
                    .collect();
                let violations: Vec<String> = synthesis
                    .horizons
                    .iter()
                    .filter_map(|h| {
                        FailureKind::for_calibration(&h.adjustments)
                            .map(|kind| format!("{}: {kind}", h.horizon.label()))
                    })
                    .collect();
                self.log.log(
                    "calibration",
                    format!("{} adjustment(s) applied", adjusted.len()),
                    Some(json!({
                        "context": synthesis.context,
                        "adjustments": adjusted,
                        "absorbed": violations,
                    })),
                );
                self.record_activity(
                    &state,
                    STAGE_CALIBRATION,
                    ActivityOutcome::Success(json!({
                        "context": synthesis.context,
                        "base_rate": synthesis.base_rate,
                    })),
                )
                .await;
                if let Some(primary) = synthesis.horizons.first() {
                    let p = &primary.prediction;
                    self.update_session(
                        &state,
                        SessionUpdate::completed(p.probability, p.confidence_label, p.reasoning.clone())
                            .with_base_rate(synthesis.base_rate)
                            .with_evidence_quality(synthesis.context.evidence_quality),
                    )
                    .await;
                }
                (synthesis.horizons, judge.json, Some(synthesis.context), None)
            }
            Err(StageFailure { stage, error }) => {
                let message = format!("{stage}: {error}");
                warn!(stage = %stage, kind = %error.failure_kind(), "debate short-circuited: {error}");
                state.session.fail(&message);
                self.update_session(&state, SessionUpdate::failed(message.clone()))
                    .await;
                let horizons = question
                    .time_horizons
                    .iter()
                    .map(|h| HorizonForecast::failed(*h, &message))
                    .collect();
                (
                    horizons,
                    json!({ "error": error.to_string(), "failed_stage": stage }),
                    None,
                    Some(message),
                )
            }
        };

        let completed_at = Utc::now();
        let metadata = ForecastMetadata {
            session_id: state.session_id.clone(),
            model: self.model.model_name().to_string(),
            prompt_version: PROMPT_VERSION.to_string(),
            rounds_requested: rounds,
            rounds_completed: state.session.rounds_completed(),
            search_budget_per_advocate: search_budget,
            queries: state.evidence.queries,
            sources: state.evidence.sources,
            articles_found: state.evidence.stats.articles_found,
            started_at,
            completed_at,
            elapsed_ms: clock.elapsed().as_millis() as u64,
            failure,
        };

        let result = ForecastResult {
            question,
            horizons,
            methodology_components: state.components,
            full_analysis,
            metadata,
            calibration,
            transcript: state.transcript.into_turns(),
        };
        info!(debate = %state.session.status_line(), "{}", result.summary_line());
        self.log.log("orchestrator", result.summary_line(), None);
        result
    }

    /// Drive the phase machine through every turn; returns the judge's
    /// extraction.
    async fn debate(
        &self,
        ctx: RoundContext<'_>,
        state: &mut DebateRun,
    ) -> Result<HorizonExtraction, StageFailure> {
        state
            .session
            .start()
            .map_err(|e| StageFailure::new("init", e))?;

        // Opening round: both advocates at once, blind to each other.
        let (high, low) = {
            let transcript = &state.transcript;
            tokio::join!(
                self.run_round(DebateRole::HighAdvocate, 1, ctx, transcript),
                self.run_round(DebateRole::LowAdvocate, 1, ctx, transcript),
            )
        };
        let mut failure = None;
        let mut opening = Vec::with_capacity(2);
        for (role, outcome) in [(DebateRole::HighAdvocate, high), (DebateRole::LowAdvocate, low)] {
            let stage = stage_name(1, role);
            match outcome {
                Ok(output) => opening.push(self.accept(state, &stage, output).await),
                Err(error) => {
                    self.reject(state, &stage, &error).await;
                    failure.get_or_insert(StageFailure::new(stage, error));
                }
            }
        }
        if let Some(failure) = failure {
            return Err(failure);
        }
        for turn in opening {
            state
                .transcript
                .push(turn)
                .map_err(|e| StageFailure::new(stage_name(1, DebateRole::HighAdvocate), e))?;
        }

        // Rebuttals: high then low, each seeing the other's latest turn.
        loop {
            let next = state
                .session
                .advance("advocate round complete")
                .map_err(|e| StageFailure::new("transition", e))?;
            if next != DebatePhase::Rebuttal {
                break;
            }
            let round = state.session.current_round;
            for role in [DebateRole::HighAdvocate, DebateRole::LowAdvocate] {
                let stage = stage_name(round, role);
                match self.run_round(role, round, ctx, &state.transcript).await {
                    Ok(output) => {
                        let turn = self.accept(state, &stage, output).await;
                        state
                            .transcript
                            .push(turn)
                            .map_err(|e| StageFailure::new(stage.clone(), e))?;
                    }
                    Err(error) => {
                        self.reject(state, &stage, &error).await;
                        return Err(StageFailure::new(stage, error));
                    }
                }
            }
        }

        // Judge.
        let stage = stage_name(rounds_of(state), DebateRole::Judge);
        let output = match self
            .run_round(DebateRole::Judge, rounds_of(state), ctx, &state.transcript)
            .await
        {
            Ok(output) => output,
            Err(error) => {
                self.reject(state, &stage, &error).await;
                return Err(StageFailure::new(stage, error));
            }
        };
        let extraction = output.extraction.clone();
        let turn = self.accept(state, &stage, output).await;
        state
            .transcript
            .push(turn)
            .map_err(|e| StageFailure::new(stage.clone(), e))?;
        state
            .session
            .advance("judge ruled")
            .map_err(|e| StageFailure::new(stage, e))?;

        Ok(extraction)
    }

    /// Book a successful turn: evidence, component flag, logs. Returns the
    /// turn for the caller to append.
    async fn accept(&self, state: &mut DebateRun, stage: &str, output: RoundOutput) -> DebateTurn {
        let RoundOutput {
            turn,
            extraction,
            research,
        } = output;
        if let Some(report) = &research {
            state.evidence.record(report);
        }
        state.components.insert(stage.to_string(), true);

        let paths: BTreeMap<String, String> = extraction
            .predictions
            .iter()
            .map(|(h, ex)| (h.label(), ex.path.to_string()))
            .collect();
        let absorbed: Vec<String> = extraction
            .predictions
            .iter()
            .filter_map(|(h, ex)| {
                FailureKind::for_extraction(ex.path).map(|kind| format!("{}: {kind}", h.label()))
            })
            .collect();
        if !absorbed.is_empty() {
            warn!(stage, ?absorbed, "unreadable model output, domain fallback used");
        }
        let detail = json!({
            "round": turn.round_number,
            "probabilities": turn
                .probabilities()
                .into_iter()
                .map(|(h, p)| (h.label(), p))
                .collect::<BTreeMap<_, _>>(),
            "paths": paths,
            "absorbed": absorbed,
            "articles": research.as_ref().map(|r| r.articles.len()).unwrap_or(0),
        });
        self.log.log(&turn.role.to_string(), format!("{} complete", turn.slot_label()), Some(detail.clone()));
        self.record_activity(state, stage, ActivityOutcome::Success(detail))
            .await;
        turn
    }

    async fn reject(&self, state: &DebateRun, stage: &str, error: &ForecastError) {
        self.log.log(
            stage,
            format!("turn failed: {error}"),
            Some(json!({ "kind": error.failure_kind().to_string() })),
        );
        self.record_activity(state, stage, ActivityOutcome::Error(error.to_string()))
            .await;
    }

    // ── Store (best effort) ───────────────────────────────────────────────────

    async fn open_session(&self, question: &ForecastQuestion) -> Option<String> {
        let store = Arc::clone(self.store.as_ref()?);
        let question = question.clone();
        match tokio::task::spawn_blocking(move || store.create_session(&question)).await {
            Ok(Ok(id)) => Some(id),
            Ok(Err(e)) => {
                warn!("session store unavailable: {e}");
                None
            }
            Err(e) => {
                warn!("session store task failed: {e}");
                None
            }
        }
    }

    async fn record_activity(&self, state: &DebateRun, stage: &str, outcome: ActivityOutcome) {
        let stage = stage.to_string();
        self.with_store(state, move |store, id| store.log_activity(id, &stage, outcome))
            .await;
    }

    async fn update_session(&self, state: &DebateRun, update: SessionUpdate) {
        self.with_store(state, move |store, id| store.update_session(id, update))
            .await;
    }

    /// Run one store write on the blocking pool; failures are logged only.
    async fn with_store(
        &self,
        state: &DebateRun,
        write: impl FnOnce(&dyn SessionStore, &str) -> Result<(), StoreError> + Send + 'static,
    ) {
        let (Some(store), Some(id)) = (&self.store, &state.session_id) else {
            return;
        };
        let store = Arc::clone(store);
        let session = id.clone();
        let outcome = tokio::task::spawn_blocking(move || write(store.as_ref(), &session)).await;
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(session = %id, "session store write failed: {e}"),
            Err(e) => warn!(session = %id, "session store task failed: {e}"),
        }
    }
}

fn rounds_of(state: &DebateRun) -> u32 {
    state.transcript.total_rounds()
}
