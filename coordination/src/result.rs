//! Terminal output of one forecast run.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::calibration::CalibrationAdjustment;
use crate::debate::{DebateRole, DebateTurn};
use crate::extract::ExtractionPath;
use crate::types::{CalibrationContext, ExtractedPrediction, ForecastQuestion, TimeHorizon};

/// Stage key for evidence gathering.
pub const STAGE_EVIDENCE_SEARCH: &str = "evidence_search";
/// Stage key for the judge turn.
pub const STAGE_JUDGE: &str = "judge";
/// Stage key for programmatic calibration.
pub const STAGE_CALIBRATION: &str = "calibration";

/// Methodology key for one debate turn, e.g. `round_2_high_advocate`.
pub fn stage_name(round: u32, role: DebateRole) -> String {
    match role {
        DebateRole::Judge => STAGE_JUDGE.to_string(),
        advocate => format!("round_{round}_{advocate}"),
    }
}

/// Every stage of a debate with `total_rounds` rounds, in execution order.
pub fn methodology_stages(total_rounds: u32) -> Vec<String> {
    let mut stages = vec![STAGE_EVIDENCE_SEARCH.to_string()];
    for round in 1..=total_rounds.max(1) {
        stages.push(stage_name(round, DebateRole::HighAdvocate));
        stages.push(stage_name(round, DebateRole::LowAdvocate));
    }
    stages.push(STAGE_JUDGE.to_string());
    stages.push(STAGE_CALIBRATION.to_string());
    stages
}

/// Final prediction for one horizon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HorizonForecast {
    pub horizon: TimeHorizon,
    pub prediction: ExtractedPrediction,
    /// Judge probability before calibration rules ran.
    pub raw_probability: f64,
    pub interval: (f64, f64),
    pub adjustments: Vec<CalibrationAdjustment>,
    pub path: ExtractionPath,
}

impl HorizonForecast {
    /// Substitute for a horizon the debate could not resolve.
    pub fn failed(horizon: TimeHorizon, message: &str) -> Self {
        let prediction = ExtractedPrediction::failure(message);
        Self {
            horizon,
            raw_probability: prediction.probability,
            interval: (prediction.probability, prediction.probability),
            prediction,
            adjustments: Vec::new(),
            path: ExtractionPath::DomainFallback,
        }
    }

    pub fn is_failure(&self) -> bool {
        self.prediction.reasoning.starts_with("error: ")
    }
}

/// Provenance for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastMetadata {
    pub session_id: Option<String>,
    pub model: String,
    pub prompt_version: String,
    pub rounds_requested: u32,
    pub rounds_completed: u32,
    pub search_budget_per_advocate: u32,
    pub queries: Vec<String>,
    pub sources: Vec<String>,
    pub articles_found: u32,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    /// Set when a turn failed and the run short-circuited.
    pub failure: Option<String>,
}

/// Everything a caller gets back from a run. Never an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResult {
    pub question: ForecastQuestion,
    pub horizons: Vec<HorizonForecast>,
    pub methodology_components: BTreeMap<String, bool>,
    /// Judge JSON as parsed, or `null`.
    pub full_analysis: Value,
    pub metadata: ForecastMetadata,
    pub calibration: Option<CalibrationContext>,
    pub transcript: Vec<DebateTurn>,
}

impl ForecastResult {
    pub fn horizon(&self, horizon: TimeHorizon) -> Option<&HorizonForecast> {
        self.horizons.iter().find(|h| h.horizon == horizon)
    }

    /// Forecast for the first requested horizon.
    pub fn primary(&self) -> Option<&HorizonForecast> {
        self.horizons.first()
    }

    pub fn component(&self, stage: &str) -> bool {
        self.methodology_components
            .get(stage)
            .copied()
            .unwrap_or(false)
    }

    pub fn is_degraded(&self) -> bool {
        self.metadata.failure.is_some() || self.horizons.iter().any(HorizonForecast::is_failure)
    }

    /// Compact summary line.
    pub fn summary_line(&self) -> String {
        let horizons = self
            .horizons
            .iter()
            .map(|h| {
                format!(
                    "{}={:.0}%({})",
                    h.horizon,
                    h.prediction.probability * 100.0,
                    h.prediction.confidence_label
                )
            })
            .collect::<Vec<_>>()
            .join(" ");
        let status = if self.is_degraded() { "DEGRADED" } else { "OK" };
        format!(
            "[{}] {} | {}/{} rounds | {}ms",
            status,
            horizons,
            self.metadata.rounds_completed,
            self.metadata.rounds_requested,
            self.metadata.elapsed_ms
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_names() {
        assert_eq!(stage_name(2, DebateRole::HighAdvocate), "round_2_high_advocate");
        assert_eq!(stage_name(9, DebateRole::Judge), "judge");
        let stages = methodology_stages(3);
        assert_eq!(stages.len(), 9);
        assert_eq!(stages.first().unwrap(), "evidence_search");
        assert_eq!(stages[1], "round_1_high_advocate");
        assert_eq!(stages.last().unwrap(), "calibration");
    }

    #[test]
    fn test_failed_horizon() {
        let h = HorizonForecast::failed(TimeHorizon::new(7), "HTTP 500");
        assert!(h.is_failure());
        assert_eq!(h.prediction.probability, 0.5);
        assert_eq!(h.prediction.reasoning, "error: HTTP 500");
    }
}
