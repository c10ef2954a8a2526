//! Judge synthesis — aggregates the calibration context from a finished
//! transcript and runs every judged horizon through the calibration rules.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::transcript::{DebateRole, Transcript};
use crate::calibration::{
    advocate_spreads, consensus_strength, evidence_quality, methodology_completeness,
    CalibrationInput, CalibrationRules, EvidenceStats,
};
use crate::domain::fallback_probability;
use crate::extract::HorizonExtraction;
use crate::result::HorizonForecast;
use crate::types::{CalibrationContext, ExtractedPrediction, ForecastQuestion, TimeHorizon};

/// Calibrated horizons plus the context that drove them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Synthesis {
    pub horizons: Vec<HorizonForecast>,
    pub context: CalibrationContext,
    pub base_rate: f64,
    pub spreads: BTreeMap<TimeHorizon, f64>,
}

/// Base rate anchor: judge, then mean advocate base rate, then domain default.
pub fn resolve_base_rate(
    question: &ForecastQuestion,
    transcript: &Transcript,
    judge: &HorizonExtraction,
) -> f64 {
    if let Some(rate) = judge.signals.base_rate {
        return rate;
    }
    let advocate_rates: Vec<f64> = [DebateRole::HighAdvocate, DebateRole::LowAdvocate]
        .iter()
        .filter_map(|role| transcript.latest(*role))
        .filter_map(|turn| {
            turn.predictions
                .values()
                .find_map(|ex| ex.prediction.base_rate)
        })
        .collect();
    if advocate_rates.is_empty() {
        fallback_probability(&question.text)
    } else {
        advocate_rates.iter().sum::<f64>() / advocate_rates.len() as f64
    }
}

/// Build the calibration context and calibrate every requested horizon.
pub fn synthesize(
    rules: &CalibrationRules,
    question: &ForecastQuestion,
    transcript: &Transcript,
    judge: &HorizonExtraction,
    evidence: &EvidenceStats,
    components: &BTreeMap<String, bool>,
) -> Synthesis {
    let high = transcript
        .latest(DebateRole::HighAdvocate)
        .map(|t| t.probabilities())
        .unwrap_or_default();
    let low = transcript
        .latest(DebateRole::LowAdvocate)
        .map(|t| t.probabilities())
        .unwrap_or_default();
    let spreads = advocate_spreads(&high, &low);

    let context = CalibrationContext::new(
        evidence_quality(evidence, judge.signals.evidence_quality),
        consensus_strength(&spreads),
        methodology_completeness(components),
    );
    let base_rate = resolve_base_rate(question, transcript, judge);

    let horizons = question
        .time_horizons
        .iter()
        .map(|horizon| {
            let Some(extraction) = judge.predictions.get(horizon) else {
                return HorizonForecast::failed(*horizon, "judge gave no prediction for this horizon");
            };
            let raw = &extraction.prediction;
            let calibrated = rules.apply(&CalibrationInput {
                raw_probability: raw.probability,
                base_rate,
                advocate_spread: spreads.get(horizon).copied(),
                overwhelming_evidence: judge.signals.overwhelming_evidence,
                confidence: raw.confidence_label,
                context,
            });
            HorizonForecast {
                horizon: *horizon,
                prediction: ExtractedPrediction::new(
                    calibrated.probability,
                    calibrated.confidence,
                    raw.reasoning.clone(),
                    Some(base_rate),
                ),
                raw_probability: raw.probability,
                interval: calibrated.interval,
                adjustments: calibrated.adjustments,
                path: extraction.path,
            }
        })
        .collect();

    Synthesis {
        horizons,
        context,
        base_rate,
        spreads,
    }
}
