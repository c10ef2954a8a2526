//! Calibration rules — deterministic post-processing of a judge probability.
//!
//! The same rules are stated to the judge in its prompt; this module
//! re-applies them programmatically because compliance with prompt text is
//! not guaranteed.
//!
//! Order of application:
//!
//! 1. **Evidence gate**: weak evidence narrows the admissible range.
//! 2. **Disagreement anchor**: advocates more than 40 points apart widen the
//!    interval and pin the estimate near the base rate unless evidence is
//!    overwhelming.
//! 3. **Extremization guard**: values outside `[0.10, 0.90]` survive only
//!    with very strong evidence and a base rate in the same extreme.
//! 4. **Final clamp** into `[0.01, 0.99]`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{
    clamp_probability, CalibrationContext, ConfidenceLabel, TimeHorizon, MAX_PROBABILITY,
    MIN_PROBABILITY,
};

/// Tunable thresholds. `Default` holds the canonical rule set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationRules {
    /// Below this evidence quality the estimate is pinned to the base rate band.
    pub anchor_evidence_threshold: f64,
    /// Half-width of the base rate band.
    pub anchor_band: f64,
    /// Evidence gates as `(threshold, lo, hi)`, checked in order.
    pub evidence_bands: Vec<(f64, f64, f64)>,
    /// Advocate spread above which the disagreement rule fires.
    pub disagreement_threshold: f64,
    /// Interval multiplier when advocates disagree.
    pub disagreement_widening: f64,
    /// Extremes are values below `extreme_low` or above `extreme_high`.
    pub extreme_low: f64,
    pub extreme_high: f64,
    /// Evidence quality required to keep an extreme value (strictly greater).
    pub extremize_evidence: f64,
}

impl Default for CalibrationRules {
    fn default() -> Self {
        Self {
            anchor_evidence_threshold: 0.4,
            anchor_band: 0.10,
            evidence_bands: vec![(0.6, 0.20, 0.80), (0.7, 0.15, 0.85)],
            disagreement_threshold: 0.40,
            disagreement_widening: 1.5,
            extreme_low: 0.10,
            extreme_high: 0.90,
            extremize_evidence: 0.85,
        }
    }
}

/// Which rule rewrote a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentRule {
    EvidenceGate,
    DisagreementAnchor,
    ExtremizationGuard,
    FinalClamp,
}

impl std::fmt::Display for AdjustmentRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EvidenceGate => write!(f, "evidence_gate"),
            Self::DisagreementAnchor => write!(f, "disagreement_anchor"),
            Self::ExtremizationGuard => write!(f, "extremization_guard"),
            Self::FinalClamp => write!(f, "final_clamp"),
        }
    }
}

/// Record of one rewrite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationAdjustment {
    pub rule: AdjustmentRule,
    pub before: f64,
    pub after: f64,
    pub note: String,
}

/// Everything the rules look at for one horizon.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationInput {
    pub raw_probability: f64,
    pub base_rate: f64,
    /// Absolute gap between the latest high and low advocate probabilities.
    pub advocate_spread: Option<f64>,
    pub overwhelming_evidence: bool,
    pub confidence: ConfidenceLabel,
    pub context: CalibrationContext,
}

/// Output of [`CalibrationRules::apply`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibratedForecast {
    pub probability: f64,
    pub interval: (f64, f64),
    pub confidence: ConfidenceLabel,
    pub adjustments: Vec<CalibrationAdjustment>,
}

impl CalibratedForecast {
    pub fn was_adjusted(&self) -> bool {
        !self.adjustments.is_empty()
    }
}

impl CalibrationRules {
    /// Apply all rules to one horizon.
    pub fn apply(&self, input: &CalibrationInput) -> CalibratedForecast {
        let eq = input.context.evidence_quality;
        let base = input.base_rate.clamp(0.0, 1.0);
        let mut p = if input.raw_probability.is_nan() {
            base
        } else {
            input.raw_probability
        };
        let mut adjustments = Vec::new();

        let mut rewrite = |p: &mut f64, lo: f64, hi: f64, rule: AdjustmentRule, note: String| {
            let clamped = p.clamp(lo, hi);
            if (clamped - *p).abs() > f64::EPSILON {
                adjustments.push(CalibrationAdjustment {
                    rule,
                    before: *p,
                    after: clamped,
                    note,
                });
                *p = clamped;
            }
        };

        // 1. Evidence gate
        if eq < self.anchor_evidence_threshold {
            rewrite(
                &mut p,
                base - self.anchor_band,
                base + self.anchor_band,
                AdjustmentRule::EvidenceGate,
                format!("evidence quality {eq:.2} pins estimate to base rate {base:.2} ± {:.2}", self.anchor_band),
            );
        } else if let Some(&(threshold, lo, hi)) =
            self.evidence_bands.iter().find(|(threshold, _, _)| eq < *threshold)
        {
            rewrite(
                &mut p,
                lo,
                hi,
                AdjustmentRule::EvidenceGate,
                format!("evidence quality {eq:.2} < {threshold:.2} limits range to [{lo:.2}, {hi:.2}]"),
            );
        }

        // 2. Disagreement anchor
        let disagreement = input
            .advocate_spread
            .is_some_and(|s| s > self.disagreement_threshold);
        let overwhelming = input.overwhelming_evidence && eq >= self.extremize_evidence;
        if disagreement && !overwhelming {
            rewrite(
                &mut p,
                base - self.anchor_band,
                base + self.anchor_band,
                AdjustmentRule::DisagreementAnchor,
                format!(
                    "advocates {:.0} points apart; estimate held within {:.0} points of base rate",
                    input.advocate_spread.unwrap_or_default() * 100.0,
                    self.anchor_band * 100.0
                ),
            );
        }

        // 3. Extremization guard
        let low_extreme_ok = eq > self.extremize_evidence && base < self.extreme_low;
        let high_extreme_ok = eq > self.extremize_evidence && base > self.extreme_high;
        if (p < self.extreme_low && !low_extreme_ok) || (p > self.extreme_high && !high_extreme_ok) {
            rewrite(
                &mut p,
                self.extreme_low,
                self.extreme_high,
                AdjustmentRule::ExtremizationGuard,
                "extreme value without strong evidence and a consistent base rate".to_string(),
            );
        }

        // 4. Final clamp
        rewrite(
            &mut p,
            MIN_PROBABILITY,
            MAX_PROBABILITY,
            AdjustmentRule::FinalClamp,
            "outside [0.01, 0.99]".to_string(),
        );

        let mut half_width = 0.10 + 0.15 * (1.0 - eq);
        if disagreement {
            half_width *= self.disagreement_widening;
        }
        let interval = (
            clamp_probability(p - half_width),
            clamp_probability(p + half_width),
        );

        CalibratedForecast {
            probability: p,
            interval,
            confidence: self.recalibrate_confidence(input.confidence, &input.context),
            adjustments,
        }
    }

    /// Weak evidence or an incomplete methodology caps the reported confidence.
    pub fn recalibrate_confidence(
        &self,
        reported: ConfidenceLabel,
        context: &CalibrationContext,
    ) -> ConfidenceLabel {
        if context.evidence_quality < self.anchor_evidence_threshold {
            return ConfidenceLabel::Low;
        }
        let mut label = reported;
        if context.evidence_quality < 0.6 || context.methodology_completeness < 0.5 {
            label = label.at_most(ConfidenceLabel::Medium);
        }
        label
    }
}

// ── Context aggregation ───────────────────────────────────────────────────────

/// Search activity across one debate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceStats {
    pub searches_attempted: u32,
    pub searches_with_results: u32,
    pub articles_found: u32,
}

impl EvidenceStats {
    /// Record a search whose articles are all new to this debate.
    pub fn record(&mut self, articles: usize) {
        self.record_distinct(articles, articles);
    }

    /// Record a search that returned `results` articles, of which only
    /// `new_articles` had not been seen earlier in the debate.
    pub fn record_distinct(&mut self, results: usize, new_articles: usize) {
        self.searches_attempted += 1;
        if results > 0 {
            self.searches_with_results += 1;
        }
        self.articles_found += new_articles.min(results) as u32;
    }
}

/// Evidence measured below this floor when no search returned anything.
pub const NO_EVIDENCE_QUALITY: f64 = 0.2;

/// Evidence quality from search coverage, blended with the judge's own
/// assessment when it reported one.
///
/// With no articles at all the judge's figure is ignored.
pub fn evidence_quality(stats: &EvidenceStats, judge_reported: Option<f64>) -> f64 {
    if stats.articles_found == 0 || stats.searches_with_results == 0 {
        return NO_EVIDENCE_QUALITY;
    }
    let coverage = stats.searches_with_results as f64 / stats.searches_attempted.max(1) as f64;
    let volume = (stats.articles_found as f64 / 20.0).min(1.0);
    let measured = NO_EVIDENCE_QUALITY + 0.45 * coverage + 0.3 * volume;
    let blended = match judge_reported {
        Some(j) if j.is_finite() => (measured + j) / 2.0,
        _ => measured,
    };
    blended.clamp(0.0, 1.0)
}

/// Per-horizon absolute gap between two advocates.
pub fn advocate_spreads(
    high: &BTreeMap<TimeHorizon, f64>,
    low: &BTreeMap<TimeHorizon, f64>,
) -> BTreeMap<TimeHorizon, f64> {
    high.iter()
        .filter_map(|(h, hp)| low.get(h).map(|lp| (*h, (hp - lp).abs())))
        .collect()
}

/// `1 - mean spread`; full consensus when nothing is comparable.
pub fn consensus_strength(spreads: &BTreeMap<TimeHorizon, f64>) -> f64 {
    if spreads.is_empty() {
        return 1.0;
    }
    let mean = spreads.values().sum::<f64>() / spreads.len() as f64;
    (1.0 - mean).clamp(0.0, 1.0)
}

/// Share of methodology stages that completed.
pub fn methodology_completeness(components: &BTreeMap<String, bool>) -> f64 {
    if components.is_empty() {
        return 0.0;
    }
    components.values().filter(|ok| **ok).count() as f64 / components.len() as f64
}
