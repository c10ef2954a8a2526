//! Core forecast types shared by the debate, extractor, and calibration layers.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Lowest probability any forecast may report.
pub const MIN_PROBABILITY: f64 = 0.01;
/// Highest probability any forecast may report.
pub const MAX_PROBABILITY: f64 = 0.99;

/// Clamp a probability into `[MIN_PROBABILITY, MAX_PROBABILITY]`.
///
/// NaN maps to 0.5 so a poisoned value can never leave the clamp unbounded.
pub fn clamp_probability(p: f64) -> f64 {
    if p.is_nan() {
        return 0.5;
    }
    p.clamp(MIN_PROBABILITY, MAX_PROBABILITY)
}

// ── TimeHorizon ───────────────────────────────────────────────────────────────

/// A future duration for which a separate probability is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeHorizon {
    pub days: u32,
}

/// Error for labels that do not describe a positive number of days.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid time horizon label: {0:?}")]
pub struct HorizonParseError(pub String);

impl TimeHorizon {
    pub fn new(days: u32) -> Self {
        Self { days }
    }

    /// Canonical label, e.g. `"30d"`.
    pub fn label(&self) -> String {
        format!("{}d", self.days)
    }

    /// Key used in the structured JSON contracts, e.g. `"30_day"`.
    pub fn json_key(&self) -> String {
        format!("{}_day", self.days)
    }

    /// All keys a model might plausibly use for this horizon, in lookup order.
    pub fn lookup_keys(&self) -> [String; 4] {
        [
            self.json_key(),
            self.days.to_string(),
            self.label(),
            format!("{}_days", self.days),
        ]
    }

    /// The horizons used when a caller does not supply any.
    pub fn default_set() -> Vec<TimeHorizon> {
        [7, 30, 90, 180].into_iter().map(TimeHorizon::new).collect()
    }

    /// Parse a comma-separated list such as `"7d,30d,90"`.
    pub fn parse_list(raw: &str) -> Result<Vec<TimeHorizon>, HorizonParseError> {
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(TimeHorizon::from_str)
            .collect()
    }
}

impl FromStr for TimeHorizon {
    type Err = HorizonParseError;

    /// Accepts `"7d"`, `"7"`, `"7_day"`, `"7 days"` and similar spellings.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().to_ascii_lowercase();
        let digits: String = trimmed.chars().take_while(|c| c.is_ascii_digit()).collect();
        let suffix = trimmed[digits.len()..].trim_start_matches(['_', ' ', '-']);
        if !matches!(suffix, "" | "d" | "day" | "days") {
            return Err(HorizonParseError(s.to_string()));
        }
        match digits.parse::<u32>() {
            Ok(days) if days > 0 => Ok(Self { days }),
            _ => Err(HorizonParseError(s.to_string())),
        }
    }
}

impl TryFrom<String> for TimeHorizon {
    type Error = HorizonParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TimeHorizon> for String {
    fn from(value: TimeHorizon) -> Self {
        value.label()
    }
}

impl fmt::Display for TimeHorizon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}d", self.days)
    }
}

// ── ConfidenceLabel ───────────────────────────────────────────────────────────

/// Coarse confidence attached to a prediction. Ordered `Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConfidenceLabel {
    Low,
    Medium,
    High,
}

impl ConfidenceLabel {
    /// Case-insensitive parse of `low` / `medium` / `high` (also `moderate`).
    pub fn from_text(text: &str) -> Option<Self> {
        match text.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" | "moderate" | "med" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }

    /// Map a numeric confidence in `[0, 1]` onto a label.
    pub fn from_score(score: f64) -> Self {
        if score >= 0.7 {
            Self::High
        } else if score >= 0.4 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    /// Cap this label at `ceiling`.
    pub fn at_most(self, ceiling: Self) -> Self {
        self.min(ceiling)
    }
}

impl fmt::Display for ConfidenceLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "LOW"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::High => write!(f, "HIGH"),
        }
    }
}

// ── ForecastQuestion ──────────────────────────────────────────────────────────

/// Immutable input to one forecast run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastQuestion {
    pub text: String,
    #[serde(default)]
    pub background: String,
    #[serde(default = "TimeHorizon::default_set")]
    pub time_horizons: Vec<TimeHorizon>,
    /// Evidence published on or after this date must not reach the advocates.
    #[serde(default)]
    pub training_cutoff_date: Option<NaiveDate>,
}

impl ForecastQuestion {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            background: String::new(),
            time_horizons: TimeHorizon::default_set(),
            training_cutoff_date: None,
        }
    }

    pub fn with_background(mut self, background: impl Into<String>) -> Self {
        self.background = background.into();
        self
    }

    pub fn with_horizons(mut self, horizons: Vec<TimeHorizon>) -> Self {
        if !horizons.is_empty() {
            self.time_horizons = horizons;
        }
        self
    }

    pub fn with_cutoff(mut self, cutoff: Option<NaiveDate>) -> Self {
        self.training_cutoff_date = cutoff;
        self
    }
}

// ── ExtractedPrediction ───────────────────────────────────────────────────────

/// A typed prediction recovered from free model text.
///
/// `probability` is always inside `[0.01, 0.99]`; every constructor clamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedPrediction {
    pub probability: f64,
    pub confidence_label: ConfidenceLabel,
    pub reasoning: String,
    pub base_rate: Option<f64>,
}

impl ExtractedPrediction {
    pub fn new(
        probability: f64,
        confidence_label: ConfidenceLabel,
        reasoning: impl Into<String>,
        base_rate: Option<f64>,
    ) -> Self {
        Self {
            probability: clamp_probability(probability),
            confidence_label,
            reasoning: reasoning.into(),
            base_rate,
        }
    }

    /// Substitute used for every unresolved horizon when a turn fails.
    pub fn failure(message: &str) -> Self {
        Self::new(0.5, ConfidenceLabel::Low, format!("error: {message}"), None)
    }
}

// ── CalibrationContext ────────────────────────────────────────────────────────

/// Signals aggregated once after all turns complete; never mutated afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationContext {
    pub evidence_quality: f64,
    pub expert_consensus_strength: f64,
    pub methodology_completeness: f64,
}

impl CalibrationContext {
    pub fn new(
        evidence_quality: f64,
        expert_consensus_strength: f64,
        methodology_completeness: f64,
    ) -> Self {
        let unit = |v: f64| if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) };
        Self {
            evidence_quality: unit(evidence_quality),
            expert_consensus_strength: unit(expert_consensus_strength),
            methodology_completeness: unit(methodology_completeness),
        }
    }
}
