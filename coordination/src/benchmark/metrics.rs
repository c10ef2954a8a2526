//! Benchmark metrics
//!
//! Scores individual forecasts and aggregates them into a report.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::TimeHorizon;

/// Floor used to keep the log score finite.
const LOG_EPSILON: f64 = 1e-15;

/// Squared error between forecast and outcome. Lower is better.
pub fn brier_score(probability: f64, outcome: f64) -> f64 {
    (probability - outcome).powi(2)
}

/// Log of the probability assigned to what actually happened. Higher is better.
pub fn log_score(probability: f64, outcome: f64) -> f64 {
    let p = probability.clamp(LOG_EPSILON, 1.0 - LOG_EPSILON);
    if outcome >= 0.5 {
        p.ln()
    } else {
        (1.0 - p).ln()
    }
}

/// Score of one forecast for one horizon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HorizonScore {
    pub horizon: TimeHorizon,
    pub probability: f64,
    pub outcome: f64,
    pub brier: f64,
    pub log_score: f64,
    /// `p > 0.5` predicted the realized outcome.
    pub correct: bool,
    /// Distance from 0.5 on a 0..1 scale.
    pub confidence: f64,
}

impl HorizonScore {
    pub fn new(horizon: TimeHorizon, probability: f64, outcome: f64) -> Self {
        Self {
            horizon,
            probability,
            outcome,
            brier: brier_score(probability, outcome),
            log_score: log_score(probability, outcome),
            correct: (probability > 0.5) == (outcome >= 0.5),
            confidence: (probability - 0.5).abs() * 2.0,
        }
    }
}

/// All scores for one benchmark question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionScore {
    pub question_id: String,
    pub scores: Vec<HorizonScore>,
    /// Absolute gap from the market probability on the first horizon.
    pub calibration_error: Option<f64>,
    pub degraded: bool,
    pub elapsed_ms: u64,
    pub error: Option<String>,
}

impl QuestionScore {
    pub fn mean_brier(&self) -> Option<f64> {
        mean(self.scores.iter().map(|s| s.brier))
    }
}

/// Qualitative band for a mean Brier score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PerformanceLevel {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl PerformanceLevel {
    pub fn from_brier(brier: f64) -> Self {
        if brier < 0.2 {
            Self::Excellent
        } else if brier < 0.25 {
            Self::Good
        } else if brier < 0.3 {
            Self::Fair
        } else {
            Self::Poor
        }
    }
}

impl std::fmt::Display for PerformanceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Excellent => write!(f, "Excellent"),
            Self::Good => write!(f, "Good"),
            Self::Fair => write!(f, "Fair"),
            Self::Poor => write!(f, "Poor"),
        }
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

/// Aggregate over a benchmark run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkSummary {
    pub total_questions: usize,
    pub scored_questions: usize,
    pub degraded_questions: usize,
    pub mean_brier: Option<f64>,
    pub mean_log_score: Option<f64>,
    pub accuracy: Option<f64>,
    pub mean_confidence: Option<f64>,
    pub mean_calibration_error: Option<f64>,
    pub brier_by_horizon: BTreeMap<TimeHorizon, f64>,
    pub performance_level: Option<PerformanceLevel>,
    pub total_time_ms: u64,
}

impl BenchmarkSummary {
    pub fn from_scores(results: &[QuestionScore]) -> Self {
        let all = || results.iter().flat_map(|r| r.scores.iter());

        let mut by_horizon: BTreeMap<TimeHorizon, Vec<f64>> = BTreeMap::new();
        for s in all() {
            by_horizon.entry(s.horizon).or_default().push(s.brier);
        }
        let brier_by_horizon = by_horizon
            .into_iter()
            .filter_map(|(h, v)| mean(v.into_iter()).map(|m| (h, m)))
            .collect();

        let mean_brier = mean(all().map(|s| s.brier));
        Self {
            total_questions: results.len(),
            scored_questions: results.iter().filter(|r| !r.scores.is_empty()).count(),
            degraded_questions: results.iter().filter(|r| r.degraded).count(),
            mean_brier,
            mean_log_score: mean(all().map(|s| s.log_score)),
            accuracy: mean(all().map(|s| if s.correct { 1.0 } else { 0.0 })),
            mean_confidence: mean(all().map(|s| s.confidence)),
            mean_calibration_error: mean(results.iter().filter_map(|r| r.calibration_error)),
            brier_by_horizon,
            performance_level: mean_brier.map(PerformanceLevel::from_brier),
            total_time_ms: results.iter().map(|r| r.elapsed_ms).sum(),
        }
    }

    /// Markdown report.
    pub fn format_report(&self) -> String {
        let fmt = |v: Option<f64>, digits: usize| match v {
            Some(v) => format!("{v:.digits$}"),
            None => "n/a".to_string(),
        };

        let mut report = String::new();
        report.push_str("# Forecast Benchmark Results\n\n");

        report.push_str("## Summary\n\n");
        report.push_str(&format!(
            "| Metric | Value |\n\
             |--------|-------|\n\
             | Questions | {} |\n\
             | Scored | {} |\n\
             | Degraded | {} |\n\
             | Mean Brier | {} |\n\
             | Mean Log Score | {} |\n\
             | Accuracy | {} |\n\
             | Mean Confidence | {} |\n\
             | Calibration Error | {} |\n\
             | Performance | {} |\n\n",
            self.total_questions,
            self.scored_questions,
            self.degraded_questions,
            fmt(self.mean_brier, 4),
            fmt(self.mean_log_score, 4),
            fmt(self.accuracy.map(|a| a * 100.0), 1),
            fmt(self.mean_confidence, 3),
            fmt(self.mean_calibration_error, 3),
            self.performance_level
                .map(|l| l.to_string())
                .unwrap_or_else(|| "n/a".to_string()),
        ));

        if !self.brier_by_horizon.is_empty() {
            report.push_str("## Brier by Horizon\n\n| Horizon | Brier |\n|---------|-------|\n");
            for (h, b) in &self.brier_by_horizon {
                report.push_str(&format!("| {h} | {b:.4} |\n"));
            }
            report.push('\n');
        }

        report.push_str(&format!(
            "- Total Time: {:.1}s\n",
            self.total_time_ms as f64 / 1000.0
        ));
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_brier() {
        assert_eq!(brier_score(1.0, 1.0), 0.0);
        assert!((brier_score(0.7, 0.0) - 0.49).abs() < 1e-12);
        assert!((brier_score(0.7, 1.0) - 0.09).abs() < 1e-12);
    }

    #[test]
    fn test_log_score_is_finite_at_extremes() {
        assert!(log_score(0.0, 1.0).is_finite());
        assert!(log_score(1.0, 0.0).is_finite());
        assert!((log_score(0.5, 1.0) - 0.5f64.ln()).abs() < 1e-12);
        assert!(log_score(0.9, 1.0) > log_score(0.6, 1.0));
    }

    #[test]
    fn test_horizon_score() {
        let s = HorizonScore::new(TimeHorizon::new(7), 0.8, 1.0);
        assert!(s.correct);
        assert!((s.confidence - 0.6).abs() < 1e-12);
        let s = HorizonScore::new(TimeHorizon::new(7), 0.5, 1.0);
        assert!(!s.correct);
    }

    #[test]
    fn test_performance_levels() {
        assert_eq!(PerformanceLevel::from_brier(0.1), PerformanceLevel::Excellent);
        assert_eq!(PerformanceLevel::from_brier(0.22), PerformanceLevel::Good);
        assert_eq!(PerformanceLevel::from_brier(0.27), PerformanceLevel::Fair);
        assert_eq!(PerformanceLevel::from_brier(0.4), PerformanceLevel::Poor);
    }

    #[test]
    fn test_summary_aggregation() {
        let h7 = TimeHorizon::new(7);
        let h30 = TimeHorizon::new(30);
        let results = vec![
            QuestionScore {
                question_id: "a".into(),
                scores: vec![HorizonScore::new(h7, 0.8, 1.0), HorizonScore::new(h30, 0.4, 0.0)],
                calibration_error: Some(0.1),
                degraded: false,
                elapsed_ms: 1000,
                error: None,
            },
            QuestionScore {
                question_id: "b".into(),
                scores: vec![HorizonScore::new(h7, 0.5, 0.0)],
                calibration_error: None,
                degraded: true,
                elapsed_ms: 500,
                error: Some("timeout".into()),
            },
        ];
        let summary = BenchmarkSummary::from_scores(&results);
        assert_eq!(summary.total_questions, 2);
        assert_eq!(summary.degraded_questions, 1);
        // (0.04 + 0.16 + 0.25) / 3
        assert!((summary.mean_brier.unwrap() - 0.15).abs() < 1e-12);
        assert!((summary.brier_by_horizon[&h7] - 0.145).abs() < 1e-12);
        assert_eq!(summary.performance_level, Some(PerformanceLevel::Excellent));
        assert_eq!(summary.total_time_ms, 1500);

        let report = summary.format_report();
        assert!(report.contains("| Questions | 2 |"));
        assert!(report.contains("| 7d | 0.1450 |"));
    }

    #[test]
    fn test_empty_summary() {
        let summary = BenchmarkSummary::from_scores(&[]);
        assert!(summary.mean_brier.is_none());
        assert!(summary.format_report().contains("n/a"));
    }
}
