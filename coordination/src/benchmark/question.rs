//! Resolved benchmark questions and loading.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{ForecastQuestion, TimeHorizon};

/// A question with known outcomes per horizon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkQuestion {
    pub id: String,
    pub question: String,
    #[serde(default)]
    pub background: String,
    /// Date the question was frozen; evidence is cut off the day before.
    #[serde(default)]
    pub freeze_date: Option<NaiveDate>,
    #[serde(default)]
    pub resolution_date: Option<NaiveDate>,
    /// Outcome per horizon, `0.0` or `1.0`.
    pub outcomes: BTreeMap<TimeHorizon, f64>,
    /// Market or crowd probability at freeze time, if known.
    #[serde(default)]
    pub market_probability: Option<f64>,
}

impl BenchmarkQuestion {
    /// The forecast question this benchmark entry poses.
    pub fn to_forecast_question(&self) -> ForecastQuestion {
        ForecastQuestion::new(self.question.clone())
            .with_background(self.background.clone())
            .with_horizons(self.outcomes.keys().copied().collect())
            .with_cutoff(self.freeze_date)
    }
}

#[derive(Debug, Error)]
pub enum QuestionLoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("question {0} has no resolved horizons")]
    NoOutcomes(String),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum QuestionFile {
    List(Vec<BenchmarkQuestion>),
    Wrapped { questions: Vec<BenchmarkQuestion> },
}

/// Parse questions from JSON text: a bare array or `{"questions": [...]}`.
pub fn parse_questions(json: &str, origin: &str) -> Result<Vec<BenchmarkQuestion>, QuestionLoadError> {
    let file: QuestionFile = serde_json::from_str(json).map_err(|source| QuestionLoadError::Parse {
        path: origin.to_string(),
        source,
    })?;
    let questions = match file {
        QuestionFile::List(q) | QuestionFile::Wrapped { questions: q } => q,
    };
    if let Some(empty) = questions.iter().find(|q| q.outcomes.is_empty()) {
        return Err(QuestionLoadError::NoOutcomes(empty.id.clone()));
    }
    Ok(questions)
}

/// Load questions from a JSON file.
pub fn load_questions(path: &Path) -> Result<Vec<BenchmarkQuestion>, QuestionLoadError> {
    let origin = path.display().to_string();
    let json = std::fs::read_to_string(path).map_err(|source| QuestionLoadError::Io {
        path: origin.clone(),
        source,
    })?;
    parse_questions(&json, &origin)
}
