//! Session/activity store — lifecycle records for forecast runs.
//!
//! The orchestrator writes here fire-and-forget and never reads back.
//! Reads exist for the CLI and for tests.
//!
//! ```text
//! create_session ──► processing ──► completed
//!                         │
//!                         └───────► error
//! ```

pub mod file;

use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::types::{ConfidenceLabel, ForecastQuestion, TimeHorizon};

pub use file::JsonFileSessionStore;

/// Errors from a session store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("session not found: {0}")]
    NotFound(String),

    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store lock poisoned")]
    Poisoned,
}

/// Lifecycle status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Processing,
    Completed,
    Error,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Processing)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Processing => write!(f, "processing"),
            Self::Completed => write!(f, "completed"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// One forecast run as recorded by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub question: String,
    pub background: String,
    pub time_horizons: Vec<TimeHorizon>,
    pub status: SessionStatus,
    pub forecast_probability: Option<f64>,
    pub confidence_level: Option<ConfidenceLabel>,
    pub reasoning: Option<String>,
    pub base_rate: Option<f64>,
    pub evidence_quality: Option<f64>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub processing_time_seconds: Option<f64>,
}

impl SessionRecord {
    fn new(question: &ForecastQuestion) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            question: question.text.clone(),
            background: question.background.clone(),
            time_horizons: question.time_horizons.clone(),
            status: SessionStatus::Processing,
            forecast_probability: None,
            confidence_level: None,
            reasoning: None,
            base_rate: None,
            evidence_quality: None,
            error_message: None,
            created_at: Utc::now(),
            completed_at: None,
            processing_time_seconds: None,
        }
    }

    fn apply(&mut self, update: SessionUpdate) {
        self.status = update.status;
        self.forecast_probability = update.forecast_probability.or(self.forecast_probability);
        self.confidence_level = update.confidence_level.or(self.confidence_level);
        self.reasoning = update.reasoning.or(self.reasoning.take());
        self.base_rate = update.base_rate.or(self.base_rate);
        self.evidence_quality = update.evidence_quality.or(self.evidence_quality);
        self.error_message = update.error_message.or(self.error_message.take());
        if update.status.is_terminal() && self.completed_at.is_none() {
            let now = Utc::now();
            self.completed_at = Some(now);
            self.processing_time_seconds =
                Some((now - self.created_at).num_milliseconds() as f64 / 1000.0);
        }
    }

    /// Compact status line.
    pub fn summary_line(&self) -> String {
        let probability = self
            .forecast_probability
            .map(|p| format!("{:.1}%", p * 100.0))
            .unwrap_or_else(|| "-".to_string());
        format!(
            "{} [{}] p={} | {}",
            self.id, self.status, probability, self.question
        )
    }
}

/// Fields written when a session changes status. `None` leaves a field as is.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionUpdate {
    pub status: SessionStatus,
    pub forecast_probability: Option<f64>,
    pub confidence_level: Option<ConfidenceLabel>,
    pub reasoning: Option<String>,
    pub base_rate: Option<f64>,
    pub evidence_quality: Option<f64>,
    pub error_message: Option<String>,
}

impl SessionUpdate {
    pub fn completed(
        forecast_probability: f64,
        confidence_level: ConfidenceLabel,
        reasoning: impl Into<String>,
    ) -> Self {
        Self {
            status: SessionStatus::Completed,
            forecast_probability: Some(forecast_probability),
            confidence_level: Some(confidence_level),
            reasoning: Some(reasoning.into()),
            base_rate: None,
            evidence_quality: None,
            error_message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: SessionStatus::Error,
            forecast_probability: None,
            confidence_level: None,
            reasoning: None,
            base_rate: None,
            evidence_quality: None,
            error_message: Some(message.into()),
        }
    }

    pub fn with_base_rate(mut self, base_rate: f64) -> Self {
        self.base_rate = Some(base_rate);
        self
    }

    pub fn with_evidence_quality(mut self, evidence_quality: f64) -> Self {
        self.evidence_quality = Some(evidence_quality);
        self
    }
}

/// Outcome of one orchestrator stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum ActivityOutcome {
    Success(Value),
    Error(String),
}

/// One stage event within a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub session_id: String,
    pub stage: String,
    pub outcome: ActivityOutcome,
    pub timestamp: DateTime<Utc>,
}

/// Persistence boundary for forecast sessions.
pub trait SessionStore: Send + Sync {
    /// Record a new `processing` session and return its id.
    fn create_session(&self, question: &ForecastQuestion) -> Result<String, StoreError>;

    fn update_session(&self, id: &str, update: SessionUpdate) -> Result<(), StoreError>;

    fn log_activity(&self, id: &str, stage: &str, outcome: ActivityOutcome)
        -> Result<(), StoreError>;

    fn get_session(&self, id: &str) -> Result<Option<SessionRecord>, StoreError>;

    /// Most recent first.
    fn list_sessions(&self, limit: usize) -> Result<Vec<SessionRecord>, StoreError>;

    fn activities(&self, id: &str) -> Result<Vec<ActivityRecord>, StoreError>;
}

// ── Shared ledger ─────────────────────────────────────────────────────────────

/// Plain data behind both store implementations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionLedger {
    pub sessions: Vec<SessionRecord>,
    pub activities: Vec<ActivityRecord>,
}

impl SessionLedger {
    fn create(&mut self, question: &ForecastQuestion) -> String {
        let record = SessionRecord::new(question);
        let id = record.id.clone();
        self.sessions.push(record);
        id
    }

    fn update(&mut self, id: &str, update: SessionUpdate) -> Result<(), StoreError> {
        let record = self
            .sessions
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        record.apply(update);
        Ok(())
    }

    fn log(&mut self, id: &str, stage: &str, outcome: ActivityOutcome) -> Result<(), StoreError> {
        if !self.sessions.iter().any(|s| s.id == id) {
            return Err(StoreError::NotFound(id.to_string()));
        }
        self.activities.push(ActivityRecord {
            session_id: id.to_string(),
            stage: stage.to_string(),
            outcome,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    fn get(&self, id: &str) -> Option<SessionRecord> {
        self.sessions.iter().find(|s| s.id == id).cloned()
    }

    fn recent(&self, limit: usize) -> Vec<SessionRecord> {
        self.sessions.iter().rev().take(limit).cloned().collect()
    }

    fn activities_for(&self, id: &str) -> Vec<ActivityRecord> {
        self.activities
            .iter()
            .filter(|a| a.session_id == id)
            .cloned()
            .collect()
    }
}

fn lock(ledger: &Mutex<SessionLedger>) -> Result<MutexGuard<'_, SessionLedger>, StoreError> {
    ledger.lock().map_err(|_| StoreError::Poisoned)
}

// ── InMemorySessionStore ──────────────────────────────────────────────────────

/// Process-local store. Used by tests and `--no-store` runs.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    ledger: Mutex<SessionLedger>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for InMemorySessionStore {
    fn create_session(&self, question: &ForecastQuestion) -> Result<String, StoreError> {
        Ok(lock(&self.ledger)?.create(question))
    }

    fn update_session(&self, id: &str, update: SessionUpdate) -> Result<(), StoreError> {
        lock(&self.ledger)?.update(id, update)
    }

    fn log_activity(
        &self,
        id: &str,
        stage: &str,
        outcome: ActivityOutcome,
    ) -> Result<(), StoreError> {
        lock(&self.ledger)?.log(id, stage, outcome)
    }

    fn get_session(&self, id: &str) -> Result<Option<SessionRecord>, StoreError> {
        Ok(lock(&self.ledger)?.get(id))
    }

    fn list_sessions(&self, limit: usize) -> Result<Vec<SessionRecord>, StoreError> {
        Ok(lock(&self.ledger)?.recent(limit))
    }

    fn activities(&self, id: &str) -> Result<Vec<ActivityRecord>, StoreError> {
        Ok(lock(&self.ledger)?.activities_for(id))
    }
}
