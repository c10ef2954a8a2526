//! Superforecaster coordination core
//!
//! Deterministic building blocks for a multi-agent forecasting debate:
//!
//! - [`prompts`]: role backstories, advocate and judge task templates with
//!   embedded JSON output contracts
//! - [`extract`]: tolerant parsing of model output into bounded probabilities
//! - [`domain`]: keyword domains and fallback base rates
//! - [`calibration`]: programmatic calibration rules and context aggregation
//! - [`debate`]: phase machine, ordered transcript, judge synthesis
//! - [`session`]: session/activity store (in-memory and JSON file)
//! - [`benchmark`]: resolved questions and Brier/log scoring
//!
//! Nothing in this crate performs network I/O.

#![allow(clippy::uninlined_format_args)]

pub mod benchmark;
pub mod calibration;
pub mod debate;
pub mod domain;
pub mod extract;
pub mod prompts;
pub mod result;
pub mod session;
pub mod types;

pub use calibration::{CalibrationAdjustment, CalibrationRules, EvidenceStats};
pub use debate::{DebatePhase, DebateRole, DebateSession, DebateTurn, Transcript};
pub use domain::QuestionDomain;
pub use extract::{extract_horizon_predictions, extract_prediction, Extraction, ExtractionPath};
pub use result::{ForecastMetadata, ForecastResult, HorizonForecast};
pub use session::{
    ActivityOutcome, InMemorySessionStore, JsonFileSessionStore, SessionRecord, SessionStatus,
    SessionStore, SessionUpdate, StoreError,
};
pub use types::{
    CalibrationContext, ConfidenceLabel, ExtractedPrediction, ForecastQuestion, TimeHorizon,
};
