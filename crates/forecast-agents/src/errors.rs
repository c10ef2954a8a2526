//! Forecast error taxonomy with failure classification.
//!
//! Every error in the agents layer is represented here. Callers can query
//! `failure_kind()` without string matching.
//!
//! ## Failure kinds
//!
//! | Kind                 | Surfaced to caller | Recovery |
//! |----------------------|--------------------|----------|
//! | ParseFailure         | no  | domain-aware fallback probability |
//! | InvocationFailure    | no  | fallback prediction per unresolved horizon |
//! | CalibrationViolation | no  | deterministic rewrite by calibration rules |
//! | ConfigurationError   | yes | none; raised before any run starts |
//!
//! Only invocation and configuration failures are errors. Parse failures and
//! calibration violations are absorbed where they happen and reported through
//! [`FailureKind::for_extraction`] and [`FailureKind::for_calibration`].

use std::fmt;

use forecast_coordination::debate::{TranscriptError, TransitionError};
use forecast_coordination::{CalibrationAdjustment, ExtractionPath};
use thiserror::Error;

/// How a failure is handled at the orchestrator boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Model text yielded no usable JSON or regex match.
    ParseFailure,
    /// Network, timeout, HTTP or quota error from the model or search call.
    InvocationFailure,
    /// An extracted probability broke a calibration rule.
    CalibrationViolation,
    /// Missing key or invalid setting. The only kind that escapes.
    ConfigurationError,
}

impl FailureKind {
    /// Whether the orchestrator absorbs this kind instead of raising it.
    pub fn is_recoverable(self) -> bool {
        !matches!(self, Self::ConfigurationError)
    }

    /// `ParseFailure` when the extractor had to fall back to the domain rate.
    pub fn for_extraction(path: ExtractionPath) -> Option<Self> {
        (path == ExtractionPath::DomainFallback).then_some(Self::ParseFailure)
    }

    /// `CalibrationViolation` when any rule rewrote the judge's value.
    pub fn for_calibration(adjustments: &[CalibrationAdjustment]) -> Option<Self> {
        (!adjustments.is_empty()).then_some(Self::CalibrationViolation)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ParseFailure => write!(f, "parse_failure"),
            Self::InvocationFailure => write!(f, "invocation_failure"),
            Self::CalibrationViolation => write!(f, "calibration_violation"),
            Self::ConfigurationError => write!(f, "configuration_error"),
        }
    }
}

/// Unified error type for the agents layer.
#[derive(Debug, Error)]
pub enum ForecastError {
    // ── Surfaced ──────────────────────────────────────────────────────────
    /// Configuration is invalid or missing required fields.
    #[error("Configuration error: {0}")]
    Configuration(String),

    // ── Recovered inside a run ────────────────────────────────────────────
    /// LLM request failed (network, HTTP status, empty completion).
    #[error("Invocation failure: {0}")]
    InvocationFailure(String),

    /// Provider rate limit or quota.
    #[error("Rate limit: {0}")]
    RateLimit(String),

    /// Request exceeded the configured timeout.
    #[error("Timeout after {0}s")]
    Timeout(u64),

    /// A search provider returned an error.
    #[error("Search failure [{provider}]: {message}")]
    Search { provider: String, message: String },

    /// A debate phase or transcript rule was broken.
    #[error("Debate protocol violation: {0}")]
    Protocol(String),
}

impl ForecastError {
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Configuration(_) => FailureKind::ConfigurationError,
            Self::InvocationFailure(_)
            | Self::RateLimit(_)
            | Self::Timeout(_)
            | Self::Search { .. }
            | Self::Protocol(_) => FailureKind::InvocationFailure,
        }
    }

    /// Map a transport error from an HTTP call.
    pub fn from_transport(err: reqwest::Error, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            Self::Timeout(timeout_secs)
        } else {
            Self::InvocationFailure(err.to_string())
        }
    }
}

impl From<TransitionError> for ForecastError {
    fn from(err: TransitionError) -> Self {
        Self::Protocol(err.to_string())
    }
}

impl From<TranscriptError> for ForecastError {
    fn from(err: TranscriptError) -> Self {
        Self::Protocol(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_configuration_escapes() {
        let cases = [
            ForecastError::Configuration("no key".into()),
            ForecastError::InvocationFailure("500".into()),
            ForecastError::RateLimit("429".into()),
            ForecastError::Timeout(30),
            ForecastError::Search {
                provider: "serp".into(),
                message: "down".into(),
            },
        ];
        let surfaced: Vec<_> = cases
            .iter()
            .filter(|e| !e.failure_kind().is_recoverable())
            .collect();
        assert_eq!(surfaced.len(), 1);
        assert!(matches!(surfaced[0], ForecastError::Configuration(_)));
    }

    #[test]
    fn test_display() {
        assert_eq!(
            ForecastError::Timeout(60).to_string(),
            "Timeout after 60s"
        );
        assert_eq!(FailureKind::ParseFailure.to_string(), "parse_failure");
    }

    #[test]
    fn test_absorbed_kinds() {
        assert_eq!(
            FailureKind::for_extraction(ExtractionPath::DomainFallback),
            Some(FailureKind::ParseFailure)
        );
        assert_eq!(FailureKind::for_extraction(ExtractionPath::RepairedJson), None);
        assert_eq!(FailureKind::for_calibration(&[]), None);
        let clamp = CalibrationAdjustment {
            rule: forecast_coordination::calibration::AdjustmentRule::FinalClamp,
            before: 1.0,
            after: 0.99,
            note: String::new(),
        };
        assert_eq!(
            FailureKind::for_calibration(&[clamp]),
            Some(FailureKind::CalibrationViolation)
        );
        assert!(FailureKind::ParseFailure.is_recoverable());
    }

    #[test]
    fn test_protocol_conversion() {
        let err: ForecastError = TranscriptError::Closed.into();
        assert!(matches!(err, ForecastError::Protocol(_)));
        assert_eq!(err.failure_kind(), FailureKind::InvocationFailure);
    }
}
