//! Debate roles, turns, and the ordered transcript.
//!
//! The transcript only accepts turns in protocol order: round-major, high
//! advocate before low advocate, then exactly one judge turn. Later prompts
//! embed earlier outputs, so no other order is meaningful.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::extract::Extraction;
use crate::types::TimeHorizon;

/// Closed set of debate roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebateRole {
    HighAdvocate,
    LowAdvocate,
    Judge,
}

impl DebateRole {
    pub fn is_advocate(self) -> bool {
        !matches!(self, Self::Judge)
    }

    /// The opposing advocate. The judge has no opponent.
    pub fn opponent(self) -> Option<Self> {
        match self {
            Self::HighAdvocate => Some(Self::LowAdvocate),
            Self::LowAdvocate => Some(Self::HighAdvocate),
            Self::Judge => None,
        }
    }

    /// Human-readable name used in prompts and logs.
    pub fn title(self) -> &'static str {
        match self {
            Self::HighAdvocate => "High Advocate",
            Self::LowAdvocate => "Low Advocate",
            Self::Judge => "Judge",
        }
    }
}

impl std::fmt::Display for DebateRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HighAdvocate => write!(f, "high_advocate"),
            Self::LowAdvocate => write!(f, "low_advocate"),
            Self::Judge => write!(f, "judge"),
        }
    }
}

/// One model turn. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebateTurn {
    pub round_number: u32,
    pub role: DebateRole,
    pub prompt_text: String,
    pub raw_response_text: String,
    /// JSON object recovered from the response, if any.
    pub parsed: Option<Value>,
    /// Per-horizon predictions extracted from the response.
    pub predictions: BTreeMap<TimeHorizon, Extraction>,
    pub created_at: DateTime<Utc>,
}

impl DebateTurn {
    pub fn new(
        round_number: u32,
        role: DebateRole,
        prompt_text: impl Into<String>,
        raw_response_text: impl Into<String>,
    ) -> Self {
        Self {
            round_number,
            role,
            prompt_text: prompt_text.into(),
            raw_response_text: raw_response_text.into(),
            parsed: None,
            predictions: BTreeMap::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_extraction(
        mut self,
        parsed: Option<Value>,
        predictions: BTreeMap<TimeHorizon, Extraction>,
    ) -> Self {
        self.parsed = parsed;
        self.predictions = predictions;
        self
    }

    /// Probability per horizon, for spread computations.
    pub fn probabilities(&self) -> BTreeMap<TimeHorizon, f64> {
        self.predictions
            .iter()
            .map(|(h, ex)| (*h, ex.prediction.probability))
            .collect()
    }

    /// `round N / role` label for logs.
    pub fn slot_label(&self) -> String {
        format!("round {} / {}", self.round_number, self.role)
    }
}

/// Rejected transcript append.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TranscriptError {
    #[error("out-of-order turn: expected round {expected_round} {expected_role}, got round {got_round} {got_role}")]
    OutOfOrder {
        expected_round: u32,
        expected_role: DebateRole,
        got_round: u32,
        got_role: DebateRole,
    },
    #[error("transcript is closed; the judge has already ruled")]
    Closed,
}

/// Ordered record of every turn in one debate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    total_rounds: u32,
    turns: Vec<DebateTurn>,
}

impl Transcript {
    pub fn new(total_rounds: u32) -> Self {
        Self {
            total_rounds: total_rounds.max(1),
            turns: Vec::new(),
        }
    }

    /// The slot the next turn must occupy, or `None` once the judge has ruled.
    ///
    /// The judge's turn carries the final round number.
    pub fn expected_next(&self) -> Option<(u32, DebateRole)> {
        let n = self.turns.len() as u32;
        let advocate_turns = self.total_rounds * 2;
        if n < advocate_turns {
            let role = if n % 2 == 0 {
                DebateRole::HighAdvocate
            } else {
                DebateRole::LowAdvocate
            };
            Some((n / 2 + 1, role))
        } else if n == advocate_turns {
            Some((self.total_rounds, DebateRole::Judge))
        } else {
            None
        }
    }

    /// Append a turn, enforcing protocol order.
    pub fn push(&mut self, turn: DebateTurn) -> Result<(), TranscriptError> {
        let (expected_round, expected_role) = self.expected_next().ok_or(TranscriptError::Closed)?;
        if turn.round_number != expected_round || turn.role != expected_role {
            return Err(TranscriptError::OutOfOrder {
                expected_round,
                expected_role,
                got_round: turn.round_number,
                got_role: turn.role,
            });
        }
        self.turns.push(turn);
        Ok(())
    }

    pub fn turns(&self) -> &[DebateTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn total_rounds(&self) -> u32 {
        self.total_rounds
    }

    /// Most recent turn by `role`.
    pub fn latest(&self, role: DebateRole) -> Option<&DebateTurn> {
        self.turns.iter().rev().find(|t| t.role == role)
    }

    /// Most recent turn by the opponent of `role`.
    pub fn opponent_latest(&self, role: DebateRole) -> Option<&DebateTurn> {
        role.opponent().and_then(|opp| self.latest(opp))
    }

    /// Every advocate turn, in order. This is exactly what the judge sees.
    pub fn advocate_turns(&self) -> &[DebateTurn] {
        let end = self
            .turns
            .iter()
            .position(|t| t.role == DebateRole::Judge)
            .unwrap_or(self.turns.len());
        &self.turns[..end]
    }

    /// Whether all advocate rounds are in and the judge may run.
    pub fn ready_for_judge(&self) -> bool {
        self.expected_next()
            .is_some_and(|(_, role)| role == DebateRole::Judge)
    }

    pub fn judge_turn(&self) -> Option<&DebateTurn> {
        self.latest(DebateRole::Judge)
    }

    pub fn into_turns(self) -> Vec<DebateTurn> {
        self.turns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(round: u32, role: DebateRole) -> DebateTurn {
        DebateTurn::new(round, role, format!("prompt {round} {role}"), format!("reply {round} {role}"))
    }

    fn filled(rounds: u32) -> Transcript {
        let mut t = Transcript::new(rounds);
        for r in 1..=rounds {
            t.push(turn(r, DebateRole::HighAdvocate)).unwrap();
            t.push(turn(r, DebateRole::LowAdvocate)).unwrap();
        }
        t
    }

    #[test]
    fn test_three_round_judge_view_order() {
        let mut t = filled(3);
        assert!(t.ready_for_judge());
        t.push(turn(3, DebateRole::Judge)).unwrap();
        assert_eq!(t.len(), 7);

        let slots: Vec<(u32, DebateRole)> = t.turns().iter().map(|x| (x.round_number, x.role)).collect();
        let mut sorted = slots.clone();
        sorted.sort();
        assert_eq!(slots, sorted);
        assert_eq!(slots[0], (1, DebateRole::HighAdvocate));
        assert_eq!(slots[1], (1, DebateRole::LowAdvocate));
        assert_eq!(slots[6], (3, DebateRole::Judge));
        assert_eq!(t.advocate_turns().len(), 6);
    }

    #[test]
    fn test_low_before_high_rejected() {
        let mut t = Transcript::new(2);
        let err = t.push(turn(1, DebateRole::LowAdvocate)).unwrap_err();
        assert_eq!(
            err,
            TranscriptError::OutOfOrder {
                expected_round: 1,
                expected_role: DebateRole::HighAdvocate,
                got_round: 1,
                got_role: DebateRole::LowAdvocate,
            }
        );
    }

    #[test]
    fn test_early_judge_rejected() {
        let mut t = Transcript::new(2);
        t.push(turn(1, DebateRole::HighAdvocate)).unwrap();
        t.push(turn(1, DebateRole::LowAdvocate)).unwrap();
        assert!(!t.ready_for_judge());
        assert!(t.push(turn(2, DebateRole::Judge)).is_err());
    }

    #[test]
    fn test_closed_after_judge() {
        let mut t = filled(1);
        t.push(turn(1, DebateRole::Judge)).unwrap();
        assert_eq!(t.expected_next(), None);
        assert_eq!(t.push(turn(2, DebateRole::HighAdvocate)), Err(TranscriptError::Closed));
    }

    #[test]
    fn test_opponent_latest() {
        let t = filled(2);
        let opp = t.opponent_latest(DebateRole::LowAdvocate).unwrap();
        assert_eq!(opp.role, DebateRole::HighAdvocate);
        assert_eq!(opp.round_number, 2);
        assert!(t.opponent_latest(DebateRole::Judge).is_none());
    }

    #[test]
    fn test_role_helpers() {
        assert_eq!(DebateRole::HighAdvocate.opponent(), Some(DebateRole::LowAdvocate));
        assert!(!DebateRole::Judge.is_advocate());
        assert_eq!(DebateRole::LowAdvocate.to_string(), "low_advocate");
        assert_eq!(DebateRole::Judge.title(), "Judge");
    }
}
