//! Debate state machine — phases, transitions, and session tracking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Phase of a forecast debate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DebatePhase {
    /// Session created, no prompts dispatched.
    Init,
    /// Round 1: both advocates argue independently.
    OpeningRound,
    /// Rounds 2..R: high then low rebut the opposing side.
    Rebuttal,
    /// Judge synthesises the full transcript.
    Judging,
    /// Result emitted (possibly after a failure short-circuit).
    Done,
}

impl DebatePhase {
    /// Whether this is a terminal phase.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done)
    }

    /// Valid transitions from this phase, ignoring round bookkeeping.
    pub fn valid_transitions(self) -> &'static [DebatePhase] {
        match self {
            Self::Init => &[Self::OpeningRound, Self::Done],
            Self::OpeningRound => &[Self::Rebuttal, Self::Judging, Self::Done],
            Self::Rebuttal => &[Self::Rebuttal, Self::Judging, Self::Done],
            Self::Judging => &[Self::Done],
            Self::Done => &[],
        }
    }
}

impl std::fmt::Display for DebatePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Init => write!(f, "init"),
            Self::OpeningRound => write!(f, "opening_round"),
            Self::Rebuttal => write!(f, "rebuttal"),
            Self::Judging => write!(f, "judging"),
            Self::Done => write!(f, "done"),
        }
    }
}

/// A phase transition record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebateTransition {
    pub from: DebatePhase,
    pub to: DebatePhase,
    /// Round number after the transition.
    pub round: u32,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
}

/// Error for invalid state transitions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid transition {from} → {to}: {reason}")]
pub struct TransitionError {
    pub from: DebatePhase,
    pub to: DebatePhase,
    pub reason: String,
}

/// Tracks the phase, round counter and transition history of one debate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebateSession {
    pub id: String,
    pub phase: DebatePhase,
    /// Current round (0 before the opening round).
    pub current_round: u32,
    pub total_rounds: u32,
    pub transitions: Vec<DebateTransition>,
    /// Set when the debate short-circuited to `Done` because a turn failed.
    pub failure: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl DebateSession {
    /// Create a session for `total_rounds` advocate rounds (minimum 1).
    pub fn new(id: &str, total_rounds: u32) -> Self {
        Self {
            id: id.to_string(),
            phase: DebatePhase::Init,
            current_round: 0,
            total_rounds: total_rounds.max(1),
            transitions: Vec::new(),
            failure: None,
            created_at: Utc::now(),
        }
    }

    /// Transition to a new phase with a reason.
    ///
    /// Besides the static phase table, entering `Rebuttal` requires rounds
    /// left and entering `Judging` requires the last round to be complete.
    pub fn transition(&mut self, to: DebatePhase, reason: &str) -> Result<(), TransitionError> {
        let reject = |why: String| TransitionError {
            from: self.phase,
            to,
            reason: why,
        };

        if !self.phase.valid_transitions().contains(&to) {
            return Err(reject(format!(
                "not a valid transition (allowed: {:?})",
                self.phase.valid_transitions()
            )));
        }
        match to {
            DebatePhase::Rebuttal if !self.has_rounds_remaining() => {
                return Err(reject(format!(
                    "all {} rounds already run",
                    self.total_rounds
                )));
            }
            DebatePhase::Judging if self.current_round < self.total_rounds => {
                return Err(reject(format!(
                    "round {}/{} still pending",
                    self.current_round, self.total_rounds
                )));
            }
            _ => {}
        }

        if matches!(to, DebatePhase::OpeningRound | DebatePhase::Rebuttal) {
            self.current_round += 1;
        }
        self.transitions.push(DebateTransition {
            from: self.phase,
            to,
            round: self.current_round,
            timestamp: Utc::now(),
            reason: reason.to_string(),
        });
        self.phase = to;

        Ok(())
    }

    /// Start the debate (Init → OpeningRound).
    pub fn start(&mut self) -> Result<(), TransitionError> {
        self.transition(DebatePhase::OpeningRound, "debate started")
    }

    /// Advance to whatever the protocol prescribes next.
    pub fn advance(&mut self, reason: &str) -> Result<DebatePhase, TransitionError> {
        let next = self.scheduled_next();
        self.transition(next, reason)?;
        Ok(next)
    }

    /// Phase the protocol prescribes after the current one completes.
    pub fn scheduled_next(&self) -> DebatePhase {
        match self.phase {
            DebatePhase::Init => DebatePhase::OpeningRound,
            DebatePhase::OpeningRound | DebatePhase::Rebuttal if self.has_rounds_remaining() => {
                DebatePhase::Rebuttal
            }
            DebatePhase::OpeningRound | DebatePhase::Rebuttal => DebatePhase::Judging,
            DebatePhase::Judging | DebatePhase::Done => DebatePhase::Done,
        }
    }

    /// Short-circuit to `Done` after a failed turn. No-op when already done.
    pub fn fail(&mut self, message: &str) {
        if self.phase.is_terminal() {
            return;
        }
        self.failure = Some(message.to_string());
        self.transitions.push(DebateTransition {
            from: self.phase,
            to: DebatePhase::Done,
            round: self.current_round,
            timestamp: Utc::now(),
            reason: format!("failed: {message}"),
        });
        self.phase = DebatePhase::Done;
    }

    pub fn is_complete(&self) -> bool {
        self.phase.is_terminal()
    }

    pub fn has_rounds_remaining(&self) -> bool {
        self.current_round < self.total_rounds
    }

    /// Rounds whose advocate turns both completed.
    pub fn rounds_completed(&self) -> u32 {
        let reached_judge = match self.phase {
            DebatePhase::Judging => true,
            DebatePhase::Done => self
                .transitions
                .last()
                .is_some_and(|t| t.from == DebatePhase::Judging),
            _ => false,
        };
        if reached_judge {
            self.current_round
        } else {
            self.current_round.saturating_sub(1)
        }
    }

    /// Compact status line.
    pub fn status_line(&self) -> String {
        let status = match &self.failure {
            Some(msg) => format!(" | failed: {msg}"),
            None => String::new(),
        };
        format!(
            "[{}] round {}/{} | {} transitions{}",
            self.phase,
            self.current_round,
            self.total_rounds,
            self.transitions.len(),
            status
        )
    }
}
