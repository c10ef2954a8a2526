//! Debate Orchestration — High/Low advocate rounds and judge synthesis
//!
//! Deterministic half of the debate: the phase machine, the ordered
//! transcript, and calibration of the judge's output. Model calls live in
//! the agents crate.
//!
//! # Debate Flow
//!
//! ```text
//! Init → OpeningRound ──► Rebuttal (k = 2..R) ──► Judging → Done
//!          │  high ∥ low      │  high → low          │
//!          │                  │                      └─ synthesize + calibrate
//!          └──────────────────┴─ any failed turn ───► Done (fallback result)
//! ```

pub mod state;
pub mod synthesis;
pub mod transcript;

pub use state::{DebatePhase, DebateSession, DebateTransition, TransitionError};
pub use synthesis::{resolve_base_rate, synthesize, Synthesis};
pub use transcript::{DebateRole, DebateTurn, Transcript, TranscriptError};
