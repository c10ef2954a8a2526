//! Benchmark Module
//!
//! Scores forecast runs against resolved questions.
//!
//! # Architecture
//!
//! ```text
//! questions.json → BenchmarkQuestion[]
//!                        ↓
//!              one debate per question (agents crate, worker pool)
//!                        ↓
//!              per-horizon HorizonScore (Brier, log score, accuracy)
//!                        ↓
//!                 BenchmarkSummary → markdown report
//! ```

pub mod metrics;
pub mod question;

pub use metrics::{
    brier_score, log_score, BenchmarkSummary, HorizonScore, PerformanceLevel, QuestionScore,
};
pub use question::{load_questions, parse_questions, BenchmarkQuestion, QuestionLoadError};
