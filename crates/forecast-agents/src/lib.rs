//! Superforecaster agents — model calls, news search, and the async debate
//! runner built on `forecast-coordination`.

pub mod benchmark;
pub mod config;
pub mod errors;
pub mod llm;
pub mod orchestrator;
pub mod run_log;
pub mod search;

pub use config::ForecastConfig;
pub use errors::{FailureKind, ForecastError};
pub use llm::{ChatMessage, LanguageModel, OpenRouterClient};
pub use orchestrator::{DebateOrchestrator, DebateRequest, RoundContext, RoundOutput};
pub use run_log::RunLog;
pub use search::{Article, NoSearch, Researcher, SearchTool, SearchWindow};
