//! Per-run agent log.
//!
//! Each orchestrator owns an injected [`RunLog`]. Entries are kept in memory
//! for the caller and mirrored to `tracing` as they are written.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunLogEntry {
    pub timestamp: DateTime<Utc>,
    pub elapsed_seconds: f64,
    pub agent: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// Cloneable handle; clones append to the same log.
#[derive(Debug, Clone)]
pub struct RunLog {
    label: Arc<str>,
    started: Instant,
    entries: Arc<Mutex<Vec<RunLogEntry>>>,
}

impl RunLog {
    /// New log labelled `{kind}_{YYYYmmdd_HHMMSS}`.
    pub fn new(kind: &str) -> Self {
        let label = format!("{kind}_{}", Utc::now().format("%Y%m%d_%H%M%S"));
        Self {
            label: label.into(),
            started: Instant::now(),
            entries: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn log(&self, agent: &str, message: impl Into<String>, details: Option<Value>) {
        let entry = RunLogEntry {
            timestamp: Utc::now(),
            elapsed_seconds: self.started.elapsed().as_secs_f64(),
            agent: agent.to_string(),
            message: message.into(),
            details,
        };
        tracing::info!(
            run = %self.label,
            agent = %entry.agent,
            elapsed_s = entry.elapsed_seconds,
            "{}",
            entry.message
        );
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(entry);
        }
    }

    pub fn entries(&self) -> Vec<RunLogEntry> {
        self.entries
            .lock()
            .map(|e| e.clone())
            .unwrap_or_default()
    }

    /// Entries written by one agent.
    pub fn entries_for(&self, agent: &str) -> Vec<RunLogEntry> {
        self.entries()
            .into_iter()
            .filter(|e| e.agent == agent)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_clones_share_entries() {
        let log = RunLog::new("forecast");
        assert!(log.label().starts_with("forecast_"));

        let handle = log.clone();
        handle.log("high_advocate", "opening argument", Some(json!({"p": 0.7})));
        log.log("judge", "ruling", None);

        let entries = log.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].agent, "high_advocate");
        assert!(entries[1].elapsed_seconds >= entries[0].elapsed_seconds);
        assert_eq!(log.entries_for("judge").len(), 1);
    }
}
