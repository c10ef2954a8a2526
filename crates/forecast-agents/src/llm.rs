//! Chat model boundary.
//!
//! [`LanguageModel`] is the only seam between the orchestrator and a remote
//! model. [`OpenRouterClient`] speaks the OpenAI-compatible
//! `chat/completions` protocol. Tests substitute scripted models.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use forecast_coordination::{DebateRole, DebateTurn};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ModelSettings;
use crate::errors::ForecastError;

/// One message in an OpenAI-style conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".into(),
            content: content.into(),
        }
    }

    /// Prior turns as seen by `speaker`: its own turns are `assistant`
    /// messages, everyone else's are attributed `user` messages.
    pub fn history_for(speaker: DebateRole, turns: &[DebateTurn]) -> Vec<Self> {
        turns
            .iter()
            .map(|turn| {
                if turn.role == speaker {
                    Self::assistant(turn.raw_response_text.clone())
                } else {
                    Self::user(format!(
                        "[{}, round {}]\n{}",
                        turn.role.title(),
                        turn.round_number,
                        turn.raw_response_text
                    ))
                }
            })
            .collect()
    }
}

/// A chat model that turns (system prompt, user prompt, prior transcript)
/// into one completion.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Model identifier recorded in result metadata.
    fn model_name(&self) -> &str;

    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        transcript: &[ChatMessage],
    ) -> Result<String, ForecastError>;
}

/// OpenRouter `chat/completions` client. No retries: a failed call fails
/// the turn.
pub struct OpenRouterClient {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    timeout_secs: u64,
}

impl OpenRouterClient {
    pub fn new(settings: &ModelSettings) -> Result<Self, ForecastError> {
        let api_key = settings
            .api_key
            .clone()
            .ok_or_else(|| ForecastError::Configuration("OPENROUTER_API_KEY is not set".into()))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| ForecastError::Configuration(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key,
            endpoint: format!(
                "{}/chat/completions",
                settings.base_url.trim_end_matches('/')
            ),
            model: settings.model.clone(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            timeout_secs: settings.timeout_secs,
        })
    }

    fn request_body(&self, system_prompt: &str, user_prompt: &str, transcript: &[ChatMessage]) -> serde_json::Value {
        let mut messages = Vec::with_capacity(transcript.len() + 2);
        messages.push(ChatMessage::system(system_prompt));
        messages.extend_from_slice(transcript);
        messages.push(ChatMessage::user(user_prompt));
        serde_json::json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        })
    }
}

/// First choice content of a chat completion, if non-empty.
pub fn completion_text(body: &serde_json::Value) -> Option<&str> {
    body["choices"][0]["message"]["content"]
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

#[async_trait]
impl LanguageModel for OpenRouterClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        transcript: &[ChatMessage],
    ) -> Result<String, ForecastError> {
        let start = Instant::now();
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(system_prompt, user_prompt, transcript))
            .send()
            .await
            .map_err(|e| ForecastError::from_transport(e, self.timeout_secs))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let body = response.text().await.unwrap_or_default();
            return Err(ForecastError::RateLimit(format!("{}: {}", self.model, body)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ForecastError::InvocationFailure(format!(
                "OpenRouter API error ({status}): {body}"
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ForecastError::InvocationFailure(format!("unreadable completion: {e}")))?;
        let text = completion_text(&body).ok_or_else(|| {
            ForecastError::InvocationFailure(format!("{} returned an empty completion", self.model))
        })?;

        debug!(
            model = %self.model,
            elapsed_ms = start.elapsed().as_millis() as u64,
            chars = text.len(),
            "completion received"
        );
        Ok(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn settings() -> ModelSettings {
        ModelSettings {
            api_key: Some("sk-test".into()),
            base_url: "https://openrouter.ai/api/v1/".into(),
            ..ModelSettings::default()
        }
    }

    #[test]
    fn test_requires_api_key() {
        let err = OpenRouterClient::new(&ModelSettings::default())
            .err()
            .expect("missing key must fail");
        assert!(matches!(err, ForecastError::Configuration(_)));
    }

    #[test]
    fn test_request_body_shape() {
        let client = OpenRouterClient::new(&settings()).unwrap();
        assert_eq!(client.endpoint, "https://openrouter.ai/api/v1/chat/completions");
        let body = client.request_body(
            "be calibrated",
            "forecast this",
            &[ChatMessage::assistant("earlier")],
        );
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[1]["content"], "earlier");
        assert_eq!(messages[2]["role"], "user");
        assert_eq!(body["model"], crate::config::DEFAULT_MODEL);
    }

    #[test]
    fn test_completion_text() {
        let ok = json!({"choices": [{"message": {"content": "  {\"probability\": 0.4} "}}]});
        assert_eq!(completion_text(&ok), Some("{\"probability\": 0.4}"));
        assert_eq!(completion_text(&json!({"choices": []})), None);
        assert_eq!(
            completion_text(&json!({"choices": [{"message": {"content": "   "}}]})),
            None
        );
    }

    #[test]
    fn test_history_attribution() {
        let turns = vec![
            DebateTurn::new(1, DebateRole::HighAdvocate, "p", "high says yes"),
            DebateTurn::new(1, DebateRole::LowAdvocate, "p", "low says no"),
        ];
        let history = ChatMessage::history_for(DebateRole::LowAdvocate, &turns);
        assert_eq!(history[0].role, "user");
        assert!(history[0].content.starts_with("[High Advocate, round 1]"));
        assert_eq!(history[1], ChatMessage::assistant("low says no"));
    }
}
