//! Chat-completion text backend for any OpenAI-compatible endpoint (Groq by default).

use crate::config::LlmConfig;
use crate::domain::ports::TextGenerationBackend;
use crate::domain::recommendation::{Narrative, Turn};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub struct GroqBackend {
    config: LlmConfig,
    client: reqwest::Client,
}

#[derive(Debug, Serialize, PartialEq)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// System prompt first, then one message per narrative turn.
///
/// Analyses are presented as user turns, commentary as the assistant's own.
fn chat_messages<'a>(system_prompt: &'a str, narrative: &'a Narrative) -> Vec<ChatMessage<'a>> {
    let mut messages = vec![ChatMessage {
        role: "system",
        content: system_prompt,
    }];
    messages.extend(narrative.turns().iter().map(|turn| ChatMessage {
        role: match turn {
            Turn::Request(_) | Turn::Analysis(_) => "user",
            Turn::Commentary(_) => "assistant",
        },
        content: turn.content(),
    }));
    messages
}

impl GroqBackend {
    pub fn new(config: LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PaymentError::InternalError(Box::new(e)))?;

        Ok(Self { config, client })
    }

    fn url(&self) -> String {
        format!("{}/chat/completions", self.config.api_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl TextGenerationBackend for GroqBackend {
    async fn generate(&self, system_prompt: &str, narrative: &Narrative) -> Result<String> {
        let request = ChatRequest {
            model: &self.config.model,
            temperature: self.config.temperature,
            messages: chat_messages(system_prompt, narrative),
        };

        let response = self
            .client
            .post(self.url())
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| PaymentError::TextGenerationError(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(PaymentError::TextGenerationError(format!(
                "backend returned {status}: {error_text}"
            )));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| PaymentError::TextGenerationError(format!("malformed response: {e}")))?;

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                PaymentError::TextGenerationError("response contained no message".to_string())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_messages_roles() {
        let mut narrative = Narrative::seeded("pay 100");
        narrative.push(Turn::Analysis("USDC is cheaper".to_string()));
        narrative.push(Turn::Commentary("agreed".to_string()));

        let messages = chat_messages("be brief", &narrative);
        let roles: Vec<_> = messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec!["system", "user", "user", "assistant"]);
        assert_eq!(messages[0].content, "be brief");
        assert_eq!(messages[3].content, "agreed");
    }
}
