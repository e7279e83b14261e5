//! OpenAI tone rewriting.
//!
//! Sends the pending text to the chat-completions API with an instruction
//! to rewrite it in the selected tone. Every failure path collapses into a
//! `RewriteOutcome` variant; the user-facing wording for those variants
//! lives in the conversation flow, not here.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, warn};

use crate::config::OpenAiConfig;
use crate::flow::Tone;

const API_URL: &str = "https://api.openai.com/v1/chat/completions";

const PROMPT_TEMPLATE: &str = "Перепиши следующее сообщение в стиле '{tone}', \
даже если оно звучит грубо или негативно, сделай его максимально дружелюбным:\n\n{text}";

/// What came back from a rewrite call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewriteOutcome {
    /// First completion's text content, unmodified.
    Rewritten(String),
    /// The provider did not answer within the deadline.
    TimedOut,
    /// Any other failure: transport, provider error, malformed response.
    Failed(String),
}

#[async_trait]
pub trait Rewrite: Send + Sync {
    async fn rewrite(&self, text: &str, tone: Tone) -> RewriteOutcome;
}

pub struct ToneRewriter {
    config: OpenAiConfig,
    client: Client,
}

impl ToneRewriter {
    pub fn new(config: OpenAiConfig) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self { config, client }
    }

    fn build_prompt(text: &str, tone: Tone) -> String {
        PROMPT_TEMPLATE
            .replace("{tone}", &tone.label().to_lowercase())
            .replace("{text}", text)
    }
}

#[async_trait]
impl Rewrite for ToneRewriter {
    async fn rewrite(&self, text: &str, tone: Tone) -> RewriteOutcome {
        let prompt = Self::build_prompt(text, tone);
        debug!("Requesting rewrite from '{}' in tone {tone:?}", self.config.model);

        let body = json!({
            "model": self.config.model,
            "messages": [{"role": "user", "content": prompt}]
        });

        let resp = match self
            .client
            .post(API_URL)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) if e.is_timeout() => {
                warn!("OpenAI request timed out after {}s", self.config.timeout_secs);
                return RewriteOutcome::TimedOut;
            }
            Err(e) => {
                warn!("OpenAI request failed: {e}");
                return RewriteOutcome::Failed(e.to_string());
            }
        };

        if !resp.status().is_success() {
            warn!("OpenAI returned status {}", resp.status());
            return RewriteOutcome::Failed(format!("status {}", resp.status()));
        }

        let data: serde_json::Value = match resp.json().await {
            Ok(data) => data,
            Err(e) if e.is_timeout() => {
                // the client deadline also covers reading the body
                warn!("OpenAI response body timed out");
                return RewriteOutcome::TimedOut;
            }
            Err(e) => {
                warn!("Failed to parse OpenAI response: {e}");
                return RewriteOutcome::Failed(e.to_string());
            }
        };

        match data["choices"][0]["message"]["content"].as_str() {
            Some(content) => RewriteOutcome::Rewritten(content.to_string()),
            None => {
                warn!("OpenAI response had no completion text");
                RewriteOutcome::Failed("empty completion".into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_lowercases_tone_label() {
        let prompt = ToneRewriter::build_prompt("Ты бесполезен", Tone::Empathetic);
        assert!(prompt.contains("в стиле 'эмпатично'"));
        assert!(prompt.ends_with("Ты бесполезен"));
    }

    #[test]
    fn prompt_keeps_text_verbatim() {
        let text = "Много строк\nи 'кавычки'";
        let prompt = ToneRewriter::build_prompt(text, Tone::Humorous);
        assert!(prompt.contains(text));
        assert!(prompt.contains("с юмором"));
    }
}
