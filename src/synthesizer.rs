//! ElevenLabs speech synthesis.
//!
//! Converts the rewritten text into a voice clip. Any failure means no
//! audio; the user never sees a synthesis error.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, warn};

use crate::config::VoiceConfig;

#[async_trait]
pub trait Synthesize: Send + Sync {
    async fn synthesize(&self, text: &str) -> Option<Vec<u8>>;
}

pub struct VoiceSynthesizer {
    config: VoiceConfig,
    client: Client,
}

impl VoiceSynthesizer {
    pub fn new(config: VoiceConfig) -> Self {
        // no explicit timeout: synthesis rides on the provider's own limits
        Self {
            config,
            client: Client::new(),
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "https://api.elevenlabs.io/v1/text-to-speech/{}",
            self.config.voice
        )
    }
}

#[async_trait]
impl Synthesize for VoiceSynthesizer {
    async fn synthesize(&self, text: &str) -> Option<Vec<u8>> {
        let body = json!({
            "text": text,
            "model_id": self.config.model_id,
            "voice_settings": {
                "stability": self.config.stability,
                "similarity_boost": self.config.similarity_boost
            }
        });

        let resp = match self
            .client
            .post(self.endpoint())
            .header("xi-api-key", &self.config.api_key)
            .json(&body)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                warn!("Speech synthesis request failed: {e}");
                return None;
            }
        };

        if resp.status() != reqwest::StatusCode::OK {
            warn!("Speech synthesis returned status {}", resp.status());
            return None;
        }

        match resp.bytes().await {
            Ok(audio) => {
                debug!("Synthesized {} bytes of audio", audio.len());
                Some(audio.to_vec())
            }
            Err(e) => {
                warn!("Failed to read synthesized audio: {e}");
                None
            }
        }
    }
}
