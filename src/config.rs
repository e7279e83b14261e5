//! Configuration management for emobot-rs.
//!
//! Loads config from YAML files in standard locations. Secrets can also be
//! supplied through the environment variables the bot has always recognized
//! (TG_BOT_TOKEN, OPENAI_KEY, TTS_VOICE, TTS_API_KEY); the environment wins
//! over the file.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub token: String,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "gpt-3.5-turbo".into(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    pub api_key: String,
    pub voice: String,
    pub model_id: String,
    pub stability: f32,
    pub similarity_boost: f32,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            voice: "Deadly Himalayan Wolf".into(),
            model_id: "eleven_monolingual_v1".into(),
            stability: 0.5,
            similarity_boost: 0.75,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    pub daily_limit: u32,
    pub db_path: String,
    /// Charge a quota unit on a tone selection even when no text is
    /// pending. Matches the historical behavior; set to false to only
    /// charge once a pending text exists.
    pub charge_without_text: bool,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            daily_limit: 3,
            db_path: "emobot.db".into(),
            charge_without_text: true,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub telegram: TelegramConfig,
    pub openai: OpenAiConfig,
    pub voice: VoiceConfig,
    pub quota: QuotaConfig,
}

impl Config {
    /// Load configuration from YAML file, then apply environment overrides.
    ///
    /// Searches standard locations if no path is provided:
    /// 1. ./emobot.yaml
    /// 2. ~/.config/emobot/config.yaml
    /// 3. /etc/emobot/config.yaml
    pub fn load(path: Option<&Path>) -> Self {
        let resolved = path.map(PathBuf::from).or_else(|| {
            let candidates = [
                std::env::current_dir().ok().map(|d| d.join("emobot.yaml")),
                dirs::home_dir().map(|h| h.join(".config/emobot/config.yaml")),
                Some(PathBuf::from("/etc/emobot/config.yaml")),
            ];
            candidates.into_iter().flatten().find(|p| p.exists())
        });

        let config = match resolved {
            Some(config_path) => match std::fs::read_to_string(&config_path) {
                Ok(contents) => match serde_yml::from_str(&contents) {
                    Ok(config) => {
                        info!("Loaded config from {}", config_path.display());
                        config
                    }
                    Err(e) => {
                        tracing::warn!(
                            "Failed to parse {}: {e}, using defaults",
                            config_path.display()
                        );
                        Self::default()
                    }
                },
                Err(e) => {
                    tracing::warn!(
                        "Failed to read {}: {e}, using defaults",
                        config_path.display()
                    );
                    Self::default()
                }
            },
            None => {
                info!("No config file found, using defaults");
                Self::default()
            }
        };

        config.apply_env()
    }

    fn apply_env(mut self) -> Self {
        if let Ok(token) = std::env::var("TG_BOT_TOKEN") {
            self.telegram.token = token;
        }
        if let Ok(key) = std::env::var("OPENAI_KEY") {
            self.openai.api_key = key;
        }
        if let Ok(voice) = std::env::var("TTS_VOICE") {
            self.voice.voice = voice;
        }
        if let Ok(key) = std::env::var("TTS_API_KEY") {
            self.voice.api_key = key;
        }
        self
    }
}
