use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{IsetError, Result};
use crate::types::Suggestion;

/// Top-level configuration for the assistant client.
///
/// Loaded from `~/.iset/config.toml` by default. Every section falls back to
/// its defaults when absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssistantConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub voice: VoiceConfig,
    #[serde(default)]
    pub review: ReviewConfig,
}

impl AssistantConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: AssistantConfig = toml::from_str(&content)?;
        config.validate()?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Reject values the engine cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.backend.base_url.trim().is_empty() {
            return Err(IsetError::Config("backend.base_url must not be empty".into()));
        }
        if self.chat.max_message_chars == 0 {
            return Err(IsetError::Config(
                "chat.max_message_chars must be greater than zero".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.review.medium_confidence)
            || !(0.0..=1.0).contains(&self.review.high_confidence)
            || self.review.medium_confidence > self.review.high_confidence
        {
            return Err(IsetError::Config(
                "review confidence thresholds must satisfy 0 <= medium <= high <= 1".into(),
            ));
        }
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Remote backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the assistant API, without a trailing slash.
    pub base_url: String,
    /// Per-request timeout. A timed-out request fails like any other.
    pub request_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Conversation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Longest message accepted for submission, in characters.
    pub max_message_chars: usize,
    /// Characters of the first user message shown as a session preview.
    pub preview_chars: usize,
    /// Origin used when building shareable session links.
    pub share_origin: String,
    /// Quick-action chips. Submitted exactly like typed text.
    pub shortcuts: Vec<Suggestion>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        let shortcut = |label: &str, text: &str| Suggestion {
            label: label.to_string(),
            text: text.to_string(),
        };
        Self {
            max_message_chars: 2000,
            preview_chars: 30,
            share_origin: "http://localhost:3000".to_string(),
            shortcuts: vec![
                shortcut("Horaires", "/horaires"),
                shortcut("Contact", "/contact"),
                shortcut("Inscription", "/inscription"),
                shortcut("Bibliothèque", "/bibliotheque"),
                shortcut("Examens", "/examens"),
            ],
        }
    }
}

/// Speech capture settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// Recognition language tag.
    pub language: String,
    /// Listening stops on its own after this many seconds without a stop.
    pub max_listen_secs: u64,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            language: "fr-FR".to_string(),
            max_listen_secs: 60,
        }
    }
}

/// Candidate review settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewConfig {
    /// Confidence strictly above this is shown as high.
    pub high_confidence: f64,
    /// Confidence strictly above this (and not high) is shown as medium.
    pub medium_confidence: f64,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            high_confidence: 0.8,
            medium_confidence: 0.6,
        }
    }
}
