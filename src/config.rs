//! Configuration types for the assistant engine.

use crate::error::{AssistantError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level configuration for the chat panel engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    /// Remote inference settings.
    pub inference: InferenceConfig,
    /// Spoken narration settings.
    pub narration: NarrationConfig,
    /// Typed reveal animation settings.
    pub reveal: RevealConfig,
    /// Conversation settings.
    pub chat: ChatConfig,
}

impl AssistantConfig {
    /// Parse a configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| AssistantError::Config(format!("invalid config: {e}")))
    }

    /// Load a configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AssistantError::Config(format!("failed to read config ({}): {e}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }
}

/// Remote inference endpoint configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Full URL of the inference endpoint. `None` disables remote inference
    /// entirely; every turn then resolves through the local generator.
    pub endpoint: Option<String>,
}

/// Spoken narration configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NarrationConfig {
    /// Full URL of the speech-synthesis endpoint. `None` disables narration;
    /// toggling it then reports a warning instead of starting a session.
    pub endpoint: Option<String>,
    /// Output device name (None = system default).
    pub output_device: Option<String>,
}

/// Typed reveal animation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RevealConfig {
    /// Whether answers animate in at all. When false, answers are written
    /// to the output surface in one step.
    pub enabled: bool,
    /// Interval between reveal ticks in milliseconds.
    ///
    /// Chunk sizes scale with answer length, so this mostly controls how
    /// "mechanical" the typing feels rather than total reveal time.
    pub tick_ms: u64,
}

impl Default for RevealConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tick_ms: 30,
        }
    }
}

/// Conversation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Language answers should be produced in (BCP 47 tag, e.g. "en").
    /// Also the narration voice selector and text-direction hint.
    pub response_language: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            response_language: "en".to_owned(),
        }
    }
}
