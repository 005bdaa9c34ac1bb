// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 SnowDev

//! Application settings
//!
//! Settings are loaded from a TOML file under the snowbrain home directory,
//! with the API credential supplied through an environment variable.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Default completion endpoint (OpenRouter, OpenAI-compatible)
pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Default model served through OpenRouter
pub const DEFAULT_MODEL: &str = "deepseek/deepseek-chat-v3.1:free";

/// System directive injected once at session creation, always first in history
pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are Snow Brain AI, an intelligent and helpful assistant created by SnowDev.

Key instructions:
- Always respond in English, regardless of the user's language
- Be friendly, professional, and knowledgeable
- Provide clear, concise, and helpful answers
- If asked about your identity, you are Snow Brain AI by SnowDev
- Use proper grammar and maintain a conversational tone
- Focus on being helpful and informative

Important: NEVER respond in Chinese, Japanese, Korean, or any non-English \
language. Always use English.";

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Model identifier sent with every request
    pub model: String,

    /// Completion endpoint URL
    pub base_url: String,

    /// System directive for new sessions
    pub system_prompt: String,

    /// Name of the environment variable holding the API key
    pub api_key_env: String,

    /// API key stored in the settings file (env var takes priority)
    pub api_key: Option<String>,

    /// Maximum non-system messages retained in history
    pub max_messages: usize,

    /// Sampling temperature
    pub temperature: f32,

    /// Maximum output tokens per completion
    pub max_tokens: u32,

    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,

    /// Referer header for OpenRouter rankings
    pub site_url: String,

    /// Title header for OpenRouter rankings
    pub site_name: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            api_key_env: "OPENROUTER_API_KEY".to_string(),
            api_key: None,
            max_messages: 20,
            temperature: 0.7,
            max_tokens: 1024,
            request_timeout_secs: 120,
            site_url: "https://snow-brain-ai.netlify.app".to_string(),
            site_name: "Snow Brain AI".to_string(),
        }
    }
}

impl Settings {
    /// Get the snowbrain home directory (~/.snowbrain or $SNOWBRAIN_HOME).
    pub fn snowbrain_home() -> PathBuf {
        if let Ok(home) = std::env::var("SNOWBRAIN_HOME") {
            return PathBuf::from(home);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".snowbrain")
    }

    /// Get the default settings file path.
    pub fn default_path() -> PathBuf {
        Self::snowbrain_home().join("settings.toml")
    }

    /// Load settings from the default path.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path())
    }

    /// Load settings from a specific path. Missing file yields defaults.
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        Ok(settings)
    }

    /// Save settings to a specific path.
    pub fn save_to(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the API key, checking the env var first.
    pub fn get_api_key(&self) -> Option<String> {
        // Priority: env var > config file.
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.is_empty())
            .or_else(|| self.api_key.clone())
    }
}
