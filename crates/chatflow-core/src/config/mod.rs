//! Configuration module for chatflow.
//!
//! Loads typed configuration from `~/.chatflow/config.json`, then lets the
//! outer application overlay process environment values exactly once via
//! [`Config::apply_env`]. The resulting struct is passed explicitly into the
//! provider factory; nothing in the core reads the environment itself.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::provider::ProviderKind;

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default provider identifier (`anthropic`, `openai` or `gemini`).
    pub provider: Option<String>,
    pub providers: ProvidersConfig,
}

impl Config {
    /// Load configuration from the default path (`~/.chatflow/config.json`).
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Config::default())
        }
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Get the default config file path.
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.json")
    }

    /// Get the default config directory path.
    pub fn config_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".chatflow")
    }

    /// Overlay environment values on top of the file configuration.
    ///
    /// `lookup` is normally `|k| std::env::var(k).ok()`. Empty values are
    /// treated as unset.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(provider) = get("AI_PROVIDER") {
            self.provider = Some(provider);
        }
        if let Some(key) = get("ANTHROPIC_API_KEY") {
            self.providers.anthropic.api_key = key;
        }
        if let Some(key) = get("OPENAI_API_KEY") {
            self.providers.openai.api_key = key;
        }
        if let Some(model) = get("OPENAI_MODEL") {
            self.providers.openai.model = Some(model);
        }
        if let Some(key) = get("GEMINI_API_KEY") {
            self.providers.gemini.api_key = key;
        }
        if let Some(model) = get("GEMINI_MODEL") {
            self.providers.gemini.model = Some(model);
        }
    }

    /// Write the default config template to disk.
    pub fn write_default_template() -> anyhow::Result<PathBuf> {
        let path = Self::default_path();
        Self::write_template_to(&path)?;
        Ok(path)
    }

    pub fn write_template_to(path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let template = serde_json::json!({
            "provider": "anthropic",
            "providers": {
                "anthropic": { "apiKey": "sk-ant-YOUR_KEY_HERE" },
                "openai": { "apiKey": "", "model": "gpt-4-turbo-preview" },
                "gemini": { "apiKey": "", "model": "gemini-1.5-pro" }
            }
        });

        std::fs::write(path, serde_json::to_string_pretty(&template)?)?;
        Ok(())
    }
}

// ── Provider Configuration ──────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProviderEntry {
    pub api_key: String,
    pub api_base: Option<String>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
}

impl ProviderEntry {
    pub fn has_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub anthropic: ProviderEntry,
    pub openai: ProviderEntry,
    pub gemini: ProviderEntry,
}

impl ProvidersConfig {
    pub fn entry(&self, kind: ProviderKind) -> &ProviderEntry {
        match kind {
            ProviderKind::Anthropic => &self.anthropic,
            ProviderKind::OpenAi => &self.openai,
            ProviderKind::Gemini => &self.gemini,
        }
    }
}
