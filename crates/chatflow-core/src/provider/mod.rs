//! LLM provider trait and vendor adapters.
//!
//! Defines the `AiProvider` trait that all backends implement. Each vendor
//! module maps the neutral message model in [`types`] onto its own wire
//! schema and back:
//!
//! - [`anthropic`] — Anthropic Messages API
//! - [`openai`] — OpenAI Chat Completions API
//! - [`gemini`] — Google Gemini `generateContent` API
//!
//! Providers are constructed through [`factory::ProviderFactory`], which
//! guarantees credentials are validated before a provider is handed out.

pub mod anthropic;
pub mod factory;
pub mod gemini;
pub mod ids;
pub mod openai;
pub mod transport;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;
use std::fmt;

use crate::error::ProviderError;
use types::{AiResponse, ChatMessage, Tool, ToolResult};

/// Default response token budget for every vendor.
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Trait for chat backends.
///
/// Implementations hold no per-conversation state: everything a call needs
/// arrives through its arguments, so one instance can serve many concurrent
/// conversations.
#[async_trait]
pub trait AiProvider: Send + Sync {
    /// Provider identifier (e.g. "anthropic").
    fn name(&self) -> &'static str;

    /// Check that the backend credential is present. Performs no I/O.
    fn validate_config(&self) -> Result<(), ProviderError>;

    /// Send a new user message on top of `history`.
    ///
    /// # Arguments
    /// * `message` - The new user turn, appended after `history`
    /// * `history` - Prior turns, in order
    /// * `tools` - Tools the model may call (empty = no tool calling)
    async fn send_message(
        &self,
        message: &str,
        history: &[ChatMessage],
        tools: &[Tool],
    ) -> Result<AiResponse, ProviderError>;

    /// Feed tool results back and get the follow-up response.
    ///
    /// `history` must already end with the assistant turn whose tool uses
    /// `tool_results` answer.
    async fn continue_with_tool_result(
        &self,
        history: &[ChatMessage],
        tool_results: &[ToolResult],
        tools: &[Tool],
    ) -> Result<AiResponse, ProviderError>;
}

/// The closed set of supported backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Anthropic,
    OpenAi,
    Gemini,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 3] = [Self::Anthropic, Self::OpenAi, Self::Gemini];

    /// Used when neither the caller nor the configuration picks one.
    pub const DEFAULT: ProviderKind = Self::Anthropic;

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
            Self::Gemini => "gemini",
        }
    }

    /// Case-insensitive lookup by identifier.
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|k| k.as_str() == name)
    }

    /// Environment variable holding this backend's credential.
    pub fn credential_var(&self) -> &'static str {
        match self {
            Self::Anthropic => "ANTHROPIC_API_KEY",
            Self::OpenAi => "OPENAI_API_KEY",
            Self::Gemini => "GEMINI_API_KEY",
        }
    }

    /// Where to obtain a credential.
    pub fn key_url(&self) -> &'static str {
        match self {
            Self::Anthropic => "https://console.anthropic.com/",
            Self::OpenAi => "https://platform.openai.com/",
            Self::Gemini => "https://makersuite.google.com/app/apikey",
        }
    }

    /// Configuration error raised when the credential is missing.
    pub(crate) fn missing_key_error(&self) -> ProviderError {
        ProviderError::configuration(
            self.as_str(),
            format!(
                "{} is required. Get your key at {}",
                self.credential_var(),
                self.key_url()
            ),
        )
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifiers of every supported provider.
pub fn supported_providers() -> Vec<&'static str> {
    ProviderKind::ALL.iter().map(ProviderKind::as_str).collect()
}

/// Join the text segments of one response in emission order.
pub(crate) fn join_text<'a>(segments: impl IntoIterator<Item = &'a str>) -> String {
    segments.into_iter().collect::<Vec<_>>().join("\n")
}
