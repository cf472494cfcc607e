//! Error taxonomy for the provider layer.
//!
//! No vendor-specific error type crosses a provider boundary: transport,
//! HTTP and decoding failures are all folded into [`ProviderError::Request`].

use thiserror::Error;

/// Errors surfaced by providers, the factory and the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// A required credential or setting is missing. Detected before any I/O.
    #[error("AI provider \"{provider}\" configuration error: {message}")]
    Configuration { provider: String, message: String },

    /// The requested provider identifier is not one of the known ones.
    #[error("Unknown AI provider: {requested}. Supported providers: {}", .supported.join(", "))]
    UnsupportedProvider {
        requested: String,
        supported: Vec<String>,
    },

    /// The backend call failed: network, authentication, quota or a
    /// malformed payload.
    #[error("{provider} request failed: {message}")]
    Request { provider: String, message: String },

    /// A tool result does not line up with the tool invocations it answers.
    #[error("tool result '{tool_use_id}' does not match a pending tool use: {reason}")]
    Correlation { tool_use_id: String, reason: String },

    /// The caller supplied an empty user message.
    #[error("message is required and must be a non-empty string")]
    EmptyMessage,
}

impl ProviderError {
    pub(crate) fn request(provider: &str, message: impl Into<String>) -> Self {
        Self::Request {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub(crate) fn configuration(provider: &str, message: impl Into<String>) -> Self {
        Self::Configuration {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Name of the provider the error is attributed to, if any.
    pub fn provider(&self) -> Option<&str> {
        match self {
            Self::Configuration { provider, .. } | Self::Request { provider, .. } => {
                Some(provider)
            }
            _ => None,
        }
    }
}
