//! Provider selection and construction.
//!
//! [`ProviderFactory::create`] is the only way the rest of the crate obtains
//! a provider, and it never hands one out before `validate_config` passes.

use std::sync::Arc;
use tracing::{info, warn};

use super::anthropic::AnthropicProvider;
use super::gemini::GeminiProvider;
use super::ids::{TimestampIdGenerator, ToolCallIdGenerator};
use super::openai::OpenAiProvider;
use super::transport::{ReqwestTransport, Transport};
use super::{supported_providers, AiProvider, ProviderKind};
use crate::config::Config;
use crate::error::ProviderError;

pub struct ProviderFactory {
    config: Config,
    transport: Arc<dyn Transport>,
    ids: Arc<dyn ToolCallIdGenerator>,
}

impl ProviderFactory {
    pub fn new(
        config: Config,
        transport: Arc<dyn Transport>,
        ids: Arc<dyn ToolCallIdGenerator>,
    ) -> Self {
        Self {
            config,
            transport,
            ids,
        }
    }

    /// Factory backed by a fresh `reqwest` client and timestamp ids.
    pub fn with_defaults(config: Config) -> Self {
        Self::with_client(config, reqwest::Client::new())
    }

    /// Factory whose providers all share `client`, with timestamp ids.
    pub fn with_client(config: Config, client: reqwest::Client) -> Self {
        Self::new(
            config,
            Arc::new(ReqwestTransport::new(client)),
            Arc::new(TimestampIdGenerator::new()),
        )
    }

    /// Resolve the provider identifier without constructing anything.
    ///
    /// Order: explicit `name`, then the configured default, then
    /// [`ProviderKind::DEFAULT`].
    pub fn resolve(&self, name: Option<&str>) -> Result<ProviderKind, ProviderError> {
        let requested = name
            .filter(|n| !n.trim().is_empty())
            .or_else(|| self.config.provider.as_deref().filter(|n| !n.trim().is_empty()))
            .unwrap_or(ProviderKind::DEFAULT.as_str());

        ProviderKind::parse(requested).ok_or_else(|| ProviderError::UnsupportedProvider {
            requested: requested.trim().to_ascii_lowercase(),
            supported: supported_providers().into_iter().map(String::from).collect(),
        })
    }

    /// Build and validate the selected provider.
    pub fn create(&self, name: Option<&str>) -> Result<Arc<dyn AiProvider>, ProviderError> {
        let kind = self.resolve(name)?;
        let entries = &self.config.providers;

        let provider: Arc<dyn AiProvider> = match kind {
            ProviderKind::Anthropic => Arc::new(AnthropicProvider::new(
                &entries.anthropic,
                self.transport.clone(),
            )),
            ProviderKind::OpenAi => {
                Arc::new(OpenAiProvider::new(&entries.openai, self.transport.clone()))
            }
            ProviderKind::Gemini => Arc::new(GeminiProvider::new(
                &entries.gemini,
                self.transport.clone(),
                self.ids.clone(),
            )),
        };

        if let Err(e) = provider.validate_config() {
            warn!(provider = kind.as_str(), error = %e, "AI provider failed validation");
            return Err(match e {
                ProviderError::Configuration { message, .. } => ProviderError::Configuration {
                    provider: kind.as_str().into(),
                    message,
                },
                other => other,
            });
        }

        info!(provider = provider.name(), "AI provider ready");
        Ok(provider)
    }
}
