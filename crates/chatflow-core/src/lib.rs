//! chatflow-core: Core library for the chatflow AI assistant.
//!
//! This crate normalizes three vendor chat APIs behind one contract:
//!
//! - [`config`] — Typed configuration loading from JSON and the environment
//! - [`provider`] — `AiProvider` trait, Anthropic/OpenAI/Gemini adapters, factory
//! - [`conversation`] — Two-phase orchestrator (message → tools → follow-up)
//! - [`tools`] — Tool executor seam and registry
//! - [`error`] — Error taxonomy shared by all of the above
//!
//! # Quick Start
//!
//! ```no_run
//! use chatflow_core::config::Config;
//! use chatflow_core::conversation::Orchestrator;
//! use chatflow_core::provider::factory::ProviderFactory;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let mut config = Config::load()?;
//! config.apply_env(|k| std::env::var(k).ok());
//!
//! let provider = ProviderFactory::with_defaults(config).create(None)?;
//! let orchestrator = Orchestrator::new(provider);
//!
//! let exchange = orchestrator.send("Hello", &[], &[]).await?;
//! println!("{}", exchange.response().content);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod conversation;
pub mod error;
pub mod provider;
pub mod tools;

pub use error::ProviderError;
