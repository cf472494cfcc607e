//! chatflow CLI — interactive chat, one-shot questions, and status commands.
//!
//! Usage:
//!   chatflow chat            — Start an interactive chat session
//!   chatflow ask "<message>" — Send one message and print the JSON reply
//!   chatflow providers       — List supported providers
//!   chatflow status          — Show configuration and credential health
//!   chatflow onboard         — Create a default configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chatflow_core::config::Config;
use chatflow_core::conversation::{Exchange, Orchestrator};
use chatflow_core::provider::factory::ProviderFactory;
use chatflow_core::provider::types::ChatMessage;
use chatflow_core::provider::{supported_providers, ProviderKind};
use chatflow_core::tools::ToolRegistry;

#[derive(Parser)]
#[command(
    name = "chatflow",
    version,
    about = "A multi-provider AI chat assistant",
    long_about = "chatflow — chat with Anthropic, OpenAI or Gemini through one interface.\n\nSelect a backend with --provider, AI_PROVIDER, or the config file."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive chat session
    Chat {
        /// Provider to use (overrides config and AI_PROVIDER)
        #[arg(short, long)]
        provider: Option<String>,
    },

    /// Send a single message and print the reply as JSON
    Ask {
        /// The message to send
        message: String,

        /// Provider to use (overrides config and AI_PROVIDER)
        #[arg(short, long)]
        provider: Option<String>,

        /// JSON file holding prior turns: [{"role": "user", "content": "..."}]
        #[arg(long)]
        history: Option<PathBuf>,
    },

    /// List supported providers and the current selection
    Providers,

    /// Show configuration status and credential health
    Status,

    /// Create or reset the default configuration
    Onboard,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Chat { provider }) => cmd_chat(provider.as_deref()).await?,
        Some(Commands::Ask {
            message,
            provider,
            history,
        }) => cmd_ask(&message, provider.as_deref(), history.as_deref()).await?,
        Some(Commands::Providers) => cmd_providers()?,
        Some(Commands::Status) => cmd_status()?,
        Some(Commands::Onboard) => cmd_onboard()?,
        None => cmd_chat(None).await?,
    }

    Ok(())
}

// ── Shared Setup ────────────────────────────────────────────────────

/// File configuration with the process environment laid over it.
///
/// This is the only place the environment is read.
fn load_config() -> Result<Config> {
    let mut config = Config::load()?;
    config.apply_env(|key| std::env::var(key).ok());
    tracing::debug!(provider = ?config.provider, "Configuration loaded");
    Ok(config)
}

fn setup_orchestrator(config: Config, provider: Option<&str>) -> Result<Orchestrator> {
    let client = reqwest::Client::new();
    let provider = ProviderFactory::with_client(config, client).create(provider)?;
    Ok(Orchestrator::new(provider))
}

// ── Chat Command ────────────────────────────────────────────────────

async fn cmd_chat(provider: Option<&str>) -> Result<()> {
    let config = load_config()?;
    let orchestrator = setup_orchestrator(config, provider)?;
    let tools = ToolRegistry::new();
    let mut history: Vec<ChatMessage> = Vec::new();

    println!();
    println!("  chatflow v{}", env!("CARGO_PKG_VERSION"));
    println!("  Provider: {}", orchestrator.provider_name());
    println!();
    println!("  Type your message, or /quit to exit.");
    println!("  ─────────────────────────────────────");
    println!();

    let stdin = io::stdin();
    loop {
        print!("  \x1b[36m>\x1b[0m ");
        io::stdout().flush()?;

        let mut input = String::new();
        if stdin.read_line(&mut input)? == 0 {
            break;
        }
        let input = input.trim();

        if input.is_empty() {
            continue;
        }

        match input {
            "/quit" | "/exit" | "/q" => {
                println!("  Goodbye!");
                break;
            }
            "/clear" => {
                history.clear();
                println!("  Conversation cleared.");
                continue;
            }
            "/status" => {
                cmd_status()?;
                continue;
            }
            _ => {}
        }

        println!();
        match orchestrator.run(input, &history, &tools).await {
            Ok(Exchange::Complete {
                response,
                history: next,
            }) => {
                println!("  \x1b[32m{}\x1b[0m\n", response.content);
                history = next;
            }
            Ok(Exchange::ToolsPending(pending)) => {
                let names: Vec<&str> = pending.tool_uses().iter().map(|t| t.name.as_str()).collect();
                println!("  \x1b[32m{}\x1b[0m", pending.response().content);
                println!("  \x1b[33m(unresolved tool requests: {})\x1b[0m\n", names.join(", "));
                history = pending.abandon();
            }
            Err(e) => {
                eprintln!("  \x1b[31mError: {}\x1b[0m\n", e);
            }
        }
    }

    Ok(())
}

// ── Ask Command ─────────────────────────────────────────────────────

async fn cmd_ask(message: &str, provider: Option<&str>, history: Option<&Path>) -> Result<()> {
    let history: Vec<ChatMessage> = match history {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read history file {}", path.display()))?;
            serde_json::from_str(&raw).context("History file is not a list of chat messages")?
        }
        None => Vec::new(),
    };

    let config = load_config()?;
    let orchestrator = setup_orchestrator(config, provider)?;
    let exchange = orchestrator.run(message, &history, &ToolRegistry::new()).await?;

    let reply = serde_json::json!({
        "message": exchange.response().content,
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "provider": orchestrator.provider_name(),
    });
    println!("{}", serde_json::to_string_pretty(&reply)?);
    Ok(())
}

// ── Providers Command ───────────────────────────────────────────────

fn cmd_providers() -> Result<()> {
    let config = load_config()?;
    let current = ProviderFactory::with_defaults(config).resolve(None);

    let reply = serde_json::json!({
        "current": current.map(|k| k.as_str().to_string()).unwrap_or_else(|e| e.to_string()),
        "supported": supported_providers(),
    });
    println!("{}", serde_json::to_string_pretty(&reply)?);
    Ok(())
}

// ── Onboard Command ─────────────────────────────────────────────────

fn cmd_onboard() -> Result<()> {
    let path = Config::write_default_template()?;
    println!();
    println!("  ✅ Configuration created at:");
    println!("     {}", path.display());
    println!();
    println!("  Next steps:");
    println!("  1. Edit the config file and add your API key");
    println!("  2. Run `chatflow chat` to start chatting");
    println!();
    Ok(())
}

// ── Status Command ──────────────────────────────────────────────────

fn cmd_status() -> Result<()> {
    let config_path = Config::default_path();
    let config = load_config()?;

    println!();
    println!("  chatflow status");
    println!("  ─────────────────────────────────────");

    if config_path.exists() {
        println!("  Config:    {}", config_path.display());
    } else {
        println!("  Config:    (none, using environment only; run `chatflow onboard`)");
    }

    let selected = ProviderFactory::with_defaults(config.clone()).resolve(None);
    match &selected {
        Ok(kind) => println!("  Provider:  {}", kind),
        Err(e) => println!("  Provider:  ❌ {}", e),
    }
    println!("  Supported: {}", supported_providers().join(", "));

    for kind in ProviderKind::ALL {
        let set = config.providers.entry(kind).has_key();
        let marker = if selected.as_ref().ok() == Some(&kind) { "*" } else { " " };
        println!(
            "  {marker} {:<24} {}",
            kind.credential_var(),
            if set { "✓ Set" } else { "✗ Missing" }
        );
    }

    println!();
    Ok(())
}
