//! Conversation orchestrator: the two-phase exchange.
//!
//! 1. Send the user message with prior history
//! 2. If the model asked for tools → the caller executes them
//! 3. Feed the results back → return the follow-up response
//!
//! There is no automatic looping. A follow-up that requests more tools comes
//! back as [`Exchange::ToolsPending`] and repeating the cycle is the caller's
//! decision.

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::ProviderError;
use crate::provider::types::{AiResponse, ChatMessage, Tool, ToolResult, ToolUse};
use crate::provider::AiProvider;
use crate::tools::ToolExecutor;

/// A response that is waiting on external tool execution.
#[derive(Debug, Clone)]
pub struct PendingTools {
    /// Every turn before the tool-invoking one, earlier answered cycles
    /// included.
    base: Vec<ChatMessage>,
    response: AiResponse,
}

impl PendingTools {
    pub fn tool_uses(&self) -> &[ToolUse] {
        &self.response.tool_uses
    }

    pub fn response(&self) -> &AiResponse {
        &self.response
    }

    /// History up to and including the tool-invoking assistant turn.
    pub fn history(&self) -> Vec<ChatMessage> {
        let mut history = self.base.clone();
        history.push(ChatMessage::from_response(&self.response));
        history
    }

    /// History for a caller that will not run the tools: the unanswered
    /// invocations are dropped and only the turn's text, if any, is kept.
    pub fn abandon(self) -> Vec<ChatMessage> {
        let mut history = self.base;
        if !self.response.content.is_empty() {
            history.push(ChatMessage::assistant(&self.response.content));
        }
        history
    }
}

/// Outcome of one orchestrator step.
#[derive(Debug, Clone)]
pub enum Exchange {
    /// Final answer with no outstanding tool invocations.
    Complete {
        response: AiResponse,
        history: Vec<ChatMessage>,
    },
    ToolsPending(PendingTools),
}

impl Exchange {
    fn classify(base: Vec<ChatMessage>, response: AiResponse) -> Self {
        if response.has_tool_uses() {
            Self::ToolsPending(PendingTools { base, response })
        } else {
            let mut history = base;
            history.push(ChatMessage::from_response(&response));
            Self::Complete { response, history }
        }
    }

    pub fn response(&self) -> &AiResponse {
        match self {
            Self::Complete { response, .. } => response,
            Self::ToolsPending(pending) => pending.response(),
        }
    }

    /// History to pass into the next call.
    pub fn history(&self) -> Vec<ChatMessage> {
        match self {
            Self::Complete { history, .. } => history.clone(),
            Self::ToolsPending(pending) => pending.history(),
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete { .. })
    }
}

/// Drives one conversation turn against a single provider.
///
/// Holds no conversation state; one orchestrator can serve many
/// conversations concurrently.
#[derive(Clone)]
pub struct Orchestrator {
    provider: Arc<dyn AiProvider>,
}

impl Orchestrator {
    pub fn new(provider: Arc<dyn AiProvider>) -> Self {
        Self { provider }
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Send `message` after `history`. `history` is only read.
    pub async fn send(
        &self,
        message: &str,
        history: &[ChatMessage],
        tools: &[Tool],
    ) -> Result<Exchange, ProviderError> {
        if message.trim().is_empty() {
            return Err(ProviderError::EmptyMessage);
        }

        debug!(
            provider = self.provider.name(),
            history = history.len(),
            tools = tools.len(),
            "Awaiting model response"
        );
        let response = self.provider.send_message(message, history, tools).await?;

        let mut base = history.to_vec();
        base.push(ChatMessage::user(message));
        let exchange = Exchange::classify(base, response);

        if let Exchange::ToolsPending(pending) = &exchange {
            info!(
                provider = self.provider.name(),
                tool_uses = pending.tool_uses().len(),
                "Model requested tools"
            );
        }
        Ok(exchange)
    }

    /// Feed externally produced `results` for `pending` back to the model.
    ///
    /// Every pending tool use must be answered exactly once, and every result
    /// must answer one of them.
    pub async fn resolve(
        &self,
        pending: PendingTools,
        results: &[ToolResult],
        tools: &[Tool],
    ) -> Result<Exchange, ProviderError> {
        check_correlation(pending.tool_uses(), results)?;

        debug!(
            provider = self.provider.name(),
            results = results.len(),
            "Awaiting follow-up response"
        );
        let mut history = pending.history();
        let response = self
            .provider
            .continue_with_tool_result(&history, results, tools)
            .await?;

        history.push(ChatMessage::tool_results(results));
        Ok(Exchange::classify(history, response))
    }

    /// One full cycle: send, execute any requested tools with `executor`,
    /// and return the follow-up.
    pub async fn run(
        &self,
        message: &str,
        history: &[ChatMessage],
        executor: &dyn ToolExecutor,
    ) -> Result<Exchange, ProviderError> {
        let tools = executor.tools();
        let pending = match self.send(message, history, &tools).await? {
            Exchange::ToolsPending(pending) => pending,
            complete => return Ok(complete),
        };

        let mut results = Vec::with_capacity(pending.tool_uses().len());
        for tool_use in pending.tool_uses() {
            results.push(executor.execute(tool_use).await);
        }

        self.resolve(pending, &results, &tools).await
    }
}

fn check_correlation(tool_uses: &[ToolUse], results: &[ToolResult]) -> Result<(), ProviderError> {
    let pending: HashSet<&str> = tool_uses.iter().map(|t| t.id.as_str()).collect();
    let mut answered = HashSet::new();

    for result in results {
        if !pending.contains(result.tool_use_id.as_str()) {
            return Err(ProviderError::Correlation {
                tool_use_id: result.tool_use_id.clone(),
                reason: "not emitted by the preceding response".into(),
            });
        }
        if !answered.insert(result.tool_use_id.as_str()) {
            return Err(ProviderError::Correlation {
                tool_use_id: result.tool_use_id.clone(),
                reason: "answered more than once".into(),
            });
        }
    }

    if let Some(missing) = tool_uses.iter().find(|t| !answered.contains(t.id.as_str())) {
        return Err(ProviderError::Correlation {
            tool_use_id: missing.id.clone(),
            reason: "no result supplied".into(),
        });
    }
    Ok(())
}
