//! Vendor-neutral message types shared across all provider implementations.
//!
//! These types define the contract between the caller, the conversation
//! orchestrator and every LLM backend. Each provider translates them into its
//! own wire schema and back; nothing vendor-shaped leaves a provider.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// System instruction sent to every backend.
pub const SYSTEM_PROMPT: &str = "You are ChatFlow, an AI assistant that helps users automate tasks across multiple services.

You are friendly, helpful, and concise. You help users with:
- Creating and managing Supabase projects
- Managing credentials and API keys
- Automating common workflows

For now, you're in a basic mode without tool access. Just have natural conversations and help users understand what you can do.

When users ask about capabilities, explain that you'll soon be able to:
- Create Supabase projects
- Manage API keys securely
- Query databases
- And more integrations coming soon!";

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// A single turn in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    /// Tool invocations emitted by an assistant turn.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_uses: Vec<ToolUse>,
    /// Answers to the preceding assistant turn's tool invocations.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_results: Vec<ToolResult>,
}

impl ChatMessage {
    pub fn user(content: &str) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            tool_uses: Vec::new(),
            tool_results: Vec::new(),
        }
    }

    pub fn assistant(content: &str) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_uses: Vec::new(),
            tool_results: Vec::new(),
        }
    }

    pub fn system(content: &str) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            tool_uses: Vec::new(),
            tool_results: Vec::new(),
        }
    }

    /// The assistant turn that produced `response`, tool invocations included.
    pub fn from_response(response: &AiResponse) -> Self {
        Self {
            role: Role::Assistant,
            content: response.content.clone(),
            tool_uses: response.tool_uses.clone(),
            tool_results: Vec::new(),
        }
    }

    /// The user-side turn that hands tool output back to the model.
    pub fn tool_results(results: &[ToolResult]) -> Self {
        Self {
            role: Role::User,
            content: String::new(),
            tool_uses: Vec::new(),
            tool_results: results.to_vec(),
        }
    }
}

/// A capability the model may ask to invoke.
///
/// `input_schema` is passed through to the backend untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// A model-requested invocation of a [`Tool`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolUse {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub input: Map<String, Value>,
}

/// Output of an externally executed tool, correlated by `tool_use_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_use_id: String,
    pub content: String,
}

impl ToolResult {
    pub fn new(tool_use_id: &str, content: &str) -> Self {
        Self {
            tool_use_id: tool_use_id.into(),
            content: content.into(),
        }
    }
}

/// Normalized response from any provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AiResponse {
    /// Newline-joined text segments; may be empty for a pure tool turn.
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_uses: Vec<ToolUse>,
    /// Vendor finish reason, passed through unchanged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
}

impl AiResponse {
    pub fn has_tool_uses(&self) -> bool {
        !self.tool_uses.is_empty()
    }
}
