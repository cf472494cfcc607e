//! Google Gemini `generateContent` provider.
//!
//! Gemini labels the assistant role `model`, takes the system prompt as a
//! separate `systemInstruction`, and returns function calls without ids.
//! Ids are therefore synthesized by an injected [`ToolCallIdGenerator`], and
//! function responses are matched back to their call by resolving the tool
//! name from the assistant turn in history.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

use super::ids::ToolCallIdGenerator;
use super::transport::{dispatch, HttpRequest, Transport};
use super::types::{AiResponse, ChatMessage, Role, Tool, ToolResult, ToolUse, SYSTEM_PROMPT};
use super::{join_text, AiProvider, ProviderKind, DEFAULT_MAX_TOKENS};
use crate::config::ProviderEntry;
use crate::error::ProviderError;

/// Default Gemini API base URL.
pub const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

const DEFAULT_MODEL: &str = "gemini-1.5-pro";

const NAME: &str = "gemini";

pub struct GeminiProvider {
    transport: Arc<dyn Transport>,
    ids: Arc<dyn ToolCallIdGenerator>,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
}

impl GeminiProvider {
    pub fn new(
        entry: &ProviderEntry,
        transport: Arc<dyn Transport>,
        ids: Arc<dyn ToolCallIdGenerator>,
    ) -> Self {
        let base_url = entry
            .api_base
            .as_deref()
            .unwrap_or(API_BASE)
            .trim_end_matches('/')
            .to_string();
        let model = entry.model.clone().unwrap_or_else(|| DEFAULT_MODEL.into());

        debug!(provider = NAME, base_url = %base_url, model = %model, "Initialized LLM provider");

        Self {
            transport,
            ids,
            api_key: entry.api_key.clone(),
            base_url,
            model,
            max_tokens: entry.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        }
    }

    async fn complete(
        &self,
        system: String,
        contents: Vec<Content>,
        tools: &[Tool],
    ) -> Result<AiResponse, ProviderError> {
        let tools_opt = if tools.is_empty() {
            None
        } else {
            Some(vec![ToolDeclarations {
                function_declarations: tools.iter().map(FunctionDeclaration::from).collect(),
            }])
        };

        let request_body = GenerateRequest {
            system_instruction: Content {
                role: None,
                parts: vec![Part::Text { text: system }],
            },
            contents,
            tools: tools_opt,
            generation_config: GenerationConfig {
                max_output_tokens: self.max_tokens,
            },
        };

        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        debug!(
            model = %self.model,
            url = %url,
            msg_count = request_body.contents.len(),
            tool_count = tools.len(),
            "Sending generateContent request"
        );

        let body = serde_json::to_value(&request_body)
            .map_err(|e| ProviderError::request(NAME, format!("Failed to encode request: {e}")))?;
        let request = HttpRequest {
            url,
            headers: vec![("x-goog-api-key".into(), self.api_key.clone())],
            body,
        };

        let raw = dispatch(self.transport.as_ref(), NAME, request)
            .await
            .inspect_err(|e| warn!(provider = NAME, error = %e, "Gemini API error"))?;
        self.parse_response(&raw)
    }

    fn parse_response(&self, raw: &str) -> Result<AiResponse, ProviderError> {
        let response: GenerateResponse = serde_json::from_str(raw).map_err(|e| {
            ProviderError::request(NAME, format!("Failed to parse LLM API response: {e}"))
        })?;

        let candidate = response.candidates.into_iter().next().ok_or_else(|| {
            let reason = response
                .prompt_feedback
                .and_then(|f| f.block_reason)
                .map(|r| format!(" (prompt blocked: {r})"))
                .unwrap_or_default();
            ProviderError::request(NAME, format!("LLM API returned no candidates{reason}"))
        })?;

        let mut texts = Vec::new();
        let mut tool_uses = Vec::new();
        for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
            match part {
                Part::Text { text } => texts.push(text),
                Part::FunctionCall { function_call } => {
                    let index = tool_uses.len();
                    tool_uses.push(ToolUse {
                        id: self.ids.next_id(index),
                        name: function_call.name,
                        input: function_call.args,
                    });
                }
                Part::FunctionResponse { .. } | Part::Other(_) => {}
            }
        }

        debug!(
            finish_reason = candidate.finish_reason.as_deref().unwrap_or("unknown"),
            function_calls = tool_uses.len(),
            "Received generateContent response"
        );

        Ok(AiResponse {
            content: join_text(texts.iter().map(String::as_str)),
            tool_uses,
            stop_reason: candidate.finish_reason,
        })
    }
}

// ── Gemini API request/response types ───────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    system_instruction: Content,
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ToolDeclarations<'a>>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolDeclarations<'a> {
    function_declarations: Vec<FunctionDeclaration<'a>>,
}

#[derive(Serialize)]
struct FunctionDeclaration<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a Value,
}

impl<'a> From<&'a Tool> for FunctionDeclaration<'a> {
    fn from(tool: &'a Tool) -> Self {
        Self {
            name: &tool.name,
            description: &tool.description,
            parameters: &tool.input_schema,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

impl Content {
    fn new(role: &str, parts: Vec<Part>) -> Self {
        Self {
            role: Some(role.into()),
            parts,
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    FunctionCall {
        #[serde(rename = "functionCall")]
        function_call: FunctionCall,
    },
    FunctionResponse {
        #[serde(rename = "functionResponse")]
        function_response: FunctionResponse,
    },
    /// Inline data, executable code and any other part kind.
    Other(Value),
}

#[derive(Serialize, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    args: Map<String, Value>,
}

#[derive(Serialize, Deserialize)]
struct FunctionResponse {
    name: String,
    response: Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

/// Split `history` into the system instruction and `user`/`model` contents.
///
/// Fails if a tool-result turn answers an id that no earlier assistant turn
/// invoked.
fn build_transcript(history: &[ChatMessage]) -> Result<(String, Vec<Content>), ProviderError> {
    let mut system = SYSTEM_PROMPT.to_string();
    let mut contents = Vec::with_capacity(history.len() + 1);

    for (i, msg) in history.iter().enumerate() {
        match msg.role {
            Role::System => {
                system.push_str("\n\n");
                system.push_str(&msg.content);
            }
            Role::User if !msg.tool_results.is_empty() => contents.push(Content::new(
                "user",
                function_responses(&history[..i], &msg.tool_results)?,
            )),
            Role::User => contents.push(Content::new(
                "user",
                vec![Part::Text {
                    text: msg.content.clone(),
                }],
            )),
            Role::Assistant => {
                let mut parts = Vec::with_capacity(msg.tool_uses.len() + 1);
                if !msg.content.is_empty() || msg.tool_uses.is_empty() {
                    parts.push(Part::Text {
                        text: msg.content.clone(),
                    });
                }
                parts.extend(msg.tool_uses.iter().map(|tu| Part::FunctionCall {
                    function_call: FunctionCall {
                        name: tu.name.clone(),
                        args: tu.input.clone(),
                    },
                }));
                contents.push(Content::new("model", parts));
            }
        }
    }

    Ok((system, contents))
}

/// `functionResponse` parts for `results`, named after the calls they answer.
fn function_responses(
    history: &[ChatMessage],
    results: &[ToolResult],
) -> Result<Vec<Part>, ProviderError> {
    results
        .iter()
        .map(|r| {
            let name = resolve_tool_name(history, &r.tool_use_id).ok_or_else(|| {
                ProviderError::Correlation {
                    tool_use_id: r.tool_use_id.clone(),
                    reason: "no assistant turn in history invoked this id".into(),
                }
            })?;
            Ok(Part::FunctionResponse {
                function_response: FunctionResponse {
                    name: name.to_string(),
                    response: json!({ "content": r.content }),
                },
            })
        })
        .collect()
}

/// Find the tool name for `tool_use_id` among the assistant turns of
/// `history`, most recent first.
fn resolve_tool_name<'h>(history: &'h [ChatMessage], tool_use_id: &str) -> Option<&'h str> {
    history
        .iter()
        .rev()
        .filter(|m| m.role == Role::Assistant)
        .flat_map(|m| m.tool_uses.iter())
        .find(|tu| tu.id == tool_use_id)
        .map(|tu| tu.name.as_str())
}

// ── AiProvider implementation ───────────────────────────────────────

#[async_trait]
impl AiProvider for GeminiProvider {
    fn name(&self) -> &'static str {
        NAME
    }

    fn validate_config(&self) -> Result<(), ProviderError> {
        if self.api_key.trim().is_empty() {
            return Err(ProviderKind::Gemini.missing_key_error());
        }
        Ok(())
    }

    async fn send_message(
        &self,
        message: &str,
        history: &[ChatMessage],
        tools: &[Tool],
    ) -> Result<AiResponse, ProviderError> {
        let (system, mut contents) = build_transcript(history)?;
        contents.push(Content::new(
            "user",
            vec![Part::Text {
                text: message.to_string(),
            }],
        ));
        self.complete(system, contents, tools).await
    }

    async fn continue_with_tool_result(
        &self,
        history: &[ChatMessage],
        tool_results: &[ToolResult],
        tools: &[Tool],
    ) -> Result<AiResponse, ProviderError> {
        let parts = function_responses(history, tool_results)?;
        let (system, mut contents) = build_transcript(history)?;
        contents.push(Content::new("user", parts));
        self.complete(system, contents, tools).await
    }
}
