//! OpenAI Chat Completions provider.
//!
//! The system prompt travels as the first `system` message, tools are
//! wrapped in `{type: "function", function: {...}}` envelopes, and each tool
//! result is its own `tool` message keyed by `tool_call_id`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

use super::transport::{dispatch, HttpRequest, Transport};
use super::types::{AiResponse, ChatMessage, Role, Tool, ToolResult, ToolUse, SYSTEM_PROMPT};
use super::{AiProvider, ProviderKind, DEFAULT_MAX_TOKENS};
use crate::config::ProviderEntry;
use crate::error::ProviderError;

/// Default OpenAI API base URL.
pub const API_BASE: &str = "https://api.openai.com/v1";

const DEFAULT_MODEL: &str = "gpt-4-turbo-preview";

const NAME: &str = "openai";

pub struct OpenAiProvider {
    transport: Arc<dyn Transport>,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
}

impl OpenAiProvider {
    pub fn new(entry: &ProviderEntry, transport: Arc<dyn Transport>) -> Self {
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
            api_key: entry.api_key.clone(),
            base_url,
            model,
            max_tokens: entry.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        }
    }

    async fn complete(
        &self,
        messages: Vec<MessageParam>,
        tools: &[Tool],
    ) -> Result<AiResponse, ProviderError> {
        let tools_opt: Option<Vec<ToolDefinition>> = if tools.is_empty() {
            None
        } else {
            Some(tools.iter().map(ToolDefinition::from).collect())
        };

        let request_body = CompletionRequest {
            model: &self.model,
            messages,
            max_tokens: self.max_tokens,
            tool_choice: tools_opt.as_ref().map(|_| "auto"),
            tools: tools_opt,
        };

        let url = format!("{}/chat/completions", self.base_url);
        debug!(
            model = %self.model,
            url = %url,
            msg_count = request_body.messages.len(),
            tool_count = tools.len(),
            "Sending chat completion request"
        );

        let body = serde_json::to_value(&request_body)
            .map_err(|e| ProviderError::request(NAME, format!("Failed to encode request: {e}")))?;
        let request = HttpRequest {
            url,
            headers: vec![("Authorization".into(), format!("Bearer {}", self.api_key))],
            body,
        };

        let raw = dispatch(self.transport.as_ref(), NAME, request)
            .await
            .inspect_err(|e| warn!(provider = NAME, error = %e, "OpenAI API error"))?;
        parse_response(&raw)
    }
}

// ── OpenAI API request/response types ───────────────────────────────

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<MessageParam>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ToolDefinition<'a>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'a str>,
}

#[derive(Serialize)]
struct MessageParam {
    role: &'static str,
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ToolCallParam>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl MessageParam {
    fn text(role: &'static str, content: &str) -> Self {
        Self {
            role,
            content: Some(content.to_string()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    fn tool(result: &ToolResult) -> Self {
        Self {
            role: "tool",
            content: Some(result.content.clone()),
            tool_calls: None,
            tool_call_id: Some(result.tool_use_id.clone()),
        }
    }
}

#[derive(Serialize)]
struct ToolCallParam {
    id: String,
    #[serde(rename = "type")]
    call_type: &'static str,
    function: FunctionCallParam,
}

#[derive(Serialize)]
struct FunctionCallParam {
    name: String,
    arguments: String,
}

/// Tool definition in OpenAI function-calling format.
#[derive(Serialize)]
struct ToolDefinition<'a> {
    #[serde(rename = "type")]
    def_type: &'static str,
    function: ToolFunctionDef<'a>,
}

#[derive(Serialize)]
struct ToolFunctionDef<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a Value,
}

impl<'a> From<&'a Tool> for ToolDefinition<'a> {
    fn from(tool: &'a Tool) -> Self {
        Self {
            def_type: "function",
            function: ToolFunctionDef {
                name: &tool.name,
                description: &tool.description,
                parameters: &tool.input_schema,
            },
        }
    }
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: MessageResponse,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct MessageResponse {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCallResponse>>,
}

#[derive(Deserialize)]
struct ToolCallResponse {
    id: String,
    function: FunctionCallResponse,
}

#[derive(Deserialize)]
struct FunctionCallResponse {
    name: String,
    arguments: String,
}

fn build_transcript(history: &[ChatMessage]) -> Vec<MessageParam> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(MessageParam::text("system", SYSTEM_PROMPT));

    for msg in history {
        let param = match msg.role {
            Role::System => MessageParam::text("system", &msg.content),
            Role::User if msg.tool_results.is_empty() => MessageParam::text("user", &msg.content),
            Role::User => {
                messages.extend(msg.tool_results.iter().map(MessageParam::tool));
                continue;
            }
            Role::Assistant if msg.tool_uses.is_empty() => {
                MessageParam::text("assistant", &msg.content)
            }
            Role::Assistant => MessageParam {
                role: "assistant",
                content: (!msg.content.is_empty()).then(|| msg.content.clone()),
                tool_calls: Some(
                    msg.tool_uses
                        .iter()
                        .map(|tu| ToolCallParam {
                            id: tu.id.clone(),
                            call_type: "function",
                            function: FunctionCallParam {
                                name: tu.name.clone(),
                                arguments: Value::Object(tu.input.clone()).to_string(),
                            },
                        })
                        .collect(),
                ),
                tool_call_id: None,
            },
        };
        messages.push(param);
    }

    messages
}

fn parse_response(raw: &str) -> Result<AiResponse, ProviderError> {
    let completion: CompletionResponse = serde_json::from_str(raw)
        .map_err(|e| ProviderError::request(NAME, format!("Failed to parse LLM API response: {e}")))?;

    let choice = completion
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::request(NAME, "LLM API returned no choices"))?;

    let tool_uses = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|tc| {
            let input = serde_json::from_str::<Map<String, Value>>(&tc.function.arguments)
                .map_err(|e| {
                    ProviderError::request(
                        NAME,
                        format!("Malformed arguments for tool '{}': {e}", tc.function.name),
                    )
                })?;
            Ok(ToolUse {
                id: tc.id,
                name: tc.function.name,
                input,
            })
        })
        .collect::<Result<Vec<_>, ProviderError>>()?;

    debug!(
        finish_reason = choice.finish_reason.as_deref().unwrap_or("unknown"),
        tool_calls = tool_uses.len(),
        "Received LLM response"
    );

    Ok(AiResponse {
        content: choice.message.content.unwrap_or_default(),
        tool_uses,
        stop_reason: choice.finish_reason,
    })
}

// ── AiProvider implementation ───────────────────────────────────────

#[async_trait]
impl AiProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        NAME
    }

    fn validate_config(&self) -> Result<(), ProviderError> {
        if self.api_key.trim().is_empty() {
            return Err(ProviderKind::OpenAi.missing_key_error());
        }
        Ok(())
    }

    async fn send_message(
        &self,
        message: &str,
        history: &[ChatMessage],
        tools: &[Tool],
    ) -> Result<AiResponse, ProviderError> {
        let mut messages = build_transcript(history);
        messages.push(MessageParam::text("user", message));
        self.complete(messages, tools).await
    }

    async fn continue_with_tool_result(
        &self,
        history: &[ChatMessage],
        tool_results: &[ToolResult],
        tools: &[Tool],
    ) -> Result<AiResponse, ProviderError> {
        let mut messages = build_transcript(history);
        messages.extend(tool_results.iter().map(MessageParam::tool));
        self.complete(messages, tools).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::testing::StubTransport;
    use serde_json::json;

    fn provider(stub: &Arc<StubTransport>) -> OpenAiProvider {
        let entry = ProviderEntry {
            api_key: "sk-test".into(),
            ..Default::default()
        };
        OpenAiProvider::new(&entry, stub.clone())
    }

    fn lookup_tool() -> Tool {
        Tool {
            name: "lookup".into(),
            description: "Look something up".into(),
            input_schema: json!({"type": "object", "properties": {"q": {"type": "string"}}}),
        }
    }

    #[tokio::test]
    async fn test_basic_chat_offers_no_tools() {
        let stub = Arc::new(StubTransport::new());
        stub.push_json(json!({
            "choices": [{"message": {"content": "Hi there"}, "finish_reason": "stop"}]
        }));

        let response = provider(&stub).send_message("Hello", &[], &[]).await.unwrap();
        assert_eq!(response.content, "Hi there");
        assert!(response.tool_uses.is_empty());
        assert_eq!(response.stop_reason.as_deref(), Some("stop"));

        let requests = stub.requests();
        assert_eq!(requests[0].url, "https://api.openai.com/v1/chat/completions");
        assert!(requests[0]
            .headers
            .contains(&("Authorization".to_string(), "Bearer sk-test".to_string())));

        let body = &requests[0].body;
        assert!(body.get("tools").is_none());
        assert!(body.get("tool_choice").is_none());
        assert_eq!(body["model"], "gpt-4-turbo-preview");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], SYSTEM_PROMPT);
        assert_eq!(body["messages"][1], json!({"role": "user", "content": "Hello"}));
    }

    #[tokio::test]
    async fn test_tool_calls_keep_vendor_ids() {
        let stub = Arc::new(StubTransport::new());
        stub.push_json(json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [
                        {"id": "call_a", "type": "function", "function": {"name": "lookup", "arguments": "{\"q\":\"x\"}"}},
                        {"id": "call_b", "type": "function", "function": {"name": "lookup", "arguments": "{}"}}
                    ]
                },
                "finish_reason": "tool_calls"
            }]
        }));

        let response = provider(&stub)
            .send_message("look it up", &[], &[lookup_tool()])
            .await
            .unwrap();
        assert_eq!(response.content, "");
        assert_eq!(response.tool_uses.len(), 2);
        assert_eq!(response.tool_uses[0].id, "call_a");
        assert_eq!(response.tool_uses[0].input["q"], "x");
        assert_eq!(response.tool_uses[1].id, "call_b");
        assert_eq!(response.stop_reason.as_deref(), Some("tool_calls"));

        let body = stub.last_body();
        assert_eq!(body["tool_choice"], "auto");
        assert_eq!(
            body["tools"],
            json!([{
                "type": "function",
                "function": {
                    "name": "lookup",
                    "description": "Look something up",
                    "parameters": {"type": "object", "properties": {"q": {"type": "string"}}}
                }
            }])
        );
    }

    #[tokio::test]
    async fn test_tool_results_become_tool_messages() {
        let stub = Arc::new(StubTransport::new());
        stub.push_json(json!({
            "choices": [{"message": {"content": "The answer is 42"}, "finish_reason": "stop"}]
        }));

        let mut input = Map::new();
        input.insert("q".into(), json!("x"));
        let history = vec![
            ChatMessage::user("what is x?"),
            ChatMessage {
                role: Role::Assistant,
                content: String::new(),
                tool_uses: vec![ToolUse {
                    id: "call_a".into(),
                    name: "lookup".into(),
                    input,
                }],
                tool_results: Vec::new(),
            },
        ];
        let before = history.clone();

        let response = provider(&stub)
            .continue_with_tool_result(&history, &[ToolResult::new("call_a", "42")], &[])
            .await
            .unwrap();
        assert_eq!(response.content, "The answer is 42");
        assert_eq!(history, before);

        let body = stub.last_body();
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[2]["role"], "assistant");
        assert_eq!(messages[2]["content"], Value::Null);
        assert_eq!(messages[2]["tool_calls"][0]["id"], "call_a");
        assert_eq!(messages[2]["tool_calls"][0]["function"]["arguments"], "{\"q\":\"x\"}");
        assert_eq!(
            messages[3],
            json!({"role": "tool", "content": "42", "tool_call_id": "call_a"})
        );
        assert!(body.get("tools").is_none());
    }

    #[tokio::test]
    async fn test_answered_cycle_in_history_becomes_tool_messages() {
        let stub = Arc::new(StubTransport::new());
        stub.push_json(json!({
            "choices": [{"message": {"content": "x is 42 and y is 7"}, "finish_reason": "stop"}]
        }));

        let call = |id: &str| ChatMessage {
            role: Role::Assistant,
            content: String::new(),
            tool_uses: vec![ToolUse {
                id: id.into(),
                name: "lookup".into(),
                input: Map::new(),
            }],
            tool_results: Vec::new(),
        };
        let history = vec![
            ChatMessage::user("x then y"),
            call("call_a"),
            ChatMessage::tool_results(&[ToolResult::new("call_a", "42")]),
            call("call_b"),
        ];

        provider(&stub)
            .continue_with_tool_result(&history, &[ToolResult::new("call_b", "7")], &[lookup_tool()])
            .await
            .unwrap();

        let body = stub.last_body();
        let messages = body["messages"].as_array().unwrap();
        let roles: Vec<&str> = messages.iter().filter_map(|m| m["role"].as_str()).collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "tool", "assistant", "tool"]);
        assert_eq!(
            messages[3],
            json!({"role": "tool", "content": "42", "tool_call_id": "call_a"})
        );
        assert_eq!(messages[5]["tool_call_id"], "call_b");
    }

    #[tokio::test]
    async fn test_malformed_arguments_fail_the_call() {
        let stub = Arc::new(StubTransport::new());
        stub.push_json(json!({
            "choices": [{
                "message": {
                    "content": "partial",
                    "tool_calls": [{"id": "call_a", "type": "function", "function": {"name": "lookup", "arguments": "{not json"}}]
                },
                "finish_reason": "tool_calls"
            }]
        }));

        let err = provider(&stub)
            .send_message("look it up", &[], &[lookup_tool()])
            .await
            .unwrap_err();
        assert_eq!(err.provider(), Some("openai"));
        assert!(err.to_string().contains("Malformed arguments for tool 'lookup'"));
    }

    #[tokio::test]
    async fn test_no_choices_is_request_error() {
        let stub = Arc::new(StubTransport::new());
        stub.push_json(json!({"choices": []}));

        let err = provider(&stub).send_message("Hello", &[], &[]).await.unwrap_err();
        assert_eq!(err, ProviderError::request("openai", "LLM API returned no choices"));
    }

    #[test]
    fn test_validate_config_requires_key() {
        let p = OpenAiProvider::new(&ProviderEntry::default(), Arc::new(StubTransport::new()));
        let err = p.validate_config().unwrap_err();
        assert!(err.to_string().contains("OPENAI_API_KEY is required"));
        assert!(err.to_string().contains("https://platform.openai.com/"));
    }
}
