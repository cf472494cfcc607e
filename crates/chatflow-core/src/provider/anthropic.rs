//! Anthropic Messages API provider.
//!
//! Differs from the OpenAI format in three ways that matter here: the system
//! prompt is a top-level field, assistant tool invocations are `tool_use`
//! content blocks, and tool results go back as `tool_result` blocks inside a
//! `user` turn.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

use super::transport::{dispatch, HttpRequest, Transport};
use super::types::{AiResponse, ChatMessage, Role, Tool, ToolResult, ToolUse, SYSTEM_PROMPT};
use super::{join_text, AiProvider, ProviderKind, DEFAULT_MAX_TOKENS};
use crate::config::ProviderEntry;
use crate::error::ProviderError;

/// Default Anthropic API base URL.
pub const API_BASE: &str = "https://api.anthropic.com/v1";

/// The Anthropic API version header value.
const API_VERSION: &str = "2023-06-01";

const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20241022";

const NAME: &str = "anthropic";

pub struct AnthropicProvider {
    transport: Arc<dyn Transport>,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicProvider {
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
        system: String,
        messages: Vec<MessageParam>,
        tools: &[Tool],
    ) -> Result<AiResponse, ProviderError> {
        let tools_opt = if tools.is_empty() {
            None
        } else {
            Some(tools.iter().map(ToolParam::from).collect())
        };

        let request_body = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            system,
            messages,
            tools: tools_opt,
        };

        let url = format!("{}/messages", self.base_url);
        debug!(
            model = %self.model,
            url = %url,
            msg_count = request_body.messages.len(),
            tool_count = tools.len(),
            "Sending messages request"
        );

        let body = serde_json::to_value(&request_body)
            .map_err(|e| ProviderError::request(NAME, format!("Failed to encode request: {e}")))?;
        let request = HttpRequest {
            url,
            headers: vec![
                ("x-api-key".into(), self.api_key.clone()),
                ("anthropic-version".into(), API_VERSION.into()),
            ],
            body,
        };

        let raw = dispatch(self.transport.as_ref(), NAME, request)
            .await
            .inspect_err(|e| warn!(provider = NAME, error = %e, "Anthropic API error"))?;
        parse_response(&raw)
    }
}

// ── Anthropic API request/response types ────────────────────────────

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: String,
    messages: Vec<MessageParam>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ToolParam<'a>>>,
}

#[derive(Serialize)]
struct MessageParam {
    role: &'static str,
    content: MessageContent,
}

#[derive(Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlockParam>),
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlockParam {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Map<String, Value>,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
    },
}

#[derive(Serialize)]
struct ToolParam<'a> {
    name: &'a str,
    description: &'a str,
    input_schema: &'a Value,
}

impl<'a> From<&'a Tool> for ToolParam<'a> {
    fn from(tool: &'a Tool) -> Self {
        Self {
            name: &tool.name,
            description: &tool.description,
            input_schema: &tool.input_schema,
        }
    }
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Map<String, Value>,
    },
    #[serde(other)]
    Other,
}

/// Split `history` into the top-level system text and the transcript.
fn build_transcript(history: &[ChatMessage]) -> (String, Vec<MessageParam>) {
    let mut system = SYSTEM_PROMPT.to_string();
    let mut messages = Vec::with_capacity(history.len() + 1);

    for msg in history {
        match msg.role {
            Role::System => {
                system.push_str("\n\n");
                system.push_str(&msg.content);
            }
            Role::User if msg.tool_results.is_empty() => messages.push(MessageParam {
                role: "user",
                content: MessageContent::Text(msg.content.clone()),
            }),
            Role::User => messages.push(tool_result_turn(&msg.tool_results)),
            Role::Assistant if msg.tool_uses.is_empty() => messages.push(MessageParam {
                role: "assistant",
                content: MessageContent::Text(msg.content.clone()),
            }),
            Role::Assistant => {
                let mut blocks = Vec::with_capacity(msg.tool_uses.len() + 1);
                if !msg.content.is_empty() {
                    blocks.push(ContentBlockParam::Text {
                        text: msg.content.clone(),
                    });
                }
                blocks.extend(msg.tool_uses.iter().map(|tu| ContentBlockParam::ToolUse {
                    id: tu.id.clone(),
                    name: tu.name.clone(),
                    input: tu.input.clone(),
                }));
                messages.push(MessageParam {
                    role: "assistant",
                    content: MessageContent::Blocks(blocks),
                });
            }
        }
    }

    (system, messages)
}

/// A `user` turn of `tool_result` blocks.
fn tool_result_turn(results: &[ToolResult]) -> MessageParam {
    MessageParam {
        role: "user",
        content: MessageContent::Blocks(
            results
                .iter()
                .map(|r| ContentBlockParam::ToolResult {
                    tool_use_id: r.tool_use_id.clone(),
                    content: r.content.clone(),
                })
                .collect(),
        ),
    }
}

fn parse_response(raw: &str) -> Result<AiResponse, ProviderError> {
    let response: MessagesResponse = serde_json::from_str(raw)
        .map_err(|e| ProviderError::request(NAME, format!("Failed to parse LLM API response: {e}")))?;

    let mut texts = Vec::new();
    let mut tool_uses = Vec::new();
    for block in response.content {
        match block {
            ContentBlock::Text { text } => texts.push(text),
            ContentBlock::ToolUse { id, name, input } => tool_uses.push(ToolUse { id, name, input }),
            ContentBlock::Other => {}
        }
    }

    debug!(
        stop_reason = response.stop_reason.as_deref().unwrap_or("unknown"),
        tool_uses = tool_uses.len(),
        "Received messages response"
    );

    Ok(AiResponse {
        content: join_text(texts.iter().map(String::as_str)),
        tool_uses,
        stop_reason: response.stop_reason,
    })
}

// ── AiProvider implementation ───────────────────────────────────────

#[async_trait]
impl AiProvider for AnthropicProvider {
    fn name(&self) -> &'static str {
        NAME
    }

    fn validate_config(&self) -> Result<(), ProviderError> {
        if self.api_key.trim().is_empty() {
            return Err(ProviderKind::Anthropic.missing_key_error());
        }
        Ok(())
    }

    async fn send_message(
        &self,
        message: &str,
        history: &[ChatMessage],
        tools: &[Tool],
    ) -> Result<AiResponse, ProviderError> {
        let (system, mut messages) = build_transcript(history);
        messages.push(MessageParam {
            role: "user",
            content: MessageContent::Text(message.to_string()),
        });
        self.complete(system, messages, tools).await
    }

    async fn continue_with_tool_result(
        &self,
        history: &[ChatMessage],
        tool_results: &[ToolResult],
        tools: &[Tool],
    ) -> Result<AiResponse, ProviderError> {
        let (system, mut messages) = build_transcript(history);
        messages.push(tool_result_turn(tool_results));
        self.complete(system, messages, tools).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::testing::StubTransport;
    use serde_json::json;

    fn provider(stub: &Arc<StubTransport>) -> AnthropicProvider {
        let entry = ProviderEntry {
            api_key: "sk-ant-test".into(),
            ..Default::default()
        };
        AnthropicProvider::new(&entry, stub.clone())
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
            "content": [{"type": "text", "text": "Hi there"}],
            "stop_reason": "end_turn"
        }));

        let response = provider(&stub).send_message("Hello", &[], &[]).await.unwrap();
        assert_eq!(response.content, "Hi there");
        assert!(response.tool_uses.is_empty());
        assert_eq!(response.stop_reason.as_deref(), Some("end_turn"));

        let requests = stub.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].url, "https://api.anthropic.com/v1/messages");
        assert!(requests[0]
            .headers
            .contains(&("x-api-key".to_string(), "sk-ant-test".to_string())));

        let body = &requests[0].body;
        assert!(body.get("tools").is_none());
        assert_eq!(body["system"], SYSTEM_PROMPT);
        assert_eq!(body["max_tokens"], 4096);
        assert_eq!(body["messages"], json!([{"role": "user", "content": "Hello"}]));
    }

    #[tokio::test]
    async fn test_interleaved_blocks_are_decomposed_in_order() {
        let stub = Arc::new(StubTransport::new());
        stub.push_json(json!({
            "content": [
                {"type": "text", "text": "Let me check."},
                {"type": "tool_use", "id": "toolu_01", "name": "lookup", "input": {"q": "x"}},
                {"type": "text", "text": "And this too."},
                {"type": "tool_use", "id": "toolu_02", "name": "lookup", "input": {"q": "y"}}
            ],
            "stop_reason": "tool_use"
        }));

        let history = vec![ChatMessage::user("earlier"), ChatMessage::assistant("noted")];
        let before = history.clone();
        let response = provider(&stub)
            .send_message("look up x and y", &history, &[lookup_tool()])
            .await
            .unwrap();

        assert_eq!(history, before);
        assert_eq!(response.content, "Let me check.\nAnd this too.");
        let ids: Vec<&str> = response.tool_uses.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["toolu_01", "toolu_02"]);
        assert_eq!(response.tool_uses[1].input["q"], "y");

        let body = stub.last_body();
        assert_eq!(body["tools"][0]["name"], "lookup");
        assert_eq!(body["tools"][0]["input_schema"]["type"], "object");
        assert_eq!(body["messages"].as_array().unwrap().len(), 3);
        assert_eq!(body["messages"][1]["role"], "assistant");
    }

    #[tokio::test]
    async fn test_tool_results_follow_tool_use_turn() {
        let stub = Arc::new(StubTransport::new());
        stub.push_json(json!({
            "content": [{"type": "text", "text": "The answer is 42"}],
            "stop_reason": "end_turn"
        }));

        let mut input = Map::new();
        input.insert("q".into(), json!("x"));
        let history = vec![
            ChatMessage::user("what is x?"),
            ChatMessage {
                role: Role::Assistant,
                content: String::new(),
                tool_uses: vec![ToolUse {
                    id: "toolu_01".into(),
                    name: "lookup".into(),
                    input,
                }],
                tool_results: Vec::new(),
            },
        ];

        let response = provider(&stub)
            .continue_with_tool_result(&history, &[ToolResult::new("toolu_01", "42")], &[lookup_tool()])
            .await
            .unwrap();
        assert_eq!(response.content, "The answer is 42");
        assert!(response.tool_uses.is_empty());

        let body = stub.last_body();
        assert_eq!(
            body["messages"][1]["content"],
            json!([{"type": "tool_use", "id": "toolu_01", "name": "lookup", "input": {"q": "x"}}])
        );
        assert_eq!(
            body["messages"][2],
            json!({
                "role": "user",
                "content": [{"type": "tool_result", "tool_use_id": "toolu_01", "content": "42"}]
            })
        );
    }

    fn tool_turn(id: &str) -> ChatMessage {
        ChatMessage {
            role: Role::Assistant,
            content: String::new(),
            tool_uses: vec![ToolUse {
                id: id.into(),
                name: "lookup".into(),
                input: Map::new(),
            }],
            tool_results: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_continuation_without_tools_offers_none() {
        let stub = Arc::new(StubTransport::new());
        stub.push_json(json!({
            "content": [{"type": "text", "text": "The answer is 42"}],
            "stop_reason": "end_turn"
        }));

        let history = vec![ChatMessage::user("what is x?"), tool_turn("toolu_01")];
        provider(&stub)
            .continue_with_tool_result(&history, &[ToolResult::new("toolu_01", "42")], &[])
            .await
            .unwrap();

        let body = stub.last_body();
        assert!(body.get("tools").is_none());
        assert!(body.get("tool_choice").is_none());
    }

    #[tokio::test]
    async fn test_answered_cycle_in_history_is_rebuilt() {
        let stub = Arc::new(StubTransport::new());
        stub.push_json(json!({
            "content": [{"type": "text", "text": "x is 42 and y is 7"}],
            "stop_reason": "end_turn"
        }));

        let history = vec![
            ChatMessage::user("x then y"),
            tool_turn("toolu_01"),
            ChatMessage::tool_results(&[ToolResult::new("toolu_01", "42")]),
            tool_turn("toolu_02"),
        ];
        provider(&stub)
            .continue_with_tool_result(&history, &[ToolResult::new("toolu_02", "7")], &[lookup_tool()])
            .await
            .unwrap();

        let body = stub.last_body();
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 5);
        assert_eq!(messages[1]["content"][0]["id"], "toolu_01");
        assert_eq!(
            messages[2],
            json!({
                "role": "user",
                "content": [{"type": "tool_result", "tool_use_id": "toolu_01", "content": "42"}]
            })
        );
        assert_eq!(messages[3]["content"][0]["id"], "toolu_02");
        assert_eq!(messages[4]["content"][0]["tool_use_id"], "toolu_02");
    }

    #[tokio::test]
    async fn test_history_system_turn_joins_system_field() {
        let stub = Arc::new(StubTransport::new());
        stub.push_json(json!({"content": [], "stop_reason": "end_turn"}));

        let history = vec![ChatMessage::system("Answer in French.")];
        let response = provider(&stub).send_message("Hello", &history, &[]).await.unwrap();
        assert_eq!(response.content, "");

        let body = stub.last_body();
        assert!(body["system"].as_str().unwrap().ends_with("Answer in French."));
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_backend_failure_is_request_error() {
        let stub = Arc::new(StubTransport::new());
        stub.push_reply(
            401,
            r#"{"type": "error", "error": {"type": "authentication_error", "message": "invalid x-api-key"}}"#,
        );

        let err = provider(&stub).send_message("Hello", &[], &[]).await.unwrap_err();
        assert_eq!(
            err,
            ProviderError::request("anthropic", "LLM API error (401): invalid x-api-key")
        );
    }

    #[test]
    fn test_validate_config_requires_key() {
        let stub = Arc::new(StubTransport::new());
        let p = AnthropicProvider::new(&ProviderEntry::default(), stub.clone());
        let err = p.validate_config().unwrap_err();
        assert!(matches!(err, ProviderError::Configuration { ref provider, .. } if provider == "anthropic"));
        assert!(err.to_string().contains("ANTHROPIC_API_KEY"));
        assert!(stub.requests().is_empty());

        assert!(provider(&stub).validate_config().is_ok());
    }

    #[test]
    fn test_custom_base_url() {
        let entry = ProviderEntry {
            api_key: "k".into(),
            api_base: Some("http://localhost:8080/v1/".into()),
            model: Some("claude-3-haiku".into()),
            max_tokens: Some(512),
        };
        let p = AnthropicProvider::new(&entry, Arc::new(StubTransport::new()));
        assert_eq!(p.base_url, "http://localhost:8080/v1");
        assert_eq!(p.model, "claude-3-haiku");
        assert_eq!(p.max_tokens, 512);
    }
}
