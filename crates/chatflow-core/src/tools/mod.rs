//! Tool execution seam.
//!
//! The core never runs tools itself. Callers hand the orchestrator a
//! [`ToolExecutor`], which both advertises the tool catalog and executes the
//! invocations a model asks for. [`ToolRegistry`] is the stock executor: a
//! name-keyed set of [`ToolHandler`]s registered at runtime.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::{debug, error};

use crate::provider::types::{Tool, ToolResult, ToolUse};

/// External collaborator that runs tool invocations.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Tool catalog offered to the model.
    fn tools(&self) -> Vec<Tool>;

    /// Run one invocation. Failures are reported in the result text.
    async fn execute(&self, tool_use: &ToolUse) -> ToolResult;
}

/// A single named capability.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Unique tool name used in function calls (e.g., "lookup").
    fn name(&self) -> &str;

    /// Human-readable description of what the tool does.
    fn description(&self) -> &str;

    /// JSON Schema for the tool's arguments.
    fn parameters(&self) -> Value;

    async fn execute(&self, args: &Map<String, Value>) -> String;
}

/// Registry of tool handlers, keyed by name.
///
/// Ordered by name so the catalog sent to a backend is stable.
pub struct ToolRegistry {
    handlers: BTreeMap<String, Box<dyn ToolHandler>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            handlers: BTreeMap::new(),
        }
    }

    /// Register a handler. Replaces any existing handler with the same name.
    pub fn register(&mut self, handler: Box<dyn ToolHandler>) {
        debug!(tool = handler.name(), "Registered tool");
        self.handlers.insert(handler.name().to_string(), handler);
    }

    pub fn has(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolExecutor for ToolRegistry {
    fn tools(&self) -> Vec<Tool> {
        self.handlers
            .values()
            .map(|h| Tool {
                name: h.name().into(),
                description: h.description().into(),
                input_schema: h.parameters(),
            })
            .collect()
    }

    async fn execute(&self, tool_use: &ToolUse) -> ToolResult {
        let content = match self.handlers.get(&tool_use.name) {
            Some(handler) => {
                debug!(tool = %tool_use.name, id = %tool_use.id, "Executing tool");
                handler.execute(&tool_use.input).await
            }
            None => {
                error!(tool = %tool_use.name, "Tool not found");
                format!("Error: Tool '{}' not found", tool_use.name)
            }
        };

        ToolResult {
            tool_use_id: tool_use.id.clone(),
            content,
        }
    }
}
