//! Tool trait: the abstraction over agent capabilities.
//!
//! Tools are what let the model act: measure a drawn polygon, geocode an
//! address, hand the current map screenshot to the conversation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::context::ExecutionContext;
use crate::error::ToolError;
use crate::provider::ToolDefinition;

/// A request to execute a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique call ID (matches the model's tool_use id)
    pub id: String,

    /// Name of the tool to execute
    pub name: String,

    /// Parsed input
    pub input: serde_json::Value,
}

/// The core Tool trait.
///
/// Each tool is registered once in a [`ToolRegistry`] when an agent is
/// constructed. Handlers are awaited one at a time by the agent loop and get a
/// shared, read-only [`ExecutionContext`]; anything they want the model to see
/// must be part of the returned value.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "calculate_area").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's input.
    fn input_schema(&self) -> serde_json::Value;

    /// Execute the tool with parsed input.
    async fn execute(
        &self,
        input: serde_json::Value,
        ctx: &ExecutionContext,
    ) -> Result<serde_json::Value, ToolError>;

    /// Whether a successful call means "put the context's binary payload in
    /// front of the model". The loop then attaches it to the next user message.
    fn attaches_context_payload(&self) -> bool {
        false
    }

    /// Convert this tool into a ToolDefinition for sending to the LLM.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
        }
    }
}

/// An ordered registry of available tools.
///
/// Registration order is preserved and used for the schema sent to the model
/// on every turn. Names are unique.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Fails if a tool with the same name already exists.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), ToolError> {
        let name = tool.name().to_string();
        if self.index.contains_key(&name) {
            return Err(ToolError::AlreadyRegistered(name));
        }
        self.index.insert(name, self.tools.len());
        self.tools.push(tool);
        Ok(())
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.index.get(name).map(|&i| self.tools[i].as_ref())
    }

    /// All tools, in registration order.
    pub fn list(&self) -> impl Iterator<Item = &dyn Tool> {
        self.tools.iter().map(|t| t.as_ref())
    }

    /// Get all tool definitions (for sending to the LLM).
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.list().map(|t| t.to_definition()).collect()
    }

    /// List all registered tool names, in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.list().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Execute a tool call: lookup, input validation, then the handler.
    pub async fn execute(
        &self,
        call: &ToolCall,
        ctx: &ExecutionContext,
    ) -> Result<serde_json::Value, ToolError> {
        let tool = self
            .get(&call.name)
            .ok_or_else(|| ToolError::NotFound(call.name.clone()))?;
        validate_input(&tool.input_schema(), &call.input)?;
        tool.execute(call.input.clone(), ctx).await
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

/// Check the structural parts of a JSON schema we rely on: the input must be
/// an object when the schema says so, and every `required` key must be
/// present.
pub fn validate_input(
    schema: &serde_json::Value,
    input: &serde_json::Value,
) -> Result<(), ToolError> {
    if schema["type"].as_str() == Some("object") && !input.is_object() {
        return Err(ToolError::InvalidArguments(
            "input must be a JSON object".into(),
        ));
    }

    let missing: Vec<&str> = schema["required"]
        .as_array()
        .map(|required| {
            required
                .iter()
                .filter_map(|k| k.as_str())
                .filter(|k| input.get(k).is_none_or(|v| v.is_null()))
                .collect()
        })
        .unwrap_or_default();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(ToolError::InvalidArguments(format!(
            "missing required field(s): {}",
            missing.join(", ")
        )))
    }
}
