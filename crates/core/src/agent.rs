//! The agent facade: the contract callers program against.
//!
//! A concrete agent provides `stream()`; `execute()` is derived by folding the
//! chunk stream into an [`AgentResponse`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::chunk::{ChunkKind, ChunkStream};
use crate::context::ExecutionContext;
use crate::provider::ToolDefinition;
use crate::tool::{Tool, ToolRegistry};

/// What the caller asks the agent to do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AgentInput {
    Text(String),
    Structured(serde_json::Value),
}

impl AgentInput {
    /// Render the input as the text of the first user message.
    pub fn to_prompt(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Structured(value) => match value.get("message").and_then(|m| m.as_str()) {
                Some(message) => message.to_string(),
                None => value.to_string(),
            },
        }
    }
}

impl From<&str> for AgentInput {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for AgentInput {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

/// A request to `stream()` or `execute()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRequest {
    pub input: AgentInput,

    #[serde(default)]
    pub context: Option<ExecutionContext>,
}

impl AgentRequest {
    pub fn new(input: impl Into<AgentInput>) -> Self {
        Self {
            input: input.into(),
            context: None,
        }
    }

    pub fn with_context(mut self, context: ExecutionContext) -> Self {
        self.context = Some(context);
        self
    }
}

/// Batch-mode result: a chunk stream folded into one value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentResponse {
    pub success: bool,

    #[serde(default)]
    pub content: String,

    /// Results of successful tool calls, in the order they completed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<serde_json::Value>>,

    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AgentResponse {
    /// Consume a chunk stream exactly once.
    ///
    /// Content is concatenated, tool-call results collected, metadata merged
    /// (later keys win). An `error` chunk ends the fold with a failure, and so
    /// does a stream that closes before its `complete` chunk.
    pub async fn from_stream(mut stream: ChunkStream) -> Self {
        let mut response = Self::default();
        let mut data: Vec<serde_json::Value> = Vec::new();
        let mut completed = false;

        while let Some(chunk) = stream.recv().await {
            match chunk.kind {
                ChunkKind::Content { content } => response.content.push_str(&content),
                ChunkKind::ToolCall { result, .. } => data.push(result),
                ChunkKind::Metadata { metadata } => response.metadata.extend(metadata),
                ChunkKind::Complete { metadata } => {
                    response.metadata.extend(metadata);
                    completed = true;
                }
                ChunkKind::Error { message } => {
                    return Self {
                        success: false,
                        content: String::new(),
                        data: None,
                        metadata: response.metadata,
                        error: Some(message),
                    };
                }
            }
        }

        if !completed {
            tracing::warn!("Chunk stream closed without a terminal chunk");
            return Self {
                success: false,
                content: String::new(),
                data: None,
                metadata: response.metadata,
                error: Some("stream ended without a terminal chunk".into()),
            };
        }

        response.success = true;
        response.data = (!data.is_empty()).then_some(data);
        response
    }
}

/// The externally consumed agent contract.
#[async_trait]
pub trait Agent: Send + Sync {
    /// A stable name for this agent (e.g., "mapping_orchestrator").
    fn name(&self) -> &str;

    /// The tools this agent offers, built once at construction.
    fn tools(&self) -> &ToolRegistry;

    fn get_tool(&self, name: &str) -> Option<&dyn Tool> {
        self.tools().get(name)
    }

    fn get_tools(&self) -> Vec<ToolDefinition> {
        self.tools().definitions()
    }

    /// Entitlement gate, checked by the caller before `stream()`.
    fn can_execute(&self, _ctx: &ExecutionContext) -> bool {
        true
    }

    /// Run the agent, yielding chunks as they are produced.
    async fn stream(&self, request: AgentRequest) -> ChunkStream;

    /// Run the agent to completion and fold its output.
    async fn execute(&self, request: AgentRequest) -> AgentResponse {
        AgentResponse::from_stream(self.stream(request).await).await
    }
}
