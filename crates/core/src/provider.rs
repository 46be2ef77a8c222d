//! Provider trait: the abstraction over hosted completion APIs.
//!
//! A Provider opens a streaming completion request and yields decoded
//! [`StreamEvent`]s in arrival order. The agent loop accumulates them; the
//! provider does not interpret tool-use input fragments.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::ProviderError;
use crate::message::Message;

/// Configuration for one completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// The model to use (e.g., "claude-sonnet-4-20250514")
    pub model: String,

    /// System prompt, sent as a top-level field
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    /// The conversation messages
    pub messages: Vec<Message>,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    pub max_tokens: u32,

    /// Available tools the model can call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
}

fn default_temperature() -> f32 {
    0.3
}

/// A tool definition sent to the LLM so it knows what tools it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's input
    pub input_schema: serde_json::Value,
}

/// Token usage information.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl Usage {
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }

    pub fn accumulate(&mut self, other: Usage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}

/// One decoded event from a streaming completion.
///
/// `index` identifies the content block within the current response; the
/// start, delta and stop events of a block share it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// A text block opened.
    TextStart { index: usize },

    /// Incremental text for an open text block.
    TextDelta { index: usize, text: String },

    /// A tool-use block opened.
    ToolUseStart {
        index: usize,
        id: String,
        name: String,
    },

    /// A raw fragment of a tool-use block's serialized input.
    InputDelta { index: usize, partial_json: String },

    /// A content block closed.
    BlockStop { index: usize },

    /// Token accounting reported by the upstream API.
    Usage(Usage),

    /// End of the response.
    MessageStop,
}

/// The receiving half of a provider event stream.
pub type EventStream = mpsc::Receiver<Result<StreamEvent, ProviderError>>;

/// The core Provider trait.
///
/// The agent loop calls `stream()` without knowing which backend answers.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "anthropic").
    fn name(&self) -> &str;

    /// Open a streaming completion.
    ///
    /// An `Err` means the request could not be opened; errors after that
    /// arrive as `Err` items on the returned stream.
    async fn stream(&self, request: ProviderRequest) -> Result<EventStream, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_accumulates() {
        let mut usage = Usage::default();
        usage.accumulate(Usage {
            input_tokens: 10,
            output_tokens: 4,
        });
        usage.accumulate(Usage {
            input_tokens: 12,
            output_tokens: 6,
        });
        assert_eq!(usage.total(), 32);
    }

    #[test]
    fn tool_definition_serialization() {
        let tool = ToolDefinition {
            name: "calculate_area".into(),
            description: "Compute polygon area".into(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": { "coordinates": { "type": "array" } }
            }),
        };
        let json = serde_json::to_string(&tool).unwrap();
        assert!(json.contains("input_schema"));
        assert!(json.contains("calculate_area"));
    }

    #[test]
    fn stream_event_tagging() {
        let event = StreamEvent::InputDelta {
            index: 1,
            partial_json: "{\"lat\":".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "input_delta");
        assert_eq!(json["index"], 1);
    }
}
