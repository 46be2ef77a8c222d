//! Anthropic native provider implementation.
//!
//! Uses Anthropic's Messages API directly.
//!
//! Features:
//! - `x-api-key` header authentication (not Bearer)
//! - `anthropic-version` header
//! - System prompt as top-level field
//! - Native `tool_use` / `tool_result` / `image` content blocks
//! - Streaming via SSE, decoded into [`StreamEvent`]s per content block

use async_trait::async_trait;
use futures::StreamExt;
use fieldagent_core::error::ProviderError;
use fieldagent_core::message::{ContentBlock, Message, Role};
use fieldagent_core::provider::*;
use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::sse::SseBuffer;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const EVENT_BUFFER: usize = 64;

/// Anthropic native Messages API provider.
pub struct AnthropicProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider.
    pub fn new(api_key: impl Into<String>) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            name: "anthropic".into(),
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            client,
        })
    }

    /// Create with a custom base URL (e.g., for testing or proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Convert messages to Anthropic API format.
    fn to_api_messages(messages: &[Message]) -> Vec<AnthropicMessage<'_>> {
        messages
            .iter()
            .map(|msg| AnthropicMessage {
                role: match msg.role {
                    Role::User => "user",
                    Role::Assistant => "assistant",
                },
                content: &msg.content,
            })
            .collect()
    }

    /// Build the JSON request body for a streaming call.
    fn request_body(request: &ProviderRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.messages),
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "stream": true,
        });

        if let Some(ref sys) = request.system {
            body["system"] = serde_json::json!(sys);
        }

        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(request.tools);
        }

        body
    }

    /// Map a non-success HTTP status to a provider error.
    fn status_error(status: u16, body: String) -> ProviderError {
        match status {
            429 => ProviderError::RateLimited {
                retry_after_secs: 5,
            },
            401 | 403 => ProviderError::AuthenticationFailed("Invalid Anthropic API key".into()),
            _ => ProviderError::ApiError {
                status_code: status,
                message: body,
            },
        }
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stream(&self, request: ProviderRequest) -> Result<EventStream, ProviderError> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = Self::request_body(&request);

        debug!(
            provider = "anthropic",
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Sending streaming request"
        );

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Anthropic API error");
            return Err(Self::status_error(status, error_body));
        }

        let (tx, rx) = tokio::sync::mpsc::channel(EVENT_BUFFER);

        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut sse = SseBuffer::default();

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx
                            .send(Err(ProviderError::StreamInterrupted(e.to_string())))
                            .await;
                        return;
                    }
                };

                for data in sse.push(&bytes) {
                    let event: serde_json::Value = match serde_json::from_str(&data) {
                        Ok(v) => v,
                        Err(e) => {
                            trace!(error = %e, data = %data, "Ignoring unparseable Anthropic SSE");
                            continue;
                        }
                    };

                    match decode_event(&event) {
                        Ok(events) => {
                            for ev in events {
                                let stop = ev == StreamEvent::MessageStop;
                                if tx.send(Ok(ev)).await.is_err() {
                                    return;
                                }
                                if stop {
                                    return;
                                }
                            }
                        }
                        Err(e) => {
                            let _ = tx.send(Err(e)).await;
                            return;
                        }
                    }
                }
            }

            let _ = tx
                .send(Err(ProviderError::StreamInterrupted(
                    "stream ended before message_stop".into(),
                )))
                .await;
        });

        Ok(rx)
    }
}

/// Decode one Anthropic SSE payload into zero or more stream events.
///
/// Blocks other than `text` and `tool_use` (e.g. `thinking`) produce no start
/// event; their deltas are dropped and their stop event is passed through,
/// which consumers ignore for unknown indices.
pub fn decode_event(event: &serde_json::Value) -> Result<Vec<StreamEvent>, ProviderError> {
    let index = event["index"].as_u64().unwrap_or(0) as usize;

    let events = match event["type"].as_str().unwrap_or("") {
        "message_start" => {
            let usage = &event["message"]["usage"];
            match usage["input_tokens"].as_u64() {
                Some(input) => vec![StreamEvent::Usage(Usage {
                    input_tokens: input as u32,
                    output_tokens: usage["output_tokens"].as_u64().unwrap_or(0) as u32,
                })],
                None => vec![],
            }
        }
        "content_block_start" => {
            let block = &event["content_block"];
            match block["type"].as_str() {
                Some("text") => {
                    let mut out = vec![StreamEvent::TextStart { index }];
                    if let Some(text) = block["text"].as_str()
                        && !text.is_empty()
                    {
                        out.push(StreamEvent::TextDelta {
                            index,
                            text: text.to_string(),
                        });
                    }
                    out
                }
                Some("tool_use") => vec![StreamEvent::ToolUseStart {
                    index,
                    id: block["id"].as_str().unwrap_or("").to_string(),
                    name: block["name"].as_str().unwrap_or("").to_string(),
                }],
                _ => vec![],
            }
        }
        "content_block_delta" => {
            let delta = &event["delta"];
            match delta["type"].as_str() {
                Some("text_delta") => delta["text"]
                    .as_str()
                    .map(|text| StreamEvent::TextDelta {
                        index,
                        text: text.to_string(),
                    })
                    .into_iter()
                    .collect(),
                Some("input_json_delta") => delta["partial_json"]
                    .as_str()
                    .map(|partial| StreamEvent::InputDelta {
                        index,
                        partial_json: partial.to_string(),
                    })
                    .into_iter()
                    .collect(),
                _ => vec![],
            }
        }
        "content_block_stop" => vec![StreamEvent::BlockStop { index }],
        "message_delta" => match event["usage"]["output_tokens"].as_u64() {
            Some(out) => vec![StreamEvent::Usage(Usage {
                input_tokens: 0,
                output_tokens: out as u32,
            })],
            None => vec![],
        },
        "message_stop" => vec![StreamEvent::MessageStop],
        "error" => {
            let message = event["error"]["message"]
                .as_str()
                .unwrap_or("unknown upstream error");
            let kind = event["error"]["type"].as_str().unwrap_or("error");
            return Err(ProviderError::StreamInterrupted(format!("{kind}: {message}")));
        }
        // ping and future event types
        _ => vec![],
    };

    Ok(events)
}

// --- Anthropic API types ---

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'static str,
    content: &'a [ContentBlock],
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldagent_core::message::ImageSource;

    #[test]
    fn constructor() {
        let provider = AnthropicProvider::new("sk-ant-test").unwrap();
        assert_eq!(provider.name(), "anthropic");
        assert_eq!(provider.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn constructor_with_base_url() {
        let provider = AnthropicProvider::new("sk-ant-test")
            .unwrap()
            .with_base_url("https://custom.proxy.com/");
        assert_eq!(provider.base_url, "https://custom.proxy.com");
    }

    #[test]
    fn request_body_shape() {
        let mut assistant = Message::new(
            Role::Assistant,
            vec![
                ContentBlock::text("Let me measure that"),
                ContentBlock::ToolUse {
                    id: "toolu_1".into(),
                    name: "calculate_area".into(),
                    input: serde_json::json!({}),
                },
            ],
        );
        assistant.id = "msg_local".into();
        let results = Message::new(
            Role::User,
            vec![
                ContentBlock::ToolResult {
                    tool_use_id: "toolu_1".into(),
                    content: "{\"acres\":1.0}".into(),
                    is_error: false,
                },
                ContentBlock::Image {
                    source: ImageSource::Base64 {
                        media_type: "image/png".into(),
                        data: "AAAA".into(),
                    },
                },
            ],
        );

        let request = ProviderRequest {
            model: "claude-sonnet-4-20250514".into(),
            system: Some("You are a surveyor".into()),
            messages: vec![Message::user("How big is it?"), assistant, results],
            temperature: 0.3,
            max_tokens: 1024,
            tools: vec![ToolDefinition {
                name: "calculate_area".into(),
                description: "Area".into(),
                input_schema: serde_json::json!({"type": "object"}),
            }],
        };

        let body = AnthropicProvider::request_body(&request);
        assert_eq!(body["stream"], true);
        assert_eq!(body["system"], "You are a surveyor");
        assert_eq!(body["messages"].as_array().unwrap().len(), 3);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"][0]["type"], "text");
        assert_eq!(body["messages"][1]["content"][1]["type"], "tool_use");
        assert_eq!(body["messages"][2]["content"][0]["tool_use_id"], "toolu_1");
        assert_eq!(body["messages"][2]["content"][1]["source"]["type"], "base64");
        assert_eq!(body["tools"][0]["input_schema"]["type"], "object");
        // Local message ids never reach the wire
        assert!(body["messages"][1].get("id").is_none());
    }

    #[test]
    fn request_body_without_system_or_tools() {
        let request = ProviderRequest {
            model: "m".into(),
            system: None,
            messages: vec![Message::user("hi")],
            temperature: 0.0,
            max_tokens: 10,
            tools: vec![],
        };
        let body = AnthropicProvider::request_body(&request);
        assert!(body.get("system").is_none());
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn status_mapping() {
        assert!(matches!(
            AnthropicProvider::status_error(429, String::new()),
            ProviderError::RateLimited { .. }
        ));
        assert!(matches!(
            AnthropicProvider::status_error(401, String::new()),
            ProviderError::AuthenticationFailed(_)
        ));
        match AnthropicProvider::status_error(529, "overloaded".into()) {
            ProviderError::ApiError {
                status_code,
                message,
            } => {
                assert_eq!(status_code, 529);
                assert_eq!(message, "overloaded");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn decode_text_block() {
        let start = serde_json::json!({
            "type": "content_block_start", "index": 0,
            "content_block": {"type": "text", "text": ""}
        });
        assert_eq!(
            decode_event(&start).unwrap(),
            vec![StreamEvent::TextStart { index: 0 }]
        );

        let delta = serde_json::json!({
            "type": "content_block_delta", "index": 0,
            "delta": {"type": "text_delta", "text": "Hello"}
        });
        assert_eq!(
            decode_event(&delta).unwrap(),
            vec![StreamEvent::TextDelta {
                index: 0,
                text: "Hello".into()
            }]
        );
    }

    #[test]
    fn decode_tool_use_block() {
        let start = serde_json::json!({
            "type": "content_block_start", "index": 1,
            "content_block": {"type": "tool_use", "id": "toolu_9", "name": "geocode_address", "input": {}}
        });
        assert_eq!(
            decode_event(&start).unwrap(),
            vec![StreamEvent::ToolUseStart {
                index: 1,
                id: "toolu_9".into(),
                name: "geocode_address".into()
            }]
        );

        let delta = serde_json::json!({
            "type": "content_block_delta", "index": 1,
            "delta": {"type": "input_json_delta", "partial_json": "{\"query\": \"Na"}
        });
        assert_eq!(
            decode_event(&delta).unwrap(),
            vec![StreamEvent::InputDelta {
                index: 1,
                partial_json: "{\"query\": \"Na".into()
            }]
        );

        let stop = serde_json::json!({"type": "content_block_stop", "index": 1});
        assert_eq!(
            decode_event(&stop).unwrap(),
            vec![StreamEvent::BlockStop { index: 1 }]
        );
    }

    #[test]
    fn decode_usage_and_stop() {
        let start = serde_json::json!({
            "type": "message_start",
            "message": {"usage": {"input_tokens": 120, "output_tokens": 1}}
        });
        assert_eq!(
            decode_event(&start).unwrap(),
            vec![StreamEvent::Usage(Usage {
                input_tokens: 120,
                output_tokens: 1
            })]
        );
        let delta = serde_json::json!({"type": "message_delta", "usage": {"output_tokens": 42}});
        assert_eq!(
            decode_event(&delta).unwrap(),
            vec![StreamEvent::Usage(Usage {
                input_tokens: 0,
                output_tokens: 42
            })]
        );
        let stop = serde_json::json!({"type": "message_stop"});
        assert_eq!(decode_event(&stop).unwrap(), vec![StreamEvent::MessageStop]);
    }

    #[test]
    fn decode_ignores_ping_and_thinking() {
        assert!(decode_event(&serde_json::json!({"type": "ping"})).unwrap().is_empty());
        let thinking = serde_json::json!({
            "type": "content_block_start", "index": 0,
            "content_block": {"type": "thinking", "thinking": ""}
        });
        assert!(decode_event(&thinking).unwrap().is_empty());
    }

    #[test]
    fn decode_error_event() {
        let event = serde_json::json!({
            "type": "error",
            "error": {"type": "overloaded_error", "message": "Overloaded"}
        });
        let err = decode_event(&event).unwrap_err();
        assert!(matches!(err, ProviderError::StreamInterrupted(ref m) if m.contains("Overloaded")));
    }
}
