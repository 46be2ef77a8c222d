//! The streaming agent loop.
//!
//! One `run()` call drives up to `max_turns` request/response turns against
//! the provider:
//!
//! 1. **Request** the completion with the full history and tool schema
//! 2. **Decode** events: text is re-emitted live as `content` chunks, tool
//!    input fragments are buffered per block
//! 3. **Execute** the turn's tool uses one at a time, in block-close order
//! 4. **Reinject** the results (and a screenshot, when a payload-bearing tool
//!    asked for it) as the next user message, then loop
//!
//! A turn without tool uses ends the stream with `complete`. Tool failures
//! become error tool-results the model can react to; only provider and
//! protocol failures end the stream with `error`.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::FutureExt;
use fieldagent_config::AppConfig;
use fieldagent_core::agent::AgentRequest;
use fieldagent_core::chunk::{ChunkEmitter, ChunkStream};
use fieldagent_core::context::ExecutionContext;
use fieldagent_core::error::ProviderError;
use fieldagent_core::event::{DomainEvent, EventBus};
use fieldagent_core::provider::{Provider, ProviderRequest, StreamEvent, Usage};
use fieldagent_core::tool::{ToolCall, ToolRegistry};
use tracing::{Instrument, debug, info, info_span, warn};

use crate::conversation::{ConversationState, ToolOutcome};
use crate::turn::{ClosedToolUse, TurnScratch};

pub const DEFAULT_MAX_TURNS: u32 = 5;

/// The core agent loop that orchestrates LLM calls and tool execution.
///
/// Cheap to clone; every `run()` moves a clone into its own task.
#[derive(Clone)]
pub struct AgentLoop {
    /// The LLM provider to use
    provider: Arc<dyn Provider>,

    /// Tool registry, fixed at construction
    tools: Arc<ToolRegistry>,

    /// The model to use
    model: String,

    /// Temperature setting
    temperature: f32,

    /// Max tokens per response
    max_tokens: u32,

    /// Hard cap on request/response turns per run
    max_turns: u32,

    /// Chunks buffered ahead of the caller
    stream_buffer: usize,

    /// Event bus for domain events
    event_bus: Arc<EventBus>,
}

/// Why the turn loop stopped without an error.
enum Exit {
    Finished,
    CallerGone,
}

/// Counters for one run, reported in the `complete` chunk.
struct RunStats {
    stream_id: String,
    turns: u32,
    tool_calls: u32,
    usage: Usage,
}

impl RunStats {
    fn new() -> Self {
        Self {
            stream_id: uuid::Uuid::new_v4().to_string(),
            turns: 0,
            tool_calls: 0,
            usage: Usage::default(),
        }
    }

    fn summary(&self, model: &str) -> serde_json::Map<String, serde_json::Value> {
        let mut metadata = serde_json::Map::new();
        metadata.insert("stream_id".into(), self.stream_id.clone().into());
        metadata.insert("turns".into(), self.turns.into());
        metadata.insert("tool_calls".into(), self.tool_calls.into());
        metadata.insert("model".into(), model.into());
        metadata.insert("timestamp".into(), Utc::now().to_rfc3339().into());
        if self.usage.total() > 0 {
            metadata.insert(
                "usage".into(),
                serde_json::json!({
                    "input_tokens": self.usage.input_tokens,
                    "output_tokens": self.usage.output_tokens,
                }),
            );
        }
        metadata
    }
}

impl AgentLoop {
    /// Create a new agent loop.
    pub fn new(
        provider: Arc<dyn Provider>,
        tools: Arc<ToolRegistry>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            tools,
            model: model.into(),
            temperature: 0.3,
            max_tokens: 4096,
            max_turns: DEFAULT_MAX_TURNS,
            stream_buffer: 32,
            event_bus: Arc::new(EventBus::default()),
        }
    }

    /// Create a loop with model and limits taken from configuration.
    pub fn from_config(
        provider: Arc<dyn Provider>,
        tools: Arc<ToolRegistry>,
        config: &AppConfig,
    ) -> Self {
        Self::new(provider, tools, config.model.clone())
            .with_temperature(config.temperature)
            .with_max_tokens(config.max_tokens)
            .with_max_turns(config.agent.max_turns)
            .with_stream_buffer(config.agent.stream_buffer)
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = max;
        self
    }

    /// Set the turn cap. At least one turn always runs.
    pub fn with_max_turns(mut self, max: u32) -> Self {
        self.max_turns = max.max(1);
        self
    }

    pub fn with_stream_buffer(mut self, buffer: usize) -> Self {
        self.stream_buffer = buffer;
        self
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = event_bus;
        self
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn max_turns(&self) -> u32 {
        self.max_turns
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// Start a run in a background task and return its chunk stream.
    ///
    /// The stream ends with exactly one `complete` or `error` chunk, unless
    /// the caller drops it first, which stops the run at its next emit.
    pub fn run(&self, system: impl Into<String>, request: AgentRequest) -> ChunkStream {
        let (emitter, stream) = ChunkEmitter::channel(self.stream_buffer);
        let this = self.clone();
        let system = system.into();
        let span = info_span!("agent_stream", model = %self.model);
        tokio::spawn(this.drive(system, request, emitter).instrument(span));
        stream
    }

    async fn drive(self, system: String, request: AgentRequest, mut emitter: ChunkEmitter) {
        let mut run = RunStats::new();
        let ctx = request.context.unwrap_or_default();
        let prompt = request.input.to_prompt();

        info!(
            stream_id = %run.stream_id,
            max_turns = self.max_turns,
            attachment = ctx.has_attachment(),
            coordinates = ctx.coordinates.len(),
            "Starting agent stream"
        );

        let outcome = self
            .run_turns(&system, prompt, &ctx, &mut run, &mut emitter)
            .await;

        let success = match outcome {
            Ok(Exit::Finished) => {
                emitter.complete(run.summary(&self.model)).await;
                true
            }
            Ok(Exit::CallerGone) => {
                debug!(stream_id = %run.stream_id, turns = run.turns, "Caller dropped the stream");
                false
            }
            Err(e) => {
                warn!(stream_id = %run.stream_id, turns = run.turns, error = %e, "Agent stream failed");
                emitter.error(e.to_string()).await;
                false
            }
        };

        self.event_bus.publish(DomainEvent::StreamFinished {
            stream_id: run.stream_id,
            turns: run.turns,
            success,
            timestamp: Utc::now(),
        });
    }

    async fn run_turns(
        &self,
        system: &str,
        prompt: String,
        ctx: &ExecutionContext,
        run: &mut RunStats,
        emitter: &mut ChunkEmitter,
    ) -> Result<Exit, fieldagent_core::Error> {
        let mut conversation = ConversationState::new();
        conversation.append_user_message(prompt, &[])?;
        let definitions = self.tools.definitions();

        let mut opening = serde_json::Map::new();
        opening.insert("stream_id".into(), run.stream_id.clone().into());
        opening.insert("model".into(), self.model.clone().into());
        if !emitter.metadata(opening).await {
            return Ok(Exit::CallerGone);
        }

        for turn in 1..=self.max_turns {
            run.turns = turn;
            self.event_bus.publish(DomainEvent::TurnStarted {
                stream_id: run.stream_id.clone(),
                turn,
                timestamp: Utc::now(),
            });
            debug!(turn, messages = conversation.messages().len(), "Opening completion request");

            let request = ProviderRequest {
                model: self.model.clone(),
                system: Some(system.to_string()),
                messages: conversation.messages().to_vec(),
                temperature: self.temperature,
                max_tokens: self.max_tokens,
                tools: definitions.clone(),
            };
            let mut events = self.provider.stream(request).await?;

            conversation.begin_assistant_turn()?;
            let mut scratch = TurnScratch::new();
            while let Some(event) = events.recv().await {
                match event? {
                    StreamEvent::TextStart { .. } => {}
                    StreamEvent::TextDelta { text, .. } if text.is_empty() => {}
                    StreamEvent::TextDelta { text, .. } => {
                        conversation.append_text_fragment(&text)?;
                        if !emitter.content(text).await {
                            return Ok(Exit::CallerGone);
                        }
                    }
                    StreamEvent::ToolUseStart { index, id, name } => {
                        if scratch.knows_id(&id) {
                            return Err(ProviderError::Protocol(format!(
                                "tool use id {id} repeated within one response"
                            ))
                            .into());
                        }
                        scratch.open_tool_use(index, id, name);
                    }
                    StreamEvent::InputDelta {
                        index,
                        partial_json,
                    } => scratch.push_input(index, &partial_json),
                    StreamEvent::BlockStop { index } => match scratch.close(index) {
                        Some(tool_use) => conversation.append_tool_use(
                            tool_use.id.clone(),
                            tool_use.name.clone(),
                            tool_use.input_for_history(),
                        )?,
                        None => conversation.close_text_segment()?,
                    },
                    StreamEvent::Usage(usage) => run.usage.accumulate(usage),
                    StreamEvent::MessageStop => break,
                }
            }
            conversation.commit_assistant_turn()?;

            let tool_uses = scratch.finish();
            if tool_uses.is_empty() {
                info!(turns = turn, tool_calls = run.tool_calls, "Agent stream complete");
                return Ok(Exit::Finished);
            }

            debug!(turn, tool_count = tool_uses.len(), "Executing tool calls");
            let mut attach = false;
            for tool_use in &tool_uses {
                match self.execute_tool(tool_use, ctx, &run.stream_id).await {
                    Ok(result) => {
                        run.tool_calls += 1;
                        attach |= self
                            .tools
                            .get(&tool_use.name)
                            .is_some_and(|t| t.attaches_context_payload());
                        conversation
                            .record_tool_result(&tool_use.id, ToolOutcome::Success(result.clone()))?;
                        if !emitter
                            .tool_call(&tool_use.name, tool_use.input_for_history(), result)
                            .await
                        {
                            return Ok(Exit::CallerGone);
                        }
                    }
                    Err(message) => {
                        conversation.record_tool_result(&tool_use.id, ToolOutcome::Failure(message))?;
                    }
                }
            }

            let attachment = ctx.attachment.as_ref().filter(|_| attach);
            if let Some(attachment) = attachment {
                debug!(media_type = %attachment.media_type, "Attaching context payload after tool results");
            }
            conversation.flush_tool_results(attachment)?;
        }

        warn!(max_turns = self.max_turns, "Turn cap reached, stopping");
        Ok(Exit::Finished)
    }

    /// Run one tool use. Lookup, validation, and handler failures all come
    /// back as the message recorded for the model.
    async fn execute_tool(
        &self,
        tool_use: &ClosedToolUse,
        ctx: &ExecutionContext,
        stream_id: &str,
    ) -> Result<serde_json::Value, String> {
        let started = Instant::now();
        let result = match &tool_use.input {
            Ok(input) => {
                let call = ToolCall {
                    id: tool_use.id.clone(),
                    name: tool_use.name.clone(),
                    input: input.clone(),
                };
                // A panicking handler must not take the stream task down with it
                match AssertUnwindSafe(self.tools.execute(&call, ctx))
                    .catch_unwind()
                    .await
                {
                    Ok(result) => result.map_err(|e| e.to_string()),
                    Err(panic) => Err(format!("Tool panicked: {}", panic_message(panic.as_ref()))),
                }
            }
            Err(parse_error) => Err(parse_error.clone()),
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(_) => debug!(tool = %tool_use.name, duration_ms, "Tool call succeeded"),
            Err(e) => warn!(tool = %tool_use.name, error = %e, "Tool call failed"),
        }
        self.event_bus.publish(DomainEvent::ToolExecuted {
            stream_id: stream_id.to_string(),
            tool_name: tool_use.name.clone(),
            success: result.is_ok(),
            duration_ms,
            timestamp: Utc::now(),
        });

        result
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
