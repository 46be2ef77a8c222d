//! # FieldAgent Core
//!
//! Domain types, traits, and error definitions for the FieldAgent
//! tool-calling runtime. This crate has no HTTP or CLI dependencies; it
//! defines the model every other crate implements against.
//!
//! ## Layout
//!
//! - [`provider`]: the streaming completion API seam
//! - [`tool`]: tools and the ordered registry
//! - [`chunk`]: what `stream()` yields
//! - [`agent`]: the facade callers use (`stream`, `execute`)

pub mod agent;
pub mod chunk;
pub mod context;
pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use agent::{Agent, AgentInput, AgentRequest, AgentResponse};
pub use chunk::{AgentChunk, ChunkEmitter, ChunkKind, ChunkStream};
pub use context::{Attachment, Coordinate, ExecutionContext};
pub use error::{ConversationError, Error, ProviderError, Result, ToolError};
pub use event::{DomainEvent, EventBus};
pub use message::{ContentBlock, ImageSource, Message, Role};
pub use provider::{EventStream, Provider, ProviderRequest, StreamEvent, ToolDefinition, Usage};
pub use tool::{Tool, ToolCall, ToolRegistry};
