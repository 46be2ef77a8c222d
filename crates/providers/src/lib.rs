//! LLM provider implementations for FieldAgent.
//!
//! All providers implement the `fieldagent_core::Provider` trait and yield
//! decoded [`fieldagent_core::StreamEvent`]s.

pub mod anthropic;
mod sse;

pub use anthropic::AnthropicProvider;
