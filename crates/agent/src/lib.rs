//! The agent loop: the heart of FieldAgent.
//!
//! Each `stream()` call runs a **Request → Decode → Act → Reinject** cycle:
//!
//! 1. **Request** a streaming completion with the history and tool schema
//! 2. **Decode** events, forwarding text to the caller as it arrives
//! 3. **Act**: run the tools the model asked for, in the order it closed them
//! 4. **Reinject** the results (plus the map screenshot when asked for) and
//!    go back to step 1
//!
//! The cycle ends when a turn asks for no tools, when the turn cap is hit,
//! or when the provider fails.

pub mod conversation;
pub mod loop_runner;
pub mod orchestrator;
pub mod prompt;
pub mod testing;
pub mod turn;

pub use conversation::{ConversationState, ToolOutcome};
pub use loop_runner::{AgentLoop, DEFAULT_MAX_TURNS};
pub use orchestrator::{MappingOrchestrator, PremiumGate};
pub use prompt::{Capabilities, SystemPrompt};
pub use turn::{ClosedToolUse, TurnScratch};
