//! Error types for the FieldAgent domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all FieldAgent operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Conversation protocol errors ---
    #[error("Conversation error: {0}")]
    Conversation(#[from] ConversationError),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool already registered: {0}")]
    AlreadyRegistered(String),

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool unavailable: {0}")]
    Unavailable(String),
}

/// Violations of the assistant/tool-result alternation the completion API
/// requires.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversationError {
    #[error("An assistant turn is already open")]
    TurnAlreadyOpen,

    #[error("No assistant turn is open")]
    NoOpenTurn,

    #[error("Tool results must follow a committed assistant turn")]
    ResultsWithoutToolUse,

    #[error("Tool result for unknown tool use: {0}")]
    UnknownToolUse(String),

    #[error("Duplicate tool result for tool use: {0}")]
    DuplicateToolResult(String),

    #[error("Missing tool results for: {}", .0.join(", "))]
    MissingToolResults(Vec<String>),

    #[error("Unanswered tool uses in the previous assistant message: {}", .0.join(", "))]
    UnansweredToolUses(Vec<String>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 529,
            message: "Overloaded".into(),
        });
        assert!(err.to_string().contains("529"));
        assert!(err.to_string().contains("Overloaded"));
    }

    #[test]
    fn tool_not_found_message_names_the_tool() {
        let err = ToolError::NotFound("draw_polygon".into());
        assert_eq!(err.to_string(), "Tool not found: draw_polygon");
    }

    #[test]
    fn missing_results_lists_ids() {
        let err = ConversationError::MissingToolResults(vec!["toolu_1".into(), "toolu_2".into()]);
        assert_eq!(err.to_string(), "Missing tool results for: toolu_1, toolu_2");
    }
}
