//! Message history for one `stream()` invocation.
//!
//! The completion API rejects histories where an assistant message's tool
//! uses are not answered, one-for-one, by the next user message. This type
//! refuses to build such a history instead of letting the request fail
//! upstream.

use fieldagent_core::context::Attachment;
use fieldagent_core::error::ConversationError;
use fieldagent_core::message::{ContentBlock, Message, Role};

/// Text sent after an attached image so the model knows what it is looking at.
pub const ATTACHMENT_NOTE: &str =
    "Here is the current map screenshot you requested. Use it together with the tool results above.";

/// How a tool call ended, as recorded for the model.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    Success(serde_json::Value),
    Failure(String),
}

impl ToolOutcome {
    fn into_block(self, tool_use_id: String) -> ContentBlock {
        match self {
            Self::Success(value) => ContentBlock::ToolResult {
                tool_use_id,
                content: match value {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                },
                is_error: false,
            },
            Self::Failure(message) => ContentBlock::ToolResult {
                tool_use_id,
                content: message,
                is_error: true,
            },
        }
    }
}

/// Append-only history plus the buffers of the turn being decoded.
#[derive(Debug, Default)]
pub struct ConversationState {
    messages: Vec<Message>,

    /// Blocks of the assistant message being decoded; `None` between turns
    open_turn: Option<Vec<ContentBlock>>,

    /// Text of the segment currently streaming
    pending_text: String,

    /// Results for the last committed assistant turn, in arrival order
    pending_results: Vec<(String, ToolOutcome)>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a plain user message, optionally with attachments.
    ///
    /// Not allowed while an assistant turn is open or while the last
    /// assistant message still has unanswered tool uses.
    pub fn append_user_message(
        &mut self,
        text: impl Into<String>,
        attachments: &[Attachment],
    ) -> Result<(), ConversationError> {
        if self.open_turn.is_some() {
            return Err(ConversationError::TurnAlreadyOpen);
        }
        self.ensure_tool_uses_answered()?;

        let mut content = vec![ContentBlock::text(text)];
        content.extend(attachments.iter().map(Attachment::to_content_block));
        self.messages.push(Message::new(Role::User, content));
        Ok(())
    }

    pub fn begin_assistant_turn(&mut self) -> Result<(), ConversationError> {
        if self.open_turn.is_some() {
            return Err(ConversationError::TurnAlreadyOpen);
        }
        self.ensure_tool_uses_answered()?;
        self.open_turn = Some(Vec::new());
        Ok(())
    }

    /// Append streamed text to the current segment.
    pub fn append_text_fragment(&mut self, text: &str) -> Result<(), ConversationError> {
        if self.open_turn.is_none() {
            return Err(ConversationError::NoOpenTurn);
        }
        self.pending_text.push_str(text);
        Ok(())
    }

    /// Freeze the current text segment into the open turn.
    pub fn close_text_segment(&mut self) -> Result<(), ConversationError> {
        let blocks = self.open_turn.as_mut().ok_or(ConversationError::NoOpenTurn)?;
        if !self.pending_text.is_empty() {
            blocks.push(ContentBlock::text(std::mem::take(&mut self.pending_text)));
        }
        Ok(())
    }

    pub fn append_tool_use(
        &mut self,
        id: impl Into<String>,
        name: impl Into<String>,
        input: serde_json::Value,
    ) -> Result<(), ConversationError> {
        self.close_text_segment()?;
        if let Some(blocks) = self.open_turn.as_mut() {
            blocks.push(ContentBlock::ToolUse {
                id: id.into(),
                name: name.into(),
                input,
            });
        }
        Ok(())
    }

    /// Freeze the open turn into history.
    ///
    /// A turn that produced nothing at all leaves no message behind.
    pub fn commit_assistant_turn(&mut self) -> Result<(), ConversationError> {
        self.close_text_segment()?;
        let blocks = self.open_turn.take().ok_or(ConversationError::NoOpenTurn)?;
        if blocks.is_empty() {
            tracing::debug!("Empty assistant turn, nothing to commit");
        } else {
            self.messages.push(Message::new(Role::Assistant, blocks));
        }
        Ok(())
    }

    /// Record the result for one tool use of the last committed turn.
    pub fn record_tool_result(
        &mut self,
        tool_use_id: &str,
        outcome: ToolOutcome,
    ) -> Result<(), ConversationError> {
        let expected = self.unanswered_tool_use_ids()?;
        if !expected.iter().any(|id| id == tool_use_id) {
            return Err(ConversationError::UnknownToolUse(tool_use_id.to_string()));
        }
        if self.pending_results.iter().any(|(id, _)| id == tool_use_id) {
            return Err(ConversationError::DuplicateToolResult(tool_use_id.to_string()));
        }
        self.pending_results.push((tool_use_id.to_string(), outcome));
        Ok(())
    }

    /// Deliver the recorded tool results as the next user message.
    ///
    /// Results come first; an attachment, when given, follows them together
    /// with [`ATTACHMENT_NOTE`].
    pub fn flush_tool_results(
        &mut self,
        attachment: Option<&Attachment>,
    ) -> Result<(), ConversationError> {
        let expected = self.unanswered_tool_use_ids()?;
        let missing: Vec<String> = expected
            .into_iter()
            .filter(|id| !self.pending_results.iter().any(|(done, _)| done == id))
            .collect();
        if !missing.is_empty() {
            return Err(ConversationError::MissingToolResults(missing));
        }

        let mut content: Vec<ContentBlock> = self
            .pending_results
            .drain(..)
            .map(|(id, outcome)| outcome.into_block(id))
            .collect();
        if let Some(attachment) = attachment {
            content.push(attachment.to_content_block());
            content.push(ContentBlock::text(ATTACHMENT_NOTE));
        }

        self.messages.push(Message::new(Role::User, content));
        Ok(())
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }

    pub fn is_turn_open(&self) -> bool {
        self.open_turn.is_some()
    }

    /// Tool-use IDs of the last message, which must be a committed assistant
    /// turn.
    fn unanswered_tool_use_ids(&self) -> Result<Vec<String>, ConversationError> {
        if self.open_turn.is_some() {
            return Err(ConversationError::TurnAlreadyOpen);
        }
        match self.messages.last() {
            Some(last) if last.role == Role::Assistant && last.has_tool_use() => Ok(last
                .tool_use_ids()
                .into_iter()
                .map(str::to_string)
                .collect()),
            _ => Err(ConversationError::ResultsWithoutToolUse),
        }
    }

    fn ensure_tool_uses_answered(&self) -> Result<(), ConversationError> {
        match self.messages.last() {
            Some(last) if last.role == Role::Assistant && last.has_tool_use() => Err(
                ConversationError::UnansweredToolUses(
                    last.tool_use_ids().into_iter().map(str::to_string).collect(),
                ),
            ),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_tool_turn(ids: &[&str]) -> ConversationState {
        let mut state = ConversationState::new();
        state.append_user_message("How big is this field?", &[]).unwrap();
        state.begin_assistant_turn().unwrap();
        state.append_text_fragment("Let me ").unwrap();
        state.append_text_fragment("measure it.").unwrap();
        for id in ids {
            state
                .append_tool_use(*id, "calculate_area", serde_json::json!({}))
                .unwrap();
        }
        state.commit_assistant_turn().unwrap();
        state
    }

    #[test]
    fn assistant_turn_keeps_block_order() {
        let mut state = ConversationState::new();
        state.append_user_message("hi", &[]).unwrap();
        state.begin_assistant_turn().unwrap();
        state.append_text_fragment("First").unwrap();
        state.close_text_segment().unwrap();
        state
            .append_tool_use("toolu_1", "calculate_area", serde_json::json!({}))
            .unwrap();
        state.append_text_fragment("Then").unwrap();
        state.commit_assistant_turn().unwrap();

        let assistant = &state.messages()[1];
        assert_eq!(assistant.role, Role::Assistant);
        assert!(matches!(&assistant.content[0], ContentBlock::Text { text } if text == "First"));
        assert!(matches!(&assistant.content[1], ContentBlock::ToolUse { id, .. } if id == "toolu_1"));
        assert!(matches!(&assistant.content[2], ContentBlock::Text { text } if text == "Then"));
    }

    #[test]
    fn text_fragments_concatenate_into_one_block() {
        let state = with_tool_turn(&["toolu_1"]);
        let assistant = &state.messages()[1];
        assert!(matches!(&assistant.content[0], ContentBlock::Text { text } if text == "Let me measure it."));
    }

    #[test]
    fn results_pair_one_to_one_with_tool_uses() {
        let mut state = with_tool_turn(&["toolu_a", "toolu_b"]);
        state
            .record_tool_result("toolu_b", ToolOutcome::Failure("Tool not found: x".into()))
            .unwrap();
        state
            .record_tool_result("toolu_a", ToolOutcome::Success(serde_json::json!({"ok": true})))
            .unwrap();
        state.flush_tool_results(None).unwrap();

        let results = &state.messages()[2];
        assert_eq!(results.role, Role::User);
        assert_eq!(results.tool_result_ids(), vec!["toolu_b", "toolu_a"]);
        assert!(matches!(
            &results.content[0],
            ContentBlock::ToolResult { is_error: true, content, .. } if content == "Tool not found: x"
        ));
        assert!(matches!(
            &results.content[1],
            ContentBlock::ToolResult { is_error: false, content, .. } if content == r#"{"ok":true}"#
        ));
    }

    #[test]
    fn flush_refuses_missing_results() {
        let mut state = with_tool_turn(&["toolu_a", "toolu_b"]);
        state
            .record_tool_result("toolu_a", ToolOutcome::Success(serde_json::json!(1)))
            .unwrap();
        assert_eq!(
            state.flush_tool_results(None),
            Err(ConversationError::MissingToolResults(vec!["toolu_b".into()]))
        );
    }

    #[test]
    fn unknown_and_duplicate_results_rejected() {
        let mut state = with_tool_turn(&["toolu_a"]);
        assert_eq!(
            state.record_tool_result("toolu_z", ToolOutcome::Failure("x".into())),
            Err(ConversationError::UnknownToolUse("toolu_z".into()))
        );
        state
            .record_tool_result("toolu_a", ToolOutcome::Failure("x".into()))
            .unwrap();
        assert_eq!(
            state.record_tool_result("toolu_a", ToolOutcome::Failure("y".into())),
            Err(ConversationError::DuplicateToolResult("toolu_a".into()))
        );
    }

    #[test]
    fn results_require_committed_tool_turn() {
        let mut state = ConversationState::new();
        state.append_user_message("hi", &[]).unwrap();
        assert_eq!(
            state.record_tool_result("toolu_a", ToolOutcome::Failure("x".into())),
            Err(ConversationError::ResultsWithoutToolUse)
        );

        state.begin_assistant_turn().unwrap();
        state
            .append_tool_use("toolu_a", "calculate_area", serde_json::json!({}))
            .unwrap();
        assert_eq!(
            state.record_tool_result("toolu_a", ToolOutcome::Failure("x".into())),
            Err(ConversationError::TurnAlreadyOpen)
        );
    }

    #[test]
    fn cannot_skip_tool_results() {
        let mut state = with_tool_turn(&["toolu_a"]);
        assert!(matches!(
            state.append_user_message("next question", &[]),
            Err(ConversationError::UnansweredToolUses(_))
        ));
        assert!(matches!(
            state.begin_assistant_turn(),
            Err(ConversationError::UnansweredToolUses(_))
        ));
    }

    #[test]
    fn turn_lifecycle_errors() {
        let mut state = ConversationState::new();
        assert_eq!(
            state.append_text_fragment("x"),
            Err(ConversationError::NoOpenTurn)
        );
        assert_eq!(state.commit_assistant_turn(), Err(ConversationError::NoOpenTurn));
        state.begin_assistant_turn().unwrap();
        assert_eq!(state.begin_assistant_turn(), Err(ConversationError::TurnAlreadyOpen));
        assert_eq!(
            state.append_user_message("x", &[]),
            Err(ConversationError::TurnAlreadyOpen)
        );
    }

    #[test]
    fn empty_turn_commits_nothing() {
        let mut state = ConversationState::new();
        state.append_user_message("hi", &[]).unwrap();
        state.begin_assistant_turn().unwrap();
        state.commit_assistant_turn().unwrap();
        assert_eq!(state.messages().len(), 1);
        assert!(!state.is_turn_open());
    }

    #[test]
    fn attachment_follows_results_with_note() {
        let mut state = with_tool_turn(&["toolu_shot"]);
        state
            .record_tool_result("toolu_shot", ToolOutcome::Success(serde_json::json!({"captured": true})))
            .unwrap();
        let shot = Attachment::new("image/png", "iVBORw0KGgo=");
        state.flush_tool_results(Some(&shot)).unwrap();

        let content = &state.messages()[2].content;
        assert_eq!(content.len(), 3);
        assert!(matches!(content[0], ContentBlock::ToolResult { .. }));
        assert!(matches!(content[1], ContentBlock::Image { .. }));
        assert!(matches!(&content[2], ContentBlock::Text { text } if text == ATTACHMENT_NOTE));
    }

    #[test]
    fn initial_message_may_carry_attachments() {
        let mut state = ConversationState::new();
        let shot = Attachment::new("image/jpeg", "/9j/4AAQ");
        state.append_user_message("What is this?", &[shot]).unwrap();
        let content = &state.messages()[0].content;
        assert!(matches!(content[0], ContentBlock::Text { .. }));
        assert!(matches!(content[1], ContentBlock::Image { .. }));
    }
}
