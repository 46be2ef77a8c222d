//! Per-turn decoding scratch.
//!
//! Built fresh for every request/response turn and dropped at its end. Tool
//! input arrives as raw JSON fragments keyed by content-block index; they are
//! only parsed once the block closes.

use std::collections::HashMap;

/// A tool-use block that has closed.
#[derive(Debug, Clone, PartialEq)]
pub struct ClosedToolUse {
    pub id: String,
    pub name: String,

    /// Parsed input, or the parse error message
    pub input: Result<serde_json::Value, String>,
}

impl ClosedToolUse {
    /// The input as recorded in history; unparseable input becomes `{}`.
    pub fn input_for_history(&self) -> serde_json::Value {
        match &self.input {
            Ok(value) => value.clone(),
            Err(_) => serde_json::Value::Object(Default::default()),
        }
    }
}

#[derive(Debug)]
struct OpenToolUse {
    id: String,
    name: String,
    input_json: String,
}

#[derive(Debug, Default)]
pub struct TurnScratch {
    open: HashMap<usize, OpenToolUse>,
    closed: Vec<ClosedToolUse>,
}

impl TurnScratch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_tool_use(&mut self, index: usize, id: String, name: String) {
        if let Some(previous) = self.open.insert(
            index,
            OpenToolUse {
                id,
                name,
                input_json: String::new(),
            },
        ) {
            tracing::warn!(index, tool = %previous.name, "Tool-use block reopened before it closed");
        }
    }

    /// Whether a tool use with this id was already opened in this turn.
    pub fn knows_id(&self, id: &str) -> bool {
        self.open.values().any(|open| open.id == id) || self.closed.iter().any(|c| c.id == id)
    }

    /// Append a raw input fragment. Fragments for unknown blocks are ignored.
    pub fn push_input(&mut self, index: usize, fragment: &str) {
        match self.open.get_mut(&index) {
            Some(open) => open.input_json.push_str(fragment),
            None => tracing::debug!(index, "Input fragment for a block that is not a tool use"),
        }
    }

    /// Close the block at `index`. Returns the tool use if it was one.
    pub fn close(&mut self, index: usize) -> Option<&ClosedToolUse> {
        let open = self.open.remove(&index)?;
        let input = parse_input(&open.input_json);
        self.closed.push(ClosedToolUse {
            id: open.id,
            name: open.name,
            input,
        });
        self.closed.last()
    }

    /// Tool uses in the order their blocks closed.
    ///
    /// Blocks still open when the turn ended are dropped.
    pub fn finish(self) -> Vec<ClosedToolUse> {
        for open in self.open.values() {
            tracing::warn!(tool = %open.name, id = %open.id, "Discarding tool use that never closed");
        }
        self.closed
    }
}

/// Parse concatenated input fragments. No fragments at all means `{}`.
fn parse_input(raw: &str) -> Result<serde_json::Value, String> {
    if raw.trim().is_empty() {
        return Ok(serde_json::Value::Object(Default::default()));
    }
    serde_json::from_str(raw).map_err(|e| format!("Invalid tool input JSON: {e}"))
}
