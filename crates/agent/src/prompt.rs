//! System prompt assembly.
//!
//! The prompt changes with what the caller supplied: a screenshot, drawn
//! coordinates, both, or neither. The hybrid workflow section (visual
//! inspection plus exact computation) is only included when there is
//! something to combine.

use fieldagent_core::context::ExecutionContext;

const BASE_PROMPT: &str = "You are FieldAgent, a mapping assistant. You help people understand land parcels, fields, and places on a map: their size, distances between points, where an address is, and what can be seen from above.

Guidelines:
- Use tools for every number you report. Never estimate an area or distance yourself.
- Report areas in the unit the user asked for; otherwise give square meters and acres.
- If a tool fails, explain what went wrong and what the user can do about it.
- Keep answers short and concrete.";

/// What the caller made available for this request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub has_attachment: bool,
    pub has_coordinates: bool,
    pub coordinate_count: usize,
}

impl Capabilities {
    pub fn from_context(ctx: &ExecutionContext) -> Self {
        Self {
            has_attachment: ctx.has_attachment(),
            has_coordinates: ctx.has_coordinates(),
            coordinate_count: ctx.coordinates.len(),
        }
    }

    pub fn hybrid(&self) -> bool {
        self.has_attachment || self.has_coordinates
    }
}

/// Builder for the system prompt of one `stream()` call.
#[derive(Debug, Clone)]
pub struct SystemPrompt {
    base: String,
    capabilities: Capabilities,
}

impl SystemPrompt {
    pub fn new(capabilities: Capabilities) -> Self {
        Self {
            base: BASE_PROMPT.to_string(),
            capabilities,
        }
    }

    /// Replace the persona and guidelines; capability sections still apply.
    pub fn with_base(mut self, base: impl Into<String>) -> Self {
        self.base = base.into();
        self
    }

    pub fn build(&self) -> String {
        let mut prompt = self.base.clone();

        if self.capabilities.hybrid() {
            prompt.push_str("\n\n## Hybrid workflow\n");
            if self.capabilities.has_coordinates {
                prompt.push_str(&format!(
                    "The user drew a shape with {} points on the map. calculate_area uses it automatically when you call it without coordinates.\n",
                    self.capabilities.coordinate_count
                ));
            }
            if self.capabilities.has_attachment {
                prompt.push_str(
                    "A screenshot of the current map view is available. Call capture_screenshot to look at it.\n",
                );
            }
            prompt.push_str(
                "Combine what you can see with what you can compute: measure with the tools first, then use the image to describe land cover, structures, or boundaries.",
            );
        }

        prompt
    }
}
