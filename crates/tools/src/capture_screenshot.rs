//! Hands the caller's map screenshot to the model.
//!
//! The handler only acknowledges; the image itself is attached by the agent
//! loop to the next user message, after the tool results.

use async_trait::async_trait;
use fieldagent_core::context::ExecutionContext;
use fieldagent_core::error::ToolError;
use fieldagent_core::tool::Tool;

pub struct CaptureScreenshotTool;

#[async_trait]
impl Tool for CaptureScreenshotTool {
    fn name(&self) -> &str {
        "capture_screenshot"
    }

    fn description(&self) -> &str {
        "Look at the current map view. The screenshot is shown to you right after this tool's result. Use it to identify visible features, land cover, or structures."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "reason": {
                    "type": "string",
                    "description": "What you want to look for in the screenshot"
                }
            }
        })
    }

    fn attaches_context_payload(&self) -> bool {
        true
    }

    async fn execute(
        &self,
        input: serde_json::Value,
        ctx: &ExecutionContext,
    ) -> Result<serde_json::Value, ToolError> {
        let attachment = ctx.attachment.as_ref().ok_or_else(|| {
            ToolError::Unavailable(
                "no map screenshot is available; ask the user to capture the map view".into(),
            )
        })?;

        tracing::debug!(
            media_type = %attachment.media_type,
            bytes = attachment.decoded_len(),
            reason = input["reason"].as_str().unwrap_or_default(),
            "Screenshot requested"
        );

        Ok(serde_json::json!({
            "captured": true,
            "media_type": attachment.media_type,
            "bytes": attachment.decoded_len(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldagent_core::context::Attachment;

    #[tokio::test]
    async fn acknowledges_available_screenshot() {
        let ctx = ExecutionContext::new().with_attachment(Attachment::new("image/png", "iVBORw0KGgo="));
        let out = CaptureScreenshotTool
            .execute(serde_json::json!({"reason": "check roof"}), &ctx)
            .await
            .unwrap();
        assert_eq!(out["captured"], true);
        assert_eq!(out["media_type"], "image/png");
        assert_eq!(out["bytes"], 8);
        assert!(out.get("data").is_none());
    }

    #[tokio::test]
    async fn fails_without_screenshot() {
        let err = CaptureScreenshotTool
            .execute(serde_json::json!({}), &ExecutionContext::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Unavailable(_)));
    }

    #[test]
    fn is_payload_bearing() {
        assert!(CaptureScreenshotTool.attaches_context_payload());
    }
}
