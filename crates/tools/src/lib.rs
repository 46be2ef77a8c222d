//! Mapping tools for FieldAgent.
//!
//! Tools give the agent the ability to reason about what the user drew and
//! what they are looking at: measure polygons and paths, resolve addresses
//! to coordinates, and look at the current map screenshot.

pub mod calculate_area;
pub mod capture_screenshot;
pub mod geocode_address;
pub mod geometry;
pub mod measure_distance;

use std::sync::Arc;

use fieldagent_config::GeocoderConfig;
use fieldagent_core::error::ToolError;
use fieldagent_core::tool::ToolRegistry;

pub use calculate_area::CalculateAreaTool;
pub use capture_screenshot::CaptureScreenshotTool;
pub use geocode_address::GeocodeAddressTool;
pub use measure_distance::MeasureDistanceTool;

/// Create the registry used by the mapping orchestrator.
///
/// Registration order is the order the model sees the tools in.
pub fn mapping_registry(geocoder: &GeocoderConfig) -> Result<ToolRegistry, ToolError> {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(CalculateAreaTool))?;
    registry.register(Arc::new(MeasureDistanceTool))?;
    registry.register(Arc::new(GeocodeAddressTool::new(geocoder)?))?;
    registry.register(Arc::new(CaptureScreenshotTool))?;
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldagent_core::context::ExecutionContext;
    use fieldagent_core::tool::ToolCall;

    fn registry() -> ToolRegistry {
        mapping_registry(&GeocoderConfig::default()).unwrap()
    }

    #[test]
    fn registers_tools_in_order() {
        assert_eq!(
            registry().names(),
            vec![
                "calculate_area",
                "measure_distance",
                "geocode_address",
                "capture_screenshot"
            ]
        );
    }

    #[test]
    fn only_screenshot_is_payload_bearing() {
        let registry = registry();
        let bearing: Vec<&str> = registry
            .list()
            .filter(|t| t.attaches_context_payload())
            .map(|t| t.name())
            .collect();
        assert_eq!(bearing, vec!["capture_screenshot"]);
    }

    #[test]
    fn definitions_carry_object_schemas() {
        for def in registry().definitions() {
            assert_eq!(def.input_schema["type"], "object", "{}", def.name);
            assert!(!def.description.is_empty());
        }
    }

    #[tokio::test]
    async fn registry_rejects_missing_required_field() {
        let call = ToolCall {
            id: "toolu_1".into(),
            name: "measure_distance".into(),
            input: serde_json::json!({"closed": true}),
        };
        let err = registry()
            .execute(&call, &ExecutionContext::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
        assert!(err.to_string().contains("points"));
    }

    #[tokio::test]
    async fn area_through_registry() {
        let call = ToolCall {
            id: "toolu_2".into(),
            name: "calculate_area".into(),
            input: serde_json::json!({"coordinates": [
                {"lat": 0.0, "lng": 0.0},
                {"lat": 0.0, "lng": 0.01},
                {"lat": 0.01, "lng": 0.01},
                {"lat": 0.01, "lng": 0.0}
            ]}),
        };
        let out = registry()
            .execute(&call, &ExecutionContext::new())
            .await
            .unwrap();
        assert!(out["area"]["square_meters"].as_f64().unwrap() > 1.2e6);
    }
}
