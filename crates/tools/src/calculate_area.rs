//! Polygon area on the WGS84 sphere.
//!
//! Takes the vertices from the call input, or from the coordinates the user
//! drew (carried in the execution context) when the model omits them.

use async_trait::async_trait;
use fieldagent_core::context::ExecutionContext;
use fieldagent_core::error::ToolError;
use fieldagent_core::tool::Tool;

use crate::geometry::{self, AreaMeasurement};

pub struct CalculateAreaTool;

#[async_trait]
impl Tool for CalculateAreaTool {
    fn name(&self) -> &str {
        "calculate_area"
    }

    fn description(&self) -> &str {
        "Calculate the area of a polygon from its vertices. Returns square meters, square kilometers, acres, and square miles. If no coordinates are given, uses the polygon the user drew on the map."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "coordinates": {
                    "type": "array",
                    "description": "Polygon vertices in order; the ring is closed automatically",
                    "items": {
                        "type": "object",
                        "properties": {
                            "lat": { "type": "number" },
                            "lng": { "type": "number" }
                        },
                        "required": ["lat", "lng"]
                    }
                }
            }
        })
    }

    async fn execute(
        &self,
        input: serde_json::Value,
        ctx: &ExecutionContext,
    ) -> Result<serde_json::Value, ToolError> {
        let coords = match input.get("coordinates") {
            Some(value) if !value.is_null() => geometry::parse_coordinates(value)?,
            _ => geometry::validate_coordinates(ctx.coordinates.clone())?,
        };
        let ring = geometry::open_ring(coords);

        let square_meters = geometry::polygon_area(&ring)?;
        tracing::debug!(vertices = ring.len(), square_meters, "Computed polygon area");

        Ok(serde_json::json!({
            "area": AreaMeasurement::from_square_meters(square_meters),
            "vertex_count": ring.len(),
        }))
    }
}
