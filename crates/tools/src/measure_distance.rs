//! Great-circle distance between points, or along a path.

use async_trait::async_trait;
use fieldagent_core::context::ExecutionContext;
use fieldagent_core::error::ToolError;
use fieldagent_core::tool::Tool;

use crate::geometry;

pub struct MeasureDistanceTool;

#[async_trait]
impl Tool for MeasureDistanceTool {
    fn name(&self) -> &str {
        "measure_distance"
    }

    fn description(&self) -> &str {
        "Measure the great-circle distance along a path of two or more points. Set closed=true to include the leg back to the first point (a perimeter)."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "points": {
                    "type": "array",
                    "description": "Points in travel order",
                    "items": {
                        "type": "object",
                        "properties": {
                            "lat": { "type": "number" },
                            "lng": { "type": "number" }
                        },
                        "required": ["lat", "lng"]
                    },
                    "minItems": 2
                },
                "closed": {
                    "type": "boolean",
                    "description": "Return to the first point at the end (default: false)",
                    "default": false
                }
            },
            "required": ["points"]
        })
    }

    async fn execute(
        &self,
        input: serde_json::Value,
        _ctx: &ExecutionContext,
    ) -> Result<serde_json::Value, ToolError> {
        let points = geometry::parse_coordinates(&input["points"])?;
        if points.len() < 2 {
            return Err(ToolError::InvalidArguments(
                "at least 2 points are required to measure a distance".into(),
            ));
        }
        let closed = input["closed"].as_bool().unwrap_or(false);

        let meters = geometry::path_length(&points, closed);
        let segments = if closed && points.len() > 2 {
            points.len()
        } else {
            points.len() - 1
        };

        Ok(serde_json::json!({
            "distance": {
                "meters": meters,
                "kilometers": meters / 1000.0,
                "miles": meters * geometry::M_TO_MILES,
            },
            "segments": segments,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn two_points() {
        let out = MeasureDistanceTool
            .execute(
                serde_json::json!({"points": [{"lat": 0.0, "lng": 0.0}, {"lat": 0.0, "lng": 1.0}]}),
                &ExecutionContext::new(),
            )
            .await
            .unwrap();
        let km = out["distance"]["kilometers"].as_f64().unwrap();
        assert!((km - 111.19).abs() < 0.1, "got {km}");
        assert_eq!(out["segments"], 1);
    }

    #[tokio::test]
    async fn closed_triangle_counts_return_leg() {
        let out = MeasureDistanceTool
            .execute(
                serde_json::json!({
                    "points": [
                        {"lat": 0.0, "lng": 0.0},
                        {"lat": 0.0, "lng": 0.1},
                        {"lat": 0.1, "lng": 0.0}
                    ],
                    "closed": true
                }),
                &ExecutionContext::new(),
            )
            .await
            .unwrap();
        assert_eq!(out["segments"], 3);
    }

    #[tokio::test]
    async fn single_point_rejected() {
        let err = MeasureDistanceTool
            .execute(
                serde_json::json!({"points": [{"lat": 0.0, "lng": 0.0}]}),
                &ExecutionContext::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
