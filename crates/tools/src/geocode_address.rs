//! Forward geocoding against a Nominatim-compatible search endpoint.

use async_trait::async_trait;
use fieldagent_config::GeocoderConfig;
use fieldagent_core::context::ExecutionContext;
use fieldagent_core::error::ToolError;
use fieldagent_core::tool::Tool;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_LIMIT: u64 = 3;
const MAX_LIMIT: u64 = 10;

pub struct GeocodeAddressTool {
    client: reqwest::Client,
    base_url: String,
}

impl GeocodeAddressTool {
    pub fn new(config: &GeocoderConfig) -> Result<Self, ToolError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ToolError::Unavailable(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

/// One match, normalised from the service's string-typed coordinates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeocodeMatch {
    pub display_name: String,
    pub lat: f64,
    pub lng: f64,
}

#[derive(Deserialize)]
struct NominatimPlace {
    display_name: String,
    lat: String,
    lon: String,
}

/// Parse a Nominatim `jsonv2` search response.
///
/// Entries whose coordinates don't parse are skipped rather than failing the
/// whole lookup.
pub fn parse_results(body: &str) -> Result<Vec<GeocodeMatch>, ToolError> {
    let places: Vec<NominatimPlace> = serde_json::from_str(body).map_err(|e| {
        ToolError::ExecutionFailed {
            tool_name: "geocode_address".into(),
            reason: format!("unexpected geocoder response: {e}"),
        }
    })?;

    Ok(places
        .into_iter()
        .filter_map(|p| {
            Some(GeocodeMatch {
                lat: p.lat.parse().ok()?,
                lng: p.lon.parse().ok()?,
                display_name: p.display_name,
            })
        })
        .collect())
}

#[async_trait]
impl Tool for GeocodeAddressTool {
    fn name(&self) -> &str {
        "geocode_address"
    }

    fn description(&self) -> &str {
        "Find the coordinates of an address or place name. Returns the best matches with display name, latitude, and longitude."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "address": {
                    "type": "string",
                    "description": "Free-form address or place name"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of matches (default: 3, max: 10)",
                    "default": DEFAULT_LIMIT
                }
            },
            "required": ["address"]
        })
    }

    async fn execute(
        &self,
        input: serde_json::Value,
        _ctx: &ExecutionContext,
    ) -> Result<serde_json::Value, ToolError> {
        let address = input["address"]
            .as_str()
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'address' argument".into()))?;
        let limit = input["limit"]
            .as_u64()
            .unwrap_or(DEFAULT_LIMIT)
            .clamp(1, MAX_LIMIT);

        let url = format!("{}/search", self.base_url);
        let limit_param = limit.to_string();
        tracing::debug!(%url, address, limit, "Geocoding");

        let response = self
            .client
            .get(&url)
            .query(&[
                ("q", address),
                ("format", "jsonv2"),
                ("limit", limit_param.as_str()),
            ])
            .send()
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: self.name().into(),
                reason: format!("geocoder request failed: {e}"),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| ToolError::ExecutionFailed {
            tool_name: self.name().into(),
            reason: format!("failed to read geocoder response: {e}"),
        })?;
        if !status.is_success() {
            return Err(ToolError::ExecutionFailed {
                tool_name: self.name().into(),
                reason: format!("geocoder returned HTTP {}", status.as_u16()),
            });
        }

        let matches = parse_results(&body)?;
        Ok(serde_json::json!({
            "query": address,
            "count": matches.len(),
            "matches": matches,
        }))
    }
}
