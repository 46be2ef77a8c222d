//! `fieldagent run`: single-question mode with streamed output.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::Engine;
use fieldagent_agent::MappingOrchestrator;
use fieldagent_config::AppConfig;
use fieldagent_core::agent::{Agent, AgentRequest};
use fieldagent_core::chunk::ChunkKind;
use fieldagent_core::context::{Attachment, Coordinate, ExecutionContext};
use fieldagent_providers::AnthropicProvider;

pub struct RunArgs {
    pub message: String,
    pub coords: Option<String>,
    pub image: Option<PathBuf>,
    pub plan: Option<String>,
    pub json: bool,
}

pub async fn run(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    let Some(api_key) = config.api_key.clone() else {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    export ANTHROPIC_API_KEY='sk-ant-...'");
        eprintln!("    export FIELDAGENT_API_KEY='sk-ant-...'");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    };

    let ctx = build_context(args.coords.as_deref(), args.image.as_deref(), args.plan)?;
    tracing::debug!(
        coordinates = ctx.coordinates.len(),
        attachment = ctx.has_attachment(),
        model = %config.model,
        "Built execution context"
    );

    let provider = AnthropicProvider::new(api_key)?.with_base_url(config.base_url.clone());
    let agent = MappingOrchestrator::new(Arc::new(provider), &config)?;

    if !agent.can_execute(&ctx) {
        return Err(format!("{} is not available on this plan", agent.name()).into());
    }

    let mut stream = agent
        .stream(AgentRequest::new(args.message).with_context(ctx))
        .await;

    let mut stdout = std::io::stdout();
    let mut failed = None;
    while let Some(chunk) = stream.recv().await {
        if args.json {
            writeln!(stdout, "{}", serde_json::to_string(&chunk)?)?;
            if let ChunkKind::Error { message } = &chunk.kind {
                failed = Some(message.clone());
            }
            continue;
        }

        match chunk.kind {
            ChunkKind::Content { content } => {
                write!(stdout, "{content}")?;
                stdout.flush()?;
            }
            ChunkKind::ToolCall { name, result, .. } => {
                eprintln!();
                eprintln!("  [tool] {name}: {}", summarize(&name, &result));
            }
            ChunkKind::Metadata { .. } => {}
            ChunkKind::Error { message } => {
                eprintln!();
                failed = Some(message);
            }
            ChunkKind::Complete { metadata } => {
                writeln!(stdout)?;
                eprintln!(
                    "  ({} turn(s), {} tool call(s))",
                    metadata.get("turns").and_then(|v| v.as_u64()).unwrap_or(0),
                    metadata.get("tool_calls").and_then(|v| v.as_u64()).unwrap_or(0),
                );
            }
        }
    }

    match failed {
        Some(message) => Err(format!("Agent failed: {message}").into()),
        None => Ok(()),
    }
}

/// Build the execution context from command-line inputs.
pub fn build_context(
    coords: Option<&str>,
    image: Option<&Path>,
    plan: Option<String>,
) -> Result<ExecutionContext, Box<dyn std::error::Error>> {
    let mut ctx = ExecutionContext::new();
    if let Some(coords) = coords {
        ctx = ctx.with_coordinates(parse_coords(coords)?);
    }
    if let Some(path) = image {
        ctx = ctx.with_attachment(load_attachment(path)?);
    }
    if let Some(plan) = plan {
        ctx = ctx.with_value("plan", plan.into());
    }
    Ok(ctx)
}

/// Parse `"lat,lng;lat,lng;..."`. Empty segments (a trailing `;`) are skipped.
pub fn parse_coords(input: &str) -> Result<Vec<Coordinate>, String> {
    input
        .split(';')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .enumerate()
        .map(|(i, pair)| {
            let (lat, lng) = pair
                .split_once(',')
                .ok_or_else(|| format!("point {}: expected \"lat,lng\", got \"{pair}\"", i + 1))?;
            let coordinate = Coordinate::new(
                lat.trim()
                    .parse()
                    .map_err(|_| format!("point {}: invalid latitude \"{}\"", i + 1, lat.trim()))?,
                lng.trim()
                    .parse()
                    .map_err(|_| format!("point {}: invalid longitude \"{}\"", i + 1, lng.trim()))?,
            );
            if !coordinate.is_valid() {
                return Err(format!("point {}: out of range", i + 1));
            }
            Ok(coordinate)
        })
        .collect()
}

pub fn media_type_for(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

pub fn load_attachment(path: &Path) -> Result<Attachment, Box<dyn std::error::Error>> {
    let media_type = media_type_for(path)
        .ok_or_else(|| format!("Unsupported image type: {}", path.display()))?;
    let bytes = std::fs::read(path)
        .map_err(|e| format!("Failed to read image {}: {e}", path.display()))?;
    let data = base64::engine::general_purpose::STANDARD.encode(bytes);
    Ok(Attachment::new(media_type, data))
}

/// One-line human summary of a tool result.
fn summarize(name: &str, result: &serde_json::Value) -> String {
    match name {
        "calculate_area" => format!(
            "{:.0} m² ({:.2} acres)",
            result["area"]["square_meters"].as_f64().unwrap_or_default(),
            result["area"]["acres"].as_f64().unwrap_or_default(),
        ),
        "measure_distance" => format!(
            "{:.3} km",
            result["distance"]["kilometers"].as_f64().unwrap_or_default()
        ),
        "geocode_address" => format!("{} match(es)", result["count"].as_u64().unwrap_or(0)),
        "capture_screenshot" => "screenshot attached".to_string(),
        _ => result.to_string(),
    }
}
