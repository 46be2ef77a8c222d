//! `fieldagent tools`: list the tools the agent can call.

use fieldagent_config::AppConfig;

pub async fn run(json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let registry = fieldagent_tools::mapping_registry(&config.geocoder)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&registry.definitions())?);
        return Ok(());
    }

    println!();
    for tool in registry.list() {
        let schema = tool.input_schema();
        let required: Vec<&str> = schema["required"]
            .as_array()
            .map(|r| r.iter().filter_map(|v| v.as_str()).collect())
            .unwrap_or_default();
        let marker = if tool.attaches_context_payload() { " [attaches screenshot]" } else { "" };

        println!("  {}{marker}", tool.name());
        println!("    {}", tool.description());
        if !required.is_empty() {
            println!("    required: {}", required.join(", "));
        }
        println!();
    }
    Ok(())
}
