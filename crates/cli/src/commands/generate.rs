//! `labprompt generate`: Expand a brief into a master prompt.

use std::path::Path;

use labprompt_config::AppConfig;
use labprompt_core::prompt::{GeneratedPrompt, PromptData};
use labprompt_gateway::service::{PromptService, SYSTEM_CALLER};

/// Parse a brief from JSON text.
pub fn parse_brief(json: &str) -> Result<PromptData, serde_json::Error> {
    serde_json::from_str(json)
}

pub async fn run(file: &Path, output: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    if !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    LABPROMPT_API_KEY, GEMINI_API_KEY or GOOGLE_API_KEY");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let content = std::fs::read_to_string(file)
        .map_err(|e| format!("Failed to read {}: {e}", file.display()))?;
    let brief = parse_brief(&content).map_err(|e| format!("Invalid brief JSON: {e}"))?;

    let provider = labprompt_providers::build_from_config(&config)?;
    let service = PromptService::from_config(&config, provider);
    let generated = service.generate(SYSTEM_CALLER, &brief).await?;

    emit(&generated, output)
}

fn emit(generated: &GeneratedPrompt, output: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(warning) = &generated.warning {
        eprintln!("warning: {warning}");
    }
    match output {
        Some(path) => {
            std::fs::write(path, &generated.text)?;
            eprintln!(
                "Wrote {} prompt ({} chars) to {}",
                generated.format,
                generated.text.chars().count(),
                path.display()
            );
        }
        None => println!("{}", generated.text),
    }
    Ok(())
}
