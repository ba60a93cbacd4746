//! `labprompt serve`: Start the HTTP API server.

use labprompt_config::AppConfig;

pub async fn run(port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    config
        .validate()
        .map_err(|e| format!("Invalid configuration: {e}"))?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    println!("LaBPrompT API");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Provider:  {} ({})", config.provider.name, config.provider.model);
    println!(
        "   Backend:   {}",
        if config.backend.is_configured() {
            "hosted"
        } else {
            "none (in-process usage, admin routes disabled)"
        }
    );
    if !config.has_api_key() {
        println!("   Warning:   no provider API key set; model routes will fail");
    }

    labprompt_gateway::start(config).await?;

    Ok(())
}
