//! `labprompt config`: Configuration management commands.

use labprompt_config::AppConfig;

pub async fn print_default() -> Result<(), Box<dyn std::error::Error>> {
    print!("{}", AppConfig::default_toml());
    Ok(())
}

pub async fn validate() -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Validating configuration...");

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            println!("   ❌ Config error: {e}");
            return Err(e.into());
        }
    };
    println!("   ✅ Config parsed successfully");

    if let Err(e) = config.validate() {
        println!("   ❌ {e}");
        return Err(e.into());
    }

    let mut warnings = Vec::new();
    if !config.has_api_key() {
        warnings.push("No API key set (set LABPROMPT_API_KEY or GEMINI_API_KEY)");
    }
    if config.gateway.host == "0.0.0.0" && config.gateway.rate_limit_per_minute == 0 {
        warnings.push("Gateway bound to 0.0.0.0 with rate limiting disabled");
    }
    if config.backend.url.is_some() != config.backend.service_role_key.is_some() {
        warnings.push("backend.url and backend.service_role_key must be set together");
    }

    if warnings.is_empty() {
        println!("   ✅ All checks passed");
    } else {
        println!();
        for w in &warnings {
            println!("   ⚠️  {w}");
        }
    }

    println!();
    println!("   Provider:  {}", config.provider.name);
    println!("   Model:     {}", config.provider.model);
    println!(
        "   Gateway:   {}:{}",
        config.gateway.host, config.gateway.port
    );
    println!(
        "   Quota:     {}",
        if config.quota.enabled { "enabled" } else { "disabled" }
    );

    Ok(())
}

pub async fn show() -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    redact_secrets(&mut config);
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

pub async fn path() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = AppConfig::config_dir().join("config.toml");
    println!("{}", config_path.display());
    Ok(())
}

fn redact_secrets(config: &mut AppConfig) {
    let redacted = || Some("[REDACTED]".to_string());
    if config.provider.api_key.is_some() {
        config.provider.api_key = redacted();
    }
    if config.backend.service_role_key.is_some() {
        config.backend.service_role_key = redacted();
    }
    if config.backend.anon_key.is_some() {
        config.backend.anon_key = redacted();
    }
}
