//! `labprompt doctor`: Diagnose system health.

use labprompt_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("LaBPrompT Doctor: System Diagnostics");
    println!("=====================================\n");

    let mut issues = 0;

    let config_path = AppConfig::config_dir().join("config.toml");
    if config_path.exists() {
        println!("  ✅ Config file found: {}", config_path.display());
    } else {
        println!("  ⚠️  No config file, using defaults (`labprompt config > {}`)", config_path.display());
    }

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            println!("  ❌ Config file invalid: {e}");
            return Ok(());
        }
    };

    match config.validate() {
        Ok(()) => println!("  ✅ Config values valid"),
        Err(e) => {
            println!("  ❌ {e}");
            issues += 1;
        }
    }

    if config.has_api_key() {
        println!("  ✅ Provider API key configured");
        match labprompt_providers::build_from_config(&config) {
            Ok(provider) => match provider.health_check().await {
                Ok(true) => println!("  ✅ Provider '{}' reachable", provider.name()),
                Ok(false) => {
                    println!("  ❌ Provider '{}' answered but is unhealthy", provider.name());
                    issues += 1;
                }
                Err(e) => {
                    println!("  ❌ Provider '{}' unreachable: {e}", provider.name());
                    issues += 1;
                }
            },
            Err(e) => {
                println!("  ❌ {e}");
                issues += 1;
            }
        }
    } else {
        println!("  ⚠️  No API key configured, set LABPROMPT_API_KEY or GEMINI_API_KEY");
        issues += 1;
    }

    if config.backend.is_configured() {
        println!("  ✅ Hosted backend configured (admin routes enabled)");
    } else {
        println!("  ⚠️  No hosted backend, usage is kept in memory, admin routes disabled");
    }

    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
