//! `ctxloom config`: Configuration management commands.

use ctxloom_config::AppConfig;

/// Configuration is validated while loading; this reports what was loaded.
pub fn validate(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    config.validate()?;
    println!("Configuration is valid");
    println!();
    println!("  Max input tokens:     {}", config.limits.max_input_tokens);
    println!("  Max retrieved chunks: {}", config.limits.max_retrieved_chunks);
    println!(
        "  Max concurrent/doc:   {}",
        config.limits.max_concurrent_by_document
    );
    println!(
        "  Prefix cache keys:    {}",
        config.limits.stable_prefix_cache_capacity
    );
    println!("  Total budget:         {}", config.budget.total_budget_tokens);
    println!(
        "  Inspect roles:        {}",
        config.inspect.allowed_roles.join(", ")
    );
    println!(
        "  Logging:              {} ({})",
        config.logging.level, config.logging.format
    );
    Ok(())
}

pub fn show(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", config.to_toml()?);
    Ok(())
}

pub fn path() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = AppConfig::config_dir().join("config.toml");
    println!("{}", config_path.display());
    Ok(())
}
