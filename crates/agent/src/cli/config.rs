use std::path::Path;

use tb_domain::config::{Config, ConfigSeverity};

/// Print every validation issue. Returns `false` when any is an error.
pub fn validate(config: &Config, config_path: &Path) -> bool {
    let issues = config.validate();

    if issues.is_empty() {
        println!(
            "Config OK ({}, {} server(s))",
            config_path.display(),
            config.mcp.servers.len()
        );
        return true;
    }

    let error_count = issues
        .iter()
        .filter(|e| e.severity == ConfigSeverity::Error)
        .count();

    for issue in &issues {
        println!("{issue}");
    }
    println!(
        "\n{} error(s), {} warning(s) in {}",
        error_count,
        issues.len() - error_count,
        config_path.display(),
    );

    error_count == 0
}

/// Resolved config (defaults and env overrides applied) as TOML.
pub fn show(config: &Config) -> anyhow::Result<String> {
    toml::to_string_pretty(config).map_err(|e| anyhow::anyhow!("serializing config: {e}"))
}
