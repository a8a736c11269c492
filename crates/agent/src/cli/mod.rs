pub mod config;
pub mod run;
pub mod tools;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "TB_CONFIG";

/// toolbridge: connect a chat model to MCP tool servers.
#[derive(Debug, Parser)]
#[command(name = "toolbridge", version, about)]
pub struct Cli {
    /// Config file (TOML, or JSON with an `mcpServers` map). Overrides
    /// `TB_CONFIG`; defaults to `config.toml`.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Answer one query, calling tools as the model requests them.
    Run {
        /// The user query.
        query: String,
        /// Request a streamed completion.
        #[arg(long)]
        stream: bool,
        /// Model override (defaults to `llm.model` / `MODEL_NAME`).
        #[arg(long)]
        model: Option<String>,
        /// Maximum model rounds for this query.
        #[arg(long)]
        max_rounds: Option<usize>,
        /// Print the full outcome (transcript, usage) as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Connect to every server and list the merged tool catalog.
    Tools,
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print version information.
    Version,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any errors.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

// ── Config loading helper ─────────────────────────────────────────────

/// Resolve the config path: `--config`, then `TB_CONFIG`, then
/// `config.toml`.
pub fn config_path(flag: Option<PathBuf>) -> PathBuf {
    flag.or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("config.toml"))
}

/// Load the configuration and apply `OPENAI_BASE_URL` / `MODEL_NAME`.
pub fn load_config(flag: Option<PathBuf>) -> anyhow::Result<(tb_domain::config::Config, PathBuf)> {
    let path = config_path(flag);
    let mut config = tb_domain::config::Config::load(&path)
        .with_context(|| format!("loading {}", path.display()))?;
    config.llm.apply_env_overrides();
    Ok((config, path))
}
