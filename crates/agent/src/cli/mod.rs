pub mod config;
pub mod session;

use clap::{Parser, Subcommand};

/// Tidemark: session tracking for a client-side telemetry agent.
#[derive(Debug, Parser)]
#[command(name = "tidemark", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the agent (default when no subcommand is given).  Every line read
    /// from stdin counts as one user activity signal.
    Run,
    /// Start or resume the session once and print its metadata.
    Touch {
        /// Print the metadata as JSON instead of plain text.
        #[arg(long)]
        json: bool,
    },
    /// Print the persisted session record.
    Show,
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

/// Load the configuration from the path in `TM_CONFIG` (or `tidemark.toml`
/// by default).  A missing file yields the defaults.  Returns the parsed
/// [`Config`](tm_domain::config::Config) and the path that was used.
pub fn load_config() -> anyhow::Result<(tm_domain::config::Config, String)> {
    let config_path =
        std::env::var("TM_CONFIG").unwrap_or_else(|_| "tidemark.toml".into());
    let config = load_config_from(&config_path)?;
    Ok((config, config_path))
}

pub fn load_config_from(config_path: &str) -> anyhow::Result<tm_domain::config::Config> {
    if !std::path::Path::new(config_path).exists() {
        return Ok(tm_domain::config::Config::default());
    }

    let raw = std::fs::read_to_string(config_path)
        .map_err(|e| anyhow::anyhow!("reading {config_path}: {e}"))?;
    toml::from_str(&raw).map_err(|e| anyhow::anyhow!("parsing {config_path}: {e}"))
}
