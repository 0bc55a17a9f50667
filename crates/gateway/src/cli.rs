//! Command-line surface: `serve` (default), `doctor`, and `config`
//! inspection subcommands.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use presence_domain::config::{Config, ConfigSeverity};

#[derive(Parser, Debug)]
#[command(name = "presence-gateway", about = "Presence and room orchestrator")]
pub struct Cli {
    /// Path to the TOML config file.
    #[arg(long, global = true, default_value = "presence.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the gateway (default if no subcommand is given).
    Serve,
    /// Check Registry reachability and config validity without serving.
    Doctor,
    /// Inspect the effective configuration.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration as JSON.
    Show,
    /// Validate the configuration and exit non-zero on error.
    Validate,
}

pub fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    Config::load_from_file(&cli.config).map_err(|e| anyhow::anyhow!("loading config: {e}"))
}

/// `config validate`: prints every issue, exits with an error if any are
/// `ConfigSeverity::Error`.
pub fn run_config_validate(config: &Config) -> anyhow::Result<()> {
    let issues = config.validate();
    for issue in &issues {
        println!("{issue}");
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!("configuration has {} error(s)", issues.iter().filter(|i| i.severity == ConfigSeverity::Error).count());
    }
    Ok(())
}

pub fn run_config_show(config: &Config) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}

/// `doctor`: validates config, then attempts to reach the Registry's
/// `/offices` endpoint (best-effort connectivity check).
pub async fn run_doctor(config: &Config) -> anyhow::Result<()> {
    let issues = config.validate();
    if issues.is_empty() {
        println!("config: ok");
    }
    for issue in &issues {
        println!("{issue}");
    }

    match &config.registry.service_url {
        Some(url) => {
            let registry = presence_registry_client::RegistryClient::new(url.clone());
            let offices = registry.list_offices().await;
            println!("registry: reachable, {} office(s) reported", offices.len());
        }
        None => println!("registry: no service_url configured, skipping connectivity check"),
    }

    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!("configuration has errors — see above");
    }
    Ok(())
}
