pub mod commands;
pub mod utils;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

use crate::config::ClientConfig;
use crate::tenant::TenantContext;

/// Stateless front end over [`crate::ApiClient`]; every setting comes from
/// the environment (`STUDIO_*`, `.env`) or the command line
#[derive(Parser)]
#[command(name = "studio")]
#[command(about = "Studio CLI - Command-line client for the studio platform API")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Output in human-readable text format")]
    pub text: bool,

    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Send an authenticated request to the API")]
    Request(commands::request::RequestArgs),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_cli(cli: &Cli) -> Self {
        if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let output_format = OutputFormat::from_cli(&cli);

    match cli.command {
        Commands::Request(args) => {
            commands::request::handle(args, crate::config::config(), output_format).await
        }
    }
}

/// Tenant from the flag, else `STUDIO_TENANT`
pub fn resolve_tenant(
    provided: Option<String>,
    client_config: &ClientConfig,
) -> anyhow::Result<Option<TenantContext>> {
    let slug = provided.or_else(|| client_config.api.default_tenant.clone());
    Ok(slug.map(TenantContext::new).transpose()?)
}
