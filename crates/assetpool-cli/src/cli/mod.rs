//! CLI for the assetpool remote asset cache.

mod commands;

use anyhow::Result;
use assetpool_core::config;
use assetpool_core::site::SiteInfo;
use clap::{Args, Parser, Subcommand};

use commands::{run_probe, run_resolve, run_rewrite, run_status, ResolveArgs};

/// Top-level CLI for assetpool.
#[derive(Debug, Parser)]
#[command(name = "assetpool")]
#[command(about = "assetpool: rewrite, probe and cache learning-site file URLs", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

/// The site a URL belongs to.
#[derive(Debug, Clone, Args)]
pub struct SiteArgs {
    /// Site base URL, e.g. https://school.example.com
    #[arg(long)]
    pub site_url: String,
    /// Web service token.
    #[arg(long, default_value = "")]
    pub token: String,
    /// Per-user access key for token-path URLs.
    #[arg(long)]
    pub access_key: Option<String>,
    /// Site identifier used for cache paths.
    #[arg(long, default_value = "default")]
    pub site_id: String,
}

impl SiteArgs {
    pub fn to_site_info(&self) -> SiteInfo {
        SiteInfo {
            id: self.site_id.clone(),
            url: self.site_url.clone(),
            token: self.token.clone(),
            access_key: self.access_key.clone(),
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Print the fetchable form of a file URL (no network).
    Rewrite {
        url: String,
        #[command(flatten)]
        site: SiteArgs,
        /// Use the token-query form even when an access key is given.
        #[arg(long)]
        legacy: bool,
    },

    /// Check whether the site serves token-path URLs.
    Probe {
        /// A plugin-file URL of the site.
        url: String,
        #[command(flatten)]
        site: SiteArgs,
    },

    /// Resolve a URL through the local cache, downloading per policy.
    Resolve(ResolveArgs),

    /// Show cached files.
    Status,
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Rewrite { url, site, legacy } => run_rewrite(&url, &site, legacy),
            CliCommand::Probe { url, site } => run_probe(&url, &site, &cfg).await?,
            CliCommand::Resolve(args) => run_resolve(&args, &cfg).await?,
            CliCommand::Status => run_status()?,
        }

        Ok(())
    }
}
