//! `assetpool probe` – check token-path support for a site.

use std::sync::Arc;

use anyhow::Result;
use assetpool_core::config::AssetPoolConfig;
use assetpool_core::fetch::{CurlReachability, FetchOptions};
use assetpool_core::probe::{AlwaysOnline, CapabilityProber};
use assetpool_core::site::{Site, TokenPathSupport};

use crate::cli::SiteArgs;

pub async fn run_probe(url: &str, site: &SiteArgs, cfg: &AssetPoolConfig) -> Result<()> {
    let site = Arc::new(Site::new(site.to_site_info()));
    let prober = CapabilityProber::new(
        Arc::new(CurlReachability::new(FetchOptions::from_config(cfg))),
        Arc::new(AlwaysOnline),
    );
    let fixed = site.check_and_fix_url(url, &prober).await;
    let support = match site.token_path_support() {
        TokenPathSupport::Supported => "supported",
        TokenPathSupport::Unsupported => "unsupported",
        TokenPathSupport::Unknown => "unknown",
    };
    println!("token-path: {support}");
    println!("{fixed}");
    Ok(())
}
