//! `assetpool resolve` – resolve a URL through the cache.

use std::sync::Arc;

use anyhow::{Context, Result};
use assetpool_core::config::AssetPoolConfig;
use assetpool_core::fetch::{CurlReachability, FetchOptions};
use assetpool_core::filepool::{CacheTable, DownloadState, Filepool, ResolveRequest};
use assetpool_core::probe::{AlwaysOnline, CapabilityProber};
use assetpool_core::site::SiteRegistry;
use assetpool_core::store::DiskFileStore;
use clap::Args;

use crate::cli::SiteArgs;

#[derive(Debug, Args)]
pub struct ResolveArgs {
    pub url: String,
    #[command(flatten)]
    pub site: SiteArgs,
    /// Component owning the file (e.g. mod_page).
    #[arg(long, default_value = "")]
    pub component: String,
    #[arg(long, default_value = "")]
    pub component_id: String,
    /// Download before printing, whatever the size.
    #[arg(long)]
    pub eager: bool,
    /// Known file size in bytes.
    #[arg(long, value_name = "BYTES")]
    pub size: Option<u64>,
    /// Remote revision timestamp.
    #[arg(long, default_value = "0")]
    pub time_modified: u64,
    /// Wait for a background download to finish before exiting.
    #[arg(long)]
    pub wait: bool,
}

pub async fn run_resolve(args: &ResolveArgs, cfg: &AssetPoolConfig) -> Result<()> {
    let registry = Arc::new(SiteRegistry::new());
    registry.add_site(args.site.to_site_info());

    let opts = FetchOptions::from_config(cfg);
    let prober = CapabilityProber::new(
        Arc::new(CurlReachability::new(opts)),
        Arc::new(AlwaysOnline),
    );
    let cache_dir = cfg.resolved_cache_dir()?;
    let store = Arc::new(DiskFileStore::new(&cache_dir, opts));

    let table_path = CacheTable::default_path()?;
    let table = match CacheTable::load_from_path(&table_path) {
        Ok(t) => t.unwrap_or_default(),
        Err(e) => {
            tracing::warn!("ignoring unreadable cache table: {:#}", e);
            CacheTable::new()
        }
    };
    let pool = Filepool::with_table(registry, prober, store, cfg, table);

    let mut req = ResolveRequest::new(&args.site.site_id, &args.url)
        .owner(&args.component, &args.component_id)
        .eager(args.eager)
        .time_modified(args.time_modified);
    req.file_size = args.size;
    let key = req.key();

    let mut events = pool.subscribe();
    let url = pool
        .resolve_request(req)
        .await
        .with_context(|| format!("resolve {}", args.url))?;
    println!("{url}");

    if args.wait && pool.file_state(&key) == DownloadState::Downloading {
        let file_key = key.file_key();
        loop {
            match events.recv().await {
                Ok(ev) if ev.key == file_key && ev.state != DownloadState::Downloading => {
                    match ev.error {
                        Some(err) => eprintln!("background download failed: {err}"),
                        None => {
                            let local = pool.entry(&key).and_then(|e| e.local).map(|l| l.url);
                            println!("downloaded: {}", local.unwrap_or_default());
                        }
                    }
                    break;
                }
                Ok(_) => continue,
                Err(e) => {
                    tracing::warn!("lost download events: {}", e);
                    break;
                }
            }
        }
    }

    pool.save_table(&table_path)?;
    Ok(())
}
