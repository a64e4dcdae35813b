//! `assetpool status` – list cached files.

use anyhow::Result;
use assetpool_core::filepool::CacheTable;

pub fn run_status() -> Result<()> {
    let path = CacheTable::default_path()?;
    let table = CacheTable::load_from_path(&path)?.unwrap_or_default();
    if table.is_empty() {
        println!("No cached files.");
        return Ok(());
    }
    let mut rows: Vec<_> = table.iter().collect();
    rows.sort_by(|a, b| (&a.0.site_id, &a.1.remote_url).cmp(&(&b.0.site_id, &b.1.remote_url)));
    println!("{:<10} {:<14} {:<10} {}", "SITE", "STATE", "SIZE", "URL");
    for (key, entry) in rows {
        let size = entry
            .local
            .as_ref()
            .map(|l| l.size.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<10} {:<14} {:<10} {}",
            key.site_id,
            format!("{:?}", entry.state).to_lowercase(),
            size,
            entry.remote_url
        );
        if let Some(err) = &entry.last_error {
            println!("{:<10} {:<14} {:<10} error: {}", "", "", "", err);
        }
    }
    Ok(())
}
