//! `assetpool rewrite` – print the rewritten URL.

use assetpool_core::url_rewrite::{rewrite_with_dialect, UrlDialect};

use crate::cli::SiteArgs;

pub fn run_rewrite(url: &str, site: &SiteArgs, legacy: bool) {
    let dialect = if legacy {
        UrlDialect::Legacy
    } else {
        UrlDialect::TokenPath
    };
    let fixed = rewrite_with_dialect(
        url,
        &site.token,
        &site.site_url,
        site.access_key.as_deref(),
        dialect,
    );
    println!("{fixed}");
}
