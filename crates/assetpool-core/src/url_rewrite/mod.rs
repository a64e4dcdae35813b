//! Mapping raw asset URLs onto the form the site will actually serve.
//!
//! Three dialects exist for a site's protected files:
//!
//! - anonymous: the URL as published, plus `offline=1`;
//! - token-query (legacy): `webservice/pluginfile.php/...?token=<token>`;
//! - token-path: `tokenpluginfile.php/<access key>/...`, which keeps the
//!   auth token out of the URL.
//!
//! [`rewrite`] is pure and deterministic. Applying it twice with the same
//! arguments gives the same URL as applying it once.

mod family;
mod params;

pub use family::{belongs_to_site, can_use_token_path, is_plugin_file_url, is_site_plugin_file_url};
pub use params::add_params_to_url;

use crate::url_model::{decode_amp_entities, has_query_param, remove_query_param};

use family::{rewrite_custom_family, to_token_path, to_webservice_endpoint};

/// Which endpoint family the rewrite may target for plugin files.
///
/// Chosen per site from the capability probe: `Legacy` once the token-path
/// endpoint is known not to work, `TokenPath` otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UrlDialect {
    #[default]
    TokenPath,
    Legacy,
}

/// Rewrite `url` into a fetchable URL for the site, preferring the token-path form.
///
/// # Examples
///
/// - `rewrite("http://site/pluginfile.php/1/mod_resource/x.png", "TOK", "http://site", None)`
///   → `"http://site/webservice/pluginfile.php/1/mod_resource/x.png?token=TOK&offline=1"`
/// - same with `Some("KEY")`
///   → `"http://site/tokenpluginfile.php/KEY/1/mod_resource/x.png?offline=1"`
pub fn rewrite(url: &str, token: &str, site_url: &str, access_key: Option<&str>) -> String {
    rewrite_with_dialect(url, token, site_url, access_key, UrlDialect::TokenPath)
}

/// Like [`rewrite`], restricted to the given dialect.
pub fn rewrite_with_dialect(
    url: &str,
    token: &str,
    site_url: &str,
    access_key: Option<&str>,
    dialect: UrlDialect,
) -> String {
    if url.is_empty() {
        return String::new();
    }

    let url = decode_amp_entities(url);
    let key = access_key.filter(|k| !k.trim().is_empty());
    let path_form_possible = can_use_token_path(&url, site_url, key);
    let token_path = dialect == UrlDialect::TokenPath && path_form_possible;

    if !token_path && has_query_param(&url, "token") {
        return url;
    }

    if !is_site_plugin_file_url(&url, site_url) {
        return rewrite_custom_family(&url, key).unwrap_or(url);
    }

    let token = token.trim();
    let fixed = match key {
        Some(k) if token_path || (token.is_empty() && path_form_possible) => {
            remove_query_param(&to_token_path(&url, k), "token")
        }
        _ if token.is_empty() => url,
        _ => add_params_to_url(&to_webservice_endpoint(&url, site_url), &[("token", token)]),
    };

    // Always flag offline use; it matters for files served from external repositories.
    add_params_to_url(&fixed, &[("offline", "1")])
}
