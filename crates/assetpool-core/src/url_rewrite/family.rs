//! Recognising the asset-plugin URL families a site serves files from.
//!
//! Families: legacy `pluginfile.php`, webservice-prefixed
//! `webservice/pluginfile.php`, token-path `tokenpluginfile.php/<key>`, and
//! the question-type plugin endpoints for draft files and `thpluginfile.php`.

use crate::url_model::{concat_paths, has_query_param};

pub(crate) const PLUGINFILE: &str = "/pluginfile.php";
pub(crate) const WEBSERVICE_PLUGINFILE: &str = "/webservice/pluginfile.php";
pub(crate) const TOKEN_PLUGINFILE: &str = "/tokenpluginfile.php";

const DRAFTFILE: &str = "/draftfile.php";
const TOKEN_DRAFTFILE: &str = "/question/type/thvstepcluster/thtokendraftfile.php";
const TH_PLUGINFILE: &str = "/thpluginfile.php";
const TH_TOKEN_PLUGINFILE: &str = "/thtokenpluginfile.php";

/// True if the URL goes through a `pluginfile.php` endpoint (plain or webservice).
pub fn is_plugin_file_url(url: &str) -> bool {
    url.contains(PLUGINFILE)
}

/// True if `url` lives under the site's base URL.
pub fn belongs_to_site(url: &str, site_url: &str) -> bool {
    let prefix = if site_url.ends_with('/') {
        site_url.to_string()
    } else {
        format!("{site_url}/")
    };
    url.starts_with(&prefix)
}

/// True if `url` is a plugin-file URL of this site.
pub fn is_site_plugin_file_url(url: &str, site_url: &str) -> bool {
    is_plugin_file_url(url) && belongs_to_site(url, site_url)
}

/// Whether the token-path form can express this URL at all.
///
/// Needs a non-empty access key, a plain or webservice `pluginfile.php`
/// endpoint directly under the site, and no `file=` argument (the
/// slash-argument-less form has no path to embed the key into).
pub fn can_use_token_path(url: &str, site_url: &str, access_key: Option<&str>) -> bool {
    let has_key = access_key.map(|k| !k.trim().is_empty()).unwrap_or(false);
    if !has_key || has_query_param(url, "file") {
        return false;
    }
    url.starts_with(&concat_paths(site_url, "pluginfile.php"))
        || url.starts_with(&concat_paths(site_url, "webservice/pluginfile.php"))
}

/// Replace the first `(/webservice)?/pluginfile.php` with `/tokenpluginfile.php/<key>`.
pub(crate) fn to_token_path(url: &str, access_key: &str) -> String {
    let Some(idx) = url.find(PLUGINFILE) else {
        return url.to_string();
    };
    let start = if url[..idx].ends_with("/webservice") {
        idx - "/webservice".len()
    } else {
        idx
    };
    format!(
        "{}{}/{}{}",
        &url[..start],
        TOKEN_PLUGINFILE,
        access_key,
        &url[idx + PLUGINFILE.len()..]
    )
}

/// Move a plain `<site>/pluginfile.php` URL onto the webservice endpoint.
pub(crate) fn to_webservice_endpoint(url: &str, site_url: &str) -> String {
    let plain = concat_paths(site_url, "pluginfile.php");
    match url.strip_prefix(&plain) {
        Some(rest) => format!("{}{}", concat_paths(site_url, "webservice/pluginfile.php"), rest),
        None => url.to_string(),
    }
}

/// Rewrites for URLs outside the site's `pluginfile.php` family, on any host.
///
/// Draft files and `thpluginfile.php` files have key-embedding twins served
/// by a question-type plugin. Returns `None` when no family matches or there
/// is no access key to embed.
pub(crate) fn rewrite_custom_family(url: &str, access_key: Option<&str>) -> Option<String> {
    let key = access_key.filter(|k| !k.trim().is_empty())?;
    if url.contains(DRAFTFILE) {
        return Some(url.replacen(DRAFTFILE, &format!("{TOKEN_DRAFTFILE}/{key}"), 1));
    }
    if url.contains(TH_PLUGINFILE) {
        return Some(url.replacen(TH_PLUGINFILE, &format!("{TH_TOKEN_PLUGINFILE}/{key}"), 1));
    }
    None
}
