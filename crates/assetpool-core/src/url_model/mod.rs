//! URL modeling: canonical forms, cache file ids and URL classification.
//!
//! The same remote file can be reached through several endpoint dialects
//! (plain, webservice-prefixed, token-path) and can carry auth parameters.
//! Everything that keys on a URL (resource keys, cache file names) goes
//! through [`canonical_url`] first so those variations collapse.

mod path;

use sha2::{Digest, Sha256};

pub use path::{extension_from_url, filename_from_url_path};

/// Query parameters that only carry auth/transport hints, never identity.
const VOLATILE_PARAMS: &[&str] = &["token", "offline"];

/// Schemes that point at files already on the device.
const LOCAL_SCHEMES: &[&str] = &["file:", "filesystem:", "cdvfile:"];

/// Replace HTML-escaped ampersands left over from rendered markup.
pub fn decode_amp_entities(url: &str) -> String {
    url.replace("&amp;", "&")
}

/// Split `url` into (before query, query without `?`, fragment without `#`).
pub(crate) fn split_url(url: &str) -> (&str, Option<&str>, Option<&str>) {
    let (rest, fragment) = match url.split_once('#') {
        Some((r, f)) => (r, Some(f)),
        None => (url, None),
    };
    match rest.split_once('?') {
        Some((base, query)) => (base, Some(query), fragment),
        None => (rest, None, fragment),
    }
}

/// True if the URL's query string has a parameter named exactly `name`.
///
/// Matches whole parameter names only: `csrftoken=x` is not a `token`.
pub fn has_query_param(url: &str, name: &str) -> bool {
    let (_, query, _) = split_url(url);
    query
        .map(|q| {
            q.split('&')
                .filter(|pair| !pair.is_empty())
                .any(|pair| pair.split('=').next() == Some(name))
        })
        .unwrap_or(false)
}

/// Remove every query parameter named `name`, keeping order and fragment.
pub fn remove_query_param(url: &str, name: &str) -> String {
    let (base, query, fragment) = split_url(url);
    let kept: Vec<&str> = query
        .unwrap_or("")
        .split('&')
        .filter(|pair| !pair.is_empty() && pair.split('=').next() != Some(name))
        .collect();
    let mut out = base.to_string();
    if !kept.is_empty() {
        out.push('?');
        out.push_str(&kept.join("&"));
    }
    if let Some(f) = fragment {
        out.push('#');
        out.push_str(f);
    }
    out
}

/// Replace `/<marker>/<key>/` with `/<plain>/`, dropping the key segment.
fn fold_keyed_endpoint(path: &str, marker: &str, plain: &str) -> String {
    let needle = format!("/{marker}/");
    match path.find(&needle) {
        Some(start) => {
            let after_marker = start + needle.len();
            let key_end = path[after_marker..]
                .find('/')
                .map(|i| after_marker + i + 1)
                .unwrap_or(path.len());
            format!("{}/{}/{}", &path[..start], plain, &path[key_end..])
        }
        None => path.to_string(),
    }
}

/// Canonical identity of a remote asset URL.
///
/// Decodes `&amp;`, drops the fragment and the `token`/`offline` parameters,
/// and folds the webservice and token-path endpoints back onto the plain
/// ones, so every dialect of a URL maps to the same string.
pub fn canonical_url(url: &str) -> String {
    let decoded = decode_amp_entities(url.trim());
    let (base, query, _) = split_url(&decoded);

    let mut path = base.replace("/webservice/pluginfile.php", "/pluginfile.php");
    path = fold_keyed_endpoint(&path, "tokenpluginfile.php", "pluginfile.php");
    path = fold_keyed_endpoint(&path, "thtokenpluginfile.php", "thpluginfile.php");
    path = fold_keyed_endpoint(
        &path,
        "question/type/thvstepcluster/thtokendraftfile.php",
        "draftfile.php",
    );

    let kept: Vec<&str> = query
        .unwrap_or("")
        .split('&')
        .filter(|pair| {
            !pair.is_empty()
                && !VOLATILE_PARAMS.contains(&pair.split('=').next().unwrap_or_default())
        })
        .collect();
    if kept.is_empty() {
        path
    } else {
        format!("{}?{}", path, kept.join("&"))
    }
}

/// Stable cache file name for a remote URL: SHA-256 of the canonical URL,
/// plus the original extension when there is a usable one.
pub fn file_id_for_url(url: &str) -> String {
    let canonical = canonical_url(url);
    let digest = hex::encode(Sha256::digest(canonical.as_bytes()));
    match extension_from_url(&canonical) {
        Some(ext) => format!("{digest}.{ext}"),
        None => digest,
    }
}

/// True for URLs that already point at a file on this device.
pub fn is_local_file_url(url: &str) -> bool {
    let lower = url.trim_start().to_ascii_lowercase();
    LOCAL_SCHEMES.iter().any(|s| lower.starts_with(s))
        || lower.starts_with("http://localhost")
        || lower.starts_with("https://localhost")
}

/// True for absolute `http://` or `https://` URLs.
pub fn is_http_url(url: &str) -> bool {
    let lower = url.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Join a base URL and a relative path with exactly one slash between them.
pub fn concat_paths(base: &str, rel: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), rel.trim_start_matches('/'))
}
