//! Appending query parameters without disturbing fragments.

use url::form_urlencoded::byte_serialize;

use crate::url_model::{has_query_param, split_url};

/// Append `params` to the query string of `url`, before any `#fragment`.
///
/// Parameters already present by name are left alone, so appending is
/// idempotent. Values are form-encoded; names are used as given.
pub fn add_params_to_url(url: &str, params: &[(&str, &str)]) -> String {
    let (base, query, fragment) = split_url(url);
    let mut out = base.to_string();
    let mut has_query = false;
    if let Some(q) = query.filter(|q| !q.is_empty()) {
        out.push('?');
        out.push_str(q);
        has_query = true;
    }
    for (name, value) in params {
        if has_query_param(url, name) {
            continue;
        }
        out.push(if has_query { '&' } else { '?' });
        out.push_str(name);
        out.push('=');
        out.extend(byte_serialize(value.as_bytes()));
        has_query = true;
    }
    if let Some(f) = fragment {
        out.push('#');
        out.push_str(f);
    }
    out
}
