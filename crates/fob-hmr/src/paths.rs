//! Public path (URL) helpers.
//!
//! Public paths are root-relative, `/`-separated request identifiers that may
//! carry a query string. These helpers never touch the filesystem.

use std::path::Path;

/// Request prefix for bare (package) imports.
pub const MODULE_PREFIX: &str = "/@modules/";

/// Query marker for imports of non-script files (`/logo.svg?import`).
pub const IMPORT_MARKER: &str = "import";

/// Strip the query string and hash.
pub fn clean_url(url: &str) -> &str {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    &url[..end]
}

/// Split `path?query` into `(path, "?query")`; the query keeps its `?`.
pub fn split_query(url: &str) -> (&str, &str) {
    match url.find('?') {
        Some(idx) => url.split_at(idx),
        None => (url, ""),
    }
}

/// Absolute URLs, protocol-relative URLs and data URIs are served by others.
pub fn is_external(spec: &str) -> bool {
    spec.starts_with("http://")
        || spec.starts_with("https://")
        || spec.starts_with("//")
        || spec.starts_with("data:")
}

/// Package-style identifier (`vue`, `@scope/pkg/sub`).
pub fn is_bare(spec: &str) -> bool {
    !spec.is_empty() && !spec.starts_with('.') && !spec.starts_with('/') && !is_external(spec)
}

/// Whether the last path segment carries an extension.
pub fn has_extension(path: &str) -> bool {
    let path = clean_url(path);
    let name = path.rsplit('/').next().unwrap_or(path);
    name.rfind('.').is_some_and(|idx| idx > 0 && idx + 1 < name.len())
}

/// Extension of the last path segment including the dot.
pub fn extension(path: &str) -> Option<&str> {
    let path = clean_url(path);
    let name = path.rsplit('/').next().unwrap_or(path);
    name.rfind('.')
        .filter(|&idx| idx > 0 && idx + 1 < name.len())
        .map(|idx| &name[idx..])
}

/// Directory part of a public path, with trailing slash.
fn dirname(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..=idx],
        None => "/",
    }
}

/// Collapse `.` and `..` segments of an absolute `/`-separated path.
///
/// `..` never climbs above the root; a trailing slash is kept.
pub fn normalize(path: &str) -> String {
    let cleaned = path_clean::clean(format!("/{}", path.trim_start_matches('/')));
    let mut out = cleaned.to_string_lossy().replace('\\', "/");
    if path.ends_with('/') && out != "/" {
        out.push('/');
    }
    out
}

/// Resolve `spec` against `importer`, keeping `spec`'s query.
///
/// Root-relative specifiers are only normalized.
pub fn resolve_relative(importer: &str, spec: &str) -> String {
    let (spec_path, query) = split_query(spec);
    let joined = if spec_path.starts_with('/') {
        normalize(spec_path)
    } else {
        normalize(&format!("{}{}", dirname(clean_url(importer)), spec_path))
    };
    format!("{joined}{query}")
}

/// Append `param` to the query string.
pub fn append_query(url: &str, param: &str) -> String {
    let sep = if url.contains('?') { '&' } else { '?' };
    format!("{url}{sep}{param}")
}

/// Whether the query contains `name` either bare or as `name=...`.
pub fn has_query_param(url: &str, name: &str) -> bool {
    let (_, query) = split_query(url);
    query
        .trim_start_matches('?')
        .split('&')
        .any(|pair| pair.split('=').next() == Some(name))
}

/// Value of the first `name=value` pair in the query string.
pub fn query_param<'a>(url: &'a str, name: &str) -> Option<&'a str> {
    let (_, query) = split_query(url);
    query
        .trim_start_matches('?')
        .split('&')
        .find_map(|pair| pair.split_once('=').filter(|(key, _)| *key == name))
        .map(|(_, value)| value)
}

/// Drop a parameter from the query string.
pub fn remove_query_param(url: &str, name: &str) -> String {
    let (path, query) = split_query(url);
    let kept: Vec<&str> = query
        .trim_start_matches('?')
        .split('&')
        .filter(|pair| !pair.is_empty() && pair.split('=').next() != Some(name))
        .collect();
    if kept.is_empty() {
        path.to_string()
    } else {
        format!("{path}?{}", kept.join("&"))
    }
}

/// Package name of a bare identifier: `pkg` or `@scope/pkg`.
pub fn package_name(id: &str) -> &str {
    let mut slashes = id.match_indices('/');
    let cut = if id.starts_with('@') {
        slashes.nth(1)
    } else {
        slashes.next()
    };
    match cut {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}

/// `/`-separated string form of a relative filesystem path.
pub fn slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Short stable hash of a public path, used as a style id.
pub fn hash_id(public_path: &str) -> String {
    let hash = blake3::hash(public_path.as_bytes());
    hash.to_hex()[..8].to_string()
}
