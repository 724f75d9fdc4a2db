/*
 * Path normalization.
 *
 * Object-store keys carry the full table prefix while manifests may hold
 * absolute URIs or table-relative paths. Both sides are reduced to the bare
 * file name before they are compared.
 */

/// Returns the part of `path` after the last `/`, or `path` itself when it has none.
pub fn file_name(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

/// Returns `key` with the table prefix removed, or `key` unchanged when it lies outside the table.
pub fn table_relative<'a>(key: &'a str, table_prefix: &str) -> &'a str {
    let prefix = table_prefix.trim_end_matches('/');
    key.strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('/'))
        .unwrap_or(key)
}
