//! Pure path helpers shared by the storage engine and the authorization
//! registry.
//!
//! Document paths start with `/`, never end with `/`, and have non-empty
//! segments. Directory paths end with `/`; the root directory is `/`.

/// True iff the path names a directory rather than a document.
pub fn is_directory_path(path: &str) -> bool {
    path.ends_with('/')
}

/// Check the document-path invariant: leading `/`, no trailing `/`, no empty
/// segments.
pub fn is_valid_document_path(path: &str) -> bool {
    path.starts_with('/') && !path.ends_with('/') && !path.contains("//")
}

/// Check the directory-path invariant. The root `/` is a valid directory.
pub fn is_valid_directory_path(path: &str) -> bool {
    path == "/" || (path.starts_with('/') && path.ends_with('/') && !path.contains("//"))
}

/// Strip the last segment (and its trailing slash for directories). The
/// parent of any top-level path is the root `/`.
pub fn parent_of(path: &str) -> &str {
    let trimmed = path.strip_suffix('/').unwrap_or(path);
    match trimmed.rfind('/') {
        Some(0) | None => "/",
        Some(idx) => &path[..=idx],
    }
}

/// Directory paths enclosing `path`, immediate parent first, root `/` last.
/// Both the materialization walk on `put` and the pruning walk on `delete`
/// follow this order.
pub fn ancestors_of(path: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut current = parent_of(path);
    loop {
        out.push(current);
        if current == "/" {
            break;
        }
        current = parent_of(current);
    }
    out
}

/// The longest prefix in `prefixes` that is a prefix of `path`, if any.
pub fn longest_matching_prefix<'a, I>(path: &str, prefixes: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    prefixes
        .into_iter()
        .filter(|p| path.starts_with(p))
        .max_by_key(|p| p.len())
}

/// Map a raw permission category to its canonical directory-path form:
/// `""` -> `/`, `"photos"` -> `/photos/`, `"deep/dir"` -> `/deep/dir/`.
pub fn normalize_category(category: &str) -> String {
    let trimmed = category.trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{}/", trimmed)
    }
}
