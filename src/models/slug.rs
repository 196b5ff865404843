//! Slug derivation and path joining.

/// Trailing path words that select an action instead of naming a node.
pub const RESERVED_ACTIONS: &[&str] = &["index", "new", "edit", "dashboard", "publish", "unpublish"];

/// Path words used by the router for its own collections.
pub const STRUCTURAL_NAMES: &[&str] = &["admin", "api", "directories", "features"];

/// Slug of the feature a directory shows in place of its own view.
pub const INDEX_SLUG: &str = "index";

/// Derive a URL slug from a title.
///
/// ASCII letters and digits are kept (lower-cased); every other run of
/// characters becomes a single `-`. Leading and trailing dashes are dropped.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_dash = false;

    for ch in title.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }

    slug
}

/// Join path parts with `/`, collapsing any run of separators into one.
///
/// Empty parts are allowed and simply disappear, so a node with a blank slug
/// never produces `a//b`.
pub fn join_path<I, S>(parts: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let joined = parts
        .into_iter()
        .map(|part| part.as_ref().to_string())
        .collect::<Vec<_>>()
        .join("/");

    let mut out = String::with_capacity(joined.len());
    let mut previous_slash = false;
    for ch in joined.chars() {
        if ch == '/' {
            if !previous_slash {
                out.push(ch);
            }
            previous_slash = true;
        } else {
            out.push(ch);
            previous_slash = false;
        }
    }
    out
}

/// Absolute path (leading `/`) for a list of slugs.
pub fn absolute_path<I, S>(slugs: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut parts = vec![String::new()];
    parts.extend(slugs.into_iter().map(|s| s.as_ref().to_string()));
    let path = join_path(parts);
    if path.is_empty() {
        "/".to_string()
    } else {
        path
    }
}
