//! Helpers for the slash-separated paths used in drive tags.
//!
//! Paths are absolute (`/poses/happy.svg`). The root directory is `/`.

/// Non-empty segments of `path`.
pub fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Directory part of `path`, everything before the last `/`.
/// `/a.svg` has parent `""`, which stands for the root.
pub fn parent(path: &str) -> &str {
    match path.rfind('/') {
        Some(i) => &path[..i],
        None => "",
    }
}

/// Last segment of `path`.
pub fn file_name(path: &str) -> &str {
    match path.rfind('/') {
        Some(i) => &path[i + 1..],
        None => path,
    }
}

/// File name up to its first `.`; the emotion name of an asset.
pub fn stem(path: &str) -> &str {
    let name = file_name(path);
    name.split('.').next().unwrap_or(name)
}

/// Joins a directory and a name with exactly one `/` between them.
pub fn join(dir: &str, name: &str) -> String {
    collapse_slashes(&format!("{}/{}", dir.trim_end_matches('/'), name))
}

/// Replaces runs of `/` with a single `/`.
pub fn collapse_slashes(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut last_slash = false;
    for c in path.chars() {
        if c == '/' {
            if !last_slash {
                out.push(c);
            }
            last_slash = true;
        } else {
            out.push(c);
            last_slash = false;
        }
    }
    out
}

/// Trims whitespace and makes the path absolute.
pub fn normalize(path: &str) -> String {
    let trimmed = path.trim();
    if trimmed.starts_with('/') {
        collapse_slashes(trimmed)
    } else {
        collapse_slashes(&format!("/{trimmed}"))
    }
}

/// True when `path` is `dir` itself or lies below it.
pub fn is_within(path: &str, dir: &str) -> bool {
    let dir = dir.trim_end_matches('/');
    if dir.is_empty() {
        return true;
    }
    path == dir || path.strip_prefix(dir).is_some_and(|rest| rest.starts_with('/'))
}

/// Moves `path` from under `from` to under `to`. Callers check
/// [`is_within`] first.
pub fn rebase(path: &str, from: &str, to: &str) -> String {
    let from = from.trim_end_matches('/');
    let rest = &path[from.len().min(path.len())..];
    collapse_slashes(&format!("{}{}", to.trim_end_matches('/'), rest))
}

pub const DOWNLOADED_NAME: &str = "downloaded.svg";

/// Name used for a file downloaded from `url`: the last path segment, or
/// `downloaded.svg` when the URL ends in `/`.
pub fn name_from_url(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let name = match path.split_once("://") {
        Some((_, rest)) => rest.split_once('/').map_or("", |(_, p)| file_name(p)),
        None => file_name(path),
    };
    if name.is_empty() { DOWNLOADED_NAME.to_string() } else { name.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_downloads_after_the_url() {
        assert_eq!(name_from_url("https://cdn.example/art/cat.svg"), "cat.svg");
        assert_eq!(name_from_url("https://cdn.example/cat.svg?size=2#top"), "cat.svg");
        assert_eq!(name_from_url("https://cdn.example/art/"), "downloaded.svg");
        assert_eq!(name_from_url("https://cdn.example"), "downloaded.svg");
    }

    #[test]
    fn splits_and_joins() {
        assert_eq!(segments("/a//b/c.svg"), vec!["a", "b", "c.svg"]);
        assert_eq!(parent("/a/b/c.svg"), "/a/b");
        assert_eq!(parent("/c.svg"), "");
        assert_eq!(file_name("/a/b/c.svg"), "c.svg");
        assert_eq!(stem("/a/emotion-a.v2.svg"), "emotion-a");
        assert_eq!(join("/", "x"), "/x");
        assert_eq!(join("", "x"), "/x");
        assert_eq!(join("/a/", "/x"), "/a/x");
        assert_eq!(normalize(" a/b "), "/a/b");
    }

    #[test]
    fn within_respects_segment_boundaries() {
        assert!(is_within("/poses/a.svg", "/poses"));
        assert!(is_within("/poses", "/poses"));
        assert!(!is_within("/posesX/a.svg", "/poses"));
        assert!(is_within("/anything", "/"));
    }

    #[test]
    fn rebase_replaces_prefix() {
        assert_eq!(rebase("/a/b/c.svg", "/a", "/z"), "/z/b/c.svg");
        assert_eq!(rebase("/a", "/a", "/z/y"), "/z/y");
    }
}
