//! Helpers for `/`-separated, root-anchored storage paths

/// The root path
pub const ROOT: &str = "/";

/// Normalize a path: unify separators, drop empty, `.` and `..` segments,
/// and anchor at `/`.
///
/// `..` is dropped rather than resolved, so a path can never climb out of
/// whatever namespace it is later prefixed with.
pub fn normalize(path: &str) -> String {
    let segments: Vec<&str> = path
        .split(['/', '\\'])
        .filter(|s| !s.is_empty() && *s != "." && *s != "..")
        .collect();
    if segments.is_empty() {
        return ROOT.to_string();
    }
    let mut out = String::with_capacity(path.len() + 1);
    for segment in segments {
        out.push('/');
        out.push_str(segment);
    }
    out
}

pub fn is_root(path: &str) -> bool {
    path.is_empty() || path == ROOT
}

/// Join a child name onto a directory path
pub fn join(dir: &str, name: &str) -> String {
    let name = name.trim_start_matches('/');
    if is_root(dir) {
        format!("/{name}")
    } else {
        format!("{}/{}", dir.trim_end_matches('/'), name)
    }
}

/// Parent directory; the root is its own parent
pub fn parent(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) | None => ROOT,
        Some(idx) => &trimmed[..idx],
    }
}

/// Last path segment; empty for the root
pub fn basename(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(idx) => &trimmed[idx + 1..],
        None => trimmed,
    }
}

/// Whether `path` lies strictly below `ancestor` (case-insensitive)
pub fn is_strict_descendant(path: &str, ancestor: &str) -> bool {
    let path = path.to_lowercase();
    let ancestor = ancestor.to_lowercase();
    if is_root(&ancestor) {
        return !is_root(&path);
    }
    path.len() > ancestor.len()
        && path.starts_with(&ancestor)
        && path.as_bytes()[ancestor.len()] == b'/'
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("", "/")]
    #[case("/", "/")]
    #[case("a/b", "/a/b")]
    #[case("/a//b/", "/a/b")]
    #[case("\\a\\b", "/a/b")]
    #[case("/a/./b", "/a/b")]
    #[case("/../../etc/passwd", "/etc/passwd")]
    #[case("/a/../b", "/a/b")]
    fn test_normalize(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(normalize(input), expected);
    }

    #[rstest]
    #[case("/", "a", "/a")]
    #[case("/x", "a", "/x/a")]
    #[case("/x/", "a", "/x/a")]
    fn test_join(#[case] dir: &str, #[case] name: &str, #[case] expected: &str) {
        assert_eq!(join(dir, name), expected);
    }

    #[test]
    fn test_parent_and_basename() {
        assert_eq!(parent("/a/b/c.txt"), "/a/b");
        assert_eq!(parent("/a"), "/");
        assert_eq!(parent("/"), "/");
        assert_eq!(basename("/a/b/c.txt"), "c.txt");
        assert_eq!(basename("/"), "");
    }

    #[test]
    fn test_is_strict_descendant() {
        assert!(is_strict_descendant("/A/b", "/a"));
        assert!(!is_strict_descendant("/a", "/a"));
        assert!(!is_strict_descendant("/ab", "/a"));
        assert!(is_strict_descendant("/a", "/"));
    }
}
