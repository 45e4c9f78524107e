//! Autorename candidates: `name.txt` -> `name (1).txt`, `name (2).txt`, ...

use boxgate_driver::path;

/// How many alternative names autorename tries before giving up
pub const MAX_RENAME_ATTEMPTS: usize = 10;

/// Sibling names to try, in order, when `path` is taken.
///
/// Numbering continues after an existing ` (n)` suffix, so renaming
/// `foo (3).txt` starts at `foo (4).txt`. Extensions are only split off files.
pub fn rename_candidates(path: &str, is_file: bool) -> Vec<String> {
    let parent = path::parent(path);
    let name = path::basename(path);

    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) if is_file && !stem.is_empty() => (stem, format!(".{ext}")),
        _ => (name, String::new()),
    };
    let (base, start) = match split_counter(stem) {
        Some((base, n)) => (base, n.saturating_add(1)),
        None => (stem, 1),
    };

    (0..MAX_RENAME_ATTEMPTS as u64)
        .map(|i| path::join(parent, &format!("{base} ({}){ext}", start.saturating_add(i))))
        .collect()
}

/// `"foo (3)"` -> `("foo", 3)`
fn split_counter(stem: &str) -> Option<(&str, u64)> {
    let inner = stem.strip_suffix(')')?;
    let (base, digits) = inner.rsplit_once(" (")?;
    if base.is_empty() || digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((base, digits.parse().ok()?))
}
