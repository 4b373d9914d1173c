//! Materialized-path codec.
//!
//! # Responsibility
//! - Build, split and compare `path_id` / `path` chains.
//! - Keep every separator-aware string operation in one place.
//!
//! # Invariants
//! - Segments never contain [`PATH_SEPARATOR`]; callers validate IDs and
//!   names before building paths.
//! - Prefix tests are separator-bounded: `"ab"` is never an ancestor of
//!   `"abc"`.

/// Separator between segments of `path_id` and `path`.
pub const PATH_SEPARATOR: char = '/';

/// Builds the path of a new child from its parent path.
///
/// `parent = None` yields a root-level path made of `segment` alone.
pub fn child_path(parent: Option<&str>, segment: &str) -> String {
    match parent {
        Some(parent) if !parent.is_empty() => format!("{parent}{PATH_SEPARATOR}{segment}"),
        _ => segment.to_string(),
    }
}

/// Splits a path into its segments, root first, self last.
pub fn split_ancestors(path: &str) -> Vec<&str> {
    if path.is_empty() {
        return Vec::new();
    }
    path.split(PATH_SEPARATOR).collect()
}

/// Returns the tree level encoded by a path (1 for roots).
pub fn level(path: &str) -> usize {
    split_ancestors(path).len()
}

/// Returns the first segment, i.e. the root ancestor.
pub fn root_segment(path: &str) -> Option<&str> {
    split_ancestors(path).first().copied()
}

/// Returns the parent path, or `None` for root-level paths.
pub fn parent_path(path: &str) -> Option<&str> {
    path.rfind(PATH_SEPARATOR).map(|index| &path[..index])
}

/// Returns the last segment of a path.
pub fn last_segment(path: &str) -> &str {
    match path.rfind(PATH_SEPARATOR) {
        Some(index) => &path[index + 1..],
        None => path,
    }
}

/// Returns whether `path` lies strictly below `ancestor`.
pub fn is_descendant(path: &str, ancestor: &str) -> bool {
    path.len() > ancestor.len() + 1
        && path.starts_with(ancestor)
        && path[ancestor.len()..].starts_with(PATH_SEPARATOR)
}

/// Returns whether `path` names a direct child of `parent_path`.
///
/// Matches `parent/*` but not `parent/*/*`. `parent_path = None` matches
/// root-level paths. Same rule as the repository's direct-child SQL filter.
pub fn is_direct_child_prefix(path: &str, parent_path: Option<&str>) -> bool {
    match parent_path {
        None => !path.is_empty() && !path.contains(PATH_SEPARATOR),
        Some(parent) => {
            is_descendant(path, parent) && !path[parent.len() + 1..].contains(PATH_SEPARATOR)
        }
    }
}

/// Replaces the last segment of a name path.
pub fn replace_last_segment(path: &str, new_segment: &str) -> String {
    child_path(parent_path(path), new_segment)
}

/// Rewrites the leading `old_prefix` of `path` to `new_prefix`.
///
/// Returns `None` when `path` is neither `old_prefix` nor below it.
pub fn rebase(path: &str, old_prefix: &str, new_prefix: &str) -> Option<String> {
    if path == old_prefix {
        return Some(new_prefix.to_string());
    }
    if is_descendant(path, old_prefix) {
        return Some(format!("{new_prefix}{}", &path[old_prefix.len()..]));
    }
    None
}

/// Rewrites the name path of every descendant after a rename.
///
/// `old_path_name` is the renamed node's full name path before the rename
/// and `new_name` its new last segment. Returns how many paths changed.
pub fn rename_cascade<'a, I>(old_path_name: &str, new_name: &str, descendant_paths: I) -> usize
where
    I: IntoIterator<Item = &'a mut String>,
{
    let new_path_name = replace_last_segment(old_path_name, new_name);
    let mut changed = 0;
    for path in descendant_paths {
        if let Some(rebased) = rebase(path, old_path_name, &new_path_name) {
            if *path != rebased {
                *path = rebased;
                changed += 1;
            }
        }
    }
    changed
}
