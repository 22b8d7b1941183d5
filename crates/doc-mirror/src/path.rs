use std::collections::BTreeMap;

use crate::entry::EntryId;

/// Id used when the derived path is empty (the repository or destination root).
pub const ROOT_ID: &str = "index";

/// Inputs to [`generate_id`].
#[derive(Debug, Clone, Copy, Default)]
pub struct IdOptions<'a> {
    pub path: &'a str,
    /// Removed from the path once, before the extension is stripped.
    pub replace: Option<&'a str>,
}

/// Inputs to [`generate_path`].
#[derive(Debug, Clone, Copy)]
pub struct PathOptions<'a> {
    pub base_path: &'a str,
    pub path_mappings: &'a BTreeMap<String, String>,
}

/// Derive a stable entry id from a slash-separated path.
///
/// Steps: normalize, remove `replace` once, normalize again, drop the final
/// extension. An empty result maps to [`ROOT_ID`].
pub fn generate_id(options: &IdOptions<'_>) -> EntryId {
    let mut path = normalize(options.path);

    if let Some(replace) = options.replace.filter(|r| !r.is_empty()) {
        path = normalize(&path.replacen(replace, "", 1));
    }

    let stem = strip_extension(&path);
    if stem.is_empty() {
        EntryId::new(ROOT_ID)
    } else {
        EntryId::new(stem)
    }
}

/// Derive the local destination for an entry.
///
/// `entry` is the entry's path relative to the source root. Without it the
/// destination base alone is returned. An empty string means there is no
/// usable destination and the entry must be skipped.
pub fn generate_path(options: &PathOptions<'_>, entry: Option<&str>) -> String {
    let base = normalize(options.base_path.trim());
    if base.is_empty() {
        return String::new();
    }

    let Some(relative) = entry else {
        return base;
    };

    let mapped = normalize(&apply_path_mappings(options.path_mappings, relative));
    if mapped.is_empty() {
        base
    } else {
        format!("{base}/{mapped}")
    }
}

/// Apply the first matching path mapping.
///
/// Keys ending in `/` remap a directory prefix; other keys must match the
/// whole relative path.
pub fn apply_path_mappings(mappings: &BTreeMap<String, String>, relative: &str) -> String {
    let relative = normalize(relative);

    if let Some(target) = mappings.get(&relative) {
        return target.clone();
    }

    // Longest directory prefix wins.
    mappings
        .iter()
        .filter(|(from, _)| from.ends_with('/'))
        .filter_map(|(from, to)| {
            relative
                .strip_prefix(from.as_str())
                .map(|rest| (from.len(), to, rest))
        })
        .max_by_key(|(len, _, _)| *len)
        .map(|(_, to, rest)| format!("{}/{rest}", to.trim_end_matches('/')))
        .unwrap_or(relative)
}

/// Trim surrounding slashes and drop empty and `.` segments.
pub fn normalize(path: &str) -> String {
    path.split(['/', '\\'])
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// Path of `full` relative to `root`, or `None` if it lies outside.
pub fn relative_to_root(root: &str, full: &str) -> Option<String> {
    let root = normalize(root);
    let full = normalize(full);

    if root.is_empty() {
        return Some(full);
    }
    if full == root {
        return Some(String::new());
    }
    full.strip_prefix(&root)
        .and_then(|rest| rest.strip_prefix('/'))
        .map(str::to_owned)
}

/// Directory part of a slash path (empty at the top level).
pub fn parent(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => "",
    }
}

/// Extension of the final segment, without the dot.
pub fn extension(path: &str) -> Option<&str> {
    let file_name = path.rsplit('/').next().unwrap_or(path);
    match file_name.rfind('.') {
        Some(0) | None => None,
        Some(idx) => Some(&file_name[idx + 1..]),
    }
}

fn strip_extension(path: &str) -> &str {
    match extension(path) {
        Some(ext) => &path[..path.len() - ext.len() - 1],
        None => path,
    }
}

/// Resolve `target` against the directory `from_dir`.
///
/// Handles `.` and `..`. Returns `None` when the result escapes the
/// repository root.
pub fn resolve_relative(from_dir: &str, target: &str) -> Option<String> {
    let mut segments: Vec<&str> = if target.starts_with('/') {
        Vec::new()
    } else {
        from_dir.split('/').filter(|s| !s.is_empty()).collect()
    };

    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop()?;
            }
            other => segments.push(other),
        }
    }

    Some(segments.join("/"))
}

/// True if any path segment is hidden (starts with `.`).
pub fn is_hidden(path: &str) -> bool {
    path.split('/').any(|segment| segment.starts_with('.'))
}

/// True if the target is an absolute URL, a mail link, or a pure fragment.
pub fn is_external(target: &str) -> bool {
    target.starts_with('#')
        || target.starts_with("//")
        || target.starts_with("mailto:")
        || target.starts_with("data:")
        || target
            .split_once(':')
            .is_some_and(|(scheme, _)| {
                !scheme.is_empty()
                    && scheme
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.')
            })
}
