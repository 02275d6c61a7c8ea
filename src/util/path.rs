//! Repository-relative path helpers. Paths use `/` separators and the
//! repository root is the empty string.

/// Directory containing `path`, or `""` at the root
pub fn parent_dir(path: &str) -> &str {
    path.rsplit_once('/').map_or("", |(dir, _)| dir)
}

/// Final component of `path`
pub fn file_name(path: &str) -> &str {
    path.rsplit_once('/').map_or(path, |(_, name)| name)
}

/// Every directory enclosing `path`, innermost first, ending with the root
pub fn ancestor_dirs(path: &str) -> Vec<&str> {
    let mut dirs = Vec::new();
    let mut current = path;
    while !current.is_empty() {
        current = parent_dir(current);
        dirs.push(current);
    }
    dirs
}

/// Render a directory for display
pub fn display_dir(dir: &str) -> &str {
    if dir.is_empty() { "." } else { dir }
}
