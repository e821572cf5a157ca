//! Lexical path helpers.
//!
//! Locations and include paths are emitted into generated code, so they
//! must not depend on the host's separator or on symlinks.

use std::path::{Component, Path, PathBuf};

/// Remove `.` components and fold `..` into the preceding component.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if out.file_name().is_some() {
                    out.pop();
                } else if !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Absolute, normalized form of `path` (relative paths resolve against the
/// current directory).
pub fn absolute(path: &Path) -> PathBuf {
    let abs = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    normalize(&abs)
}

/// Whether `path` lies under `root`, compared component-wise.
pub fn is_under(path: &Path, root: &Path) -> bool {
    absolute(path).starts_with(absolute(root))
}

/// Join path components with `/`.
pub fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
        .replace("//", "/")
}

/// `path` relative to `root`, slash-separated.
///
/// Paths outside `root` are returned normalized but otherwise unchanged.
pub fn relative_to(path: &Path, root: &Path) -> String {
    let abs = absolute(path);
    let root = absolute(root);
    match abs.strip_prefix(&root) {
        Ok(rel) => to_slash(rel),
        Err(_) => to_slash(&normalize(path)),
    }
}
