//! Per-task working directory (`chdir`/`getcwd`, spec section 4.5).
//!
//! `Task::cwd` holds the absolute path directly rather than through a
//! wrapper type -- there is nowhere else in the kernel a bare `String`
//! cwd would be ambiguous with. This module is just the normalization
//! and resolution logic the teacher's `ProcessCwd` wrapped.

#[cfg(feature = "alloc")]
extern crate alloc;

#[cfg(feature = "alloc")]
use alloc::string::String;
#[cfg(feature = "alloc")]
use alloc::vec::Vec;

use crate::error::KernelError;
use crate::sched::task::Task;

/// `chdir(path)`: resolve `path` against the task's current directory and,
/// if it names a directory in the VFS, replace the cwd with it.
pub fn chdir(task: &Task, path: &str) -> Result<(), KernelError> {
    let resolved = {
        let cwd = task.cwd.lock();
        resolve_path(path, &cwd)
    };

    let node = crate::fs::get_vfs()
        .read()
        .resolve_path(&resolved)
        .map_err(|_| KernelError::NotFound)?;
    if node.node_type() != crate::fs::NodeType::Directory {
        return Err(KernelError::NotADirectory);
    }

    *task.cwd.lock() = resolved;
    Ok(())
}

/// `getcwd()`.
pub fn getcwd(task: &Task) -> String {
    task.cwd.lock().clone()
}

/// Resolve `path` relative to the task's cwd (e.g. for `open`, `stat`).
pub fn resolve(task: &Task, path: &str) -> String {
    let cwd = task.cwd.lock();
    resolve_path(path, &cwd)
}

// ---------------------------------------------------------------------------
// Path Resolution and Normalization (free functions)
// ---------------------------------------------------------------------------

/// Resolve a potentially relative path against a given working directory.
///
/// - If `path` starts with `/`, it is treated as absolute and normalized.
/// - Otherwise, `path` is appended to `cwd` with a `/` separator and
///   normalized.
#[cfg(feature = "alloc")]
pub fn resolve_path(path: &str, cwd: &str) -> String {
    if path.starts_with('/') {
        // Absolute path -- just normalize.
        normalize_path(path)
    } else {
        // Relative path -- join with CWD.
        let mut combined = String::with_capacity(cwd.len() + 1 + path.len());
        combined.push_str(cwd);
        if !cwd.ends_with('/') {
            combined.push('/');
        }
        combined.push_str(path);
        normalize_path(&combined)
    }
}

/// Normalize a path by collapsing redundant separators and resolving `.` and
/// `..`.
///
/// The result is always an absolute path starting with `/`. Trailing slashes
/// are removed (except for the root `/` itself).
#[cfg(feature = "alloc")]
pub fn normalize_path(path: &str) -> String {
    let mut components: Vec<&str> = Vec::new();

    for component in path.split('/') {
        match component {
            "" | "." => {
                // Skip empty segments (from `//`) and current-dir markers.
            }
            ".." => {
                // Go up one level, but never above root.
                components.pop();
            }
            other => {
                components.push(other);
            }
        }
    }

    if components.is_empty() {
        return String::from("/");
    }

    let mut result = String::with_capacity(path.len());
    for component in &components {
        result.push('/');
        result.push_str(component);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    // --- normalize_path tests ---

    #[test]
    fn test_normalize_root() {
        assert_eq!(normalize_path("/"), "/");
    }

    #[test]
    fn test_normalize_simple() {
        assert_eq!(normalize_path("/usr/bin"), "/usr/bin");
    }

    #[test]
    fn test_normalize_trailing_slash() {
        assert_eq!(normalize_path("/usr/bin/"), "/usr/bin");
    }

    #[test]
    fn test_normalize_double_slash() {
        assert_eq!(normalize_path("/usr//bin"), "/usr/bin");
    }

    #[test]
    fn test_normalize_triple_slash() {
        assert_eq!(normalize_path("///"), "/");
    }

    #[test]
    fn test_normalize_dot() {
        assert_eq!(normalize_path("/usr/./bin"), "/usr/bin");
    }

    #[test]
    fn test_normalize_dotdot() {
        assert_eq!(normalize_path("/usr/local/../bin"), "/usr/bin");
    }

    #[test]
    fn test_normalize_dotdot_at_root() {
        assert_eq!(normalize_path("/.."), "/");
    }

    #[test]
    fn test_normalize_multiple_dotdot() {
        assert_eq!(normalize_path("/a/b/c/../../d"), "/a/d");
    }

    #[test]
    fn test_normalize_complex() {
        assert_eq!(normalize_path("/usr//local/../bin/./gcc"), "/usr/bin/gcc");
    }

    #[test]
    fn test_normalize_all_dotdot() {
        assert_eq!(normalize_path("/a/b/../../.."), "/");
    }

    // --- resolve_path tests ---

    #[test]
    fn test_resolve_absolute() {
        assert_eq!(resolve_path("/etc/hosts", "/home"), "/etc/hosts");
    }

    #[test]
    fn test_resolve_relative_simple() {
        assert_eq!(resolve_path("foo", "/home"), "/home/foo");
    }

    #[test]
    fn test_resolve_relative_nested() {
        assert_eq!(resolve_path("foo/bar", "/home"), "/home/foo/bar");
    }

    #[test]
    fn test_resolve_relative_dotdot() {
        assert_eq!(resolve_path("../bin", "/usr/local"), "/usr/bin");
    }

    #[test]
    fn test_resolve_dot() {
        assert_eq!(resolve_path(".", "/var/log"), "/var/log");
    }

    #[test]
    fn test_resolve_relative_from_root() {
        assert_eq!(resolve_path("usr/bin", "/"), "/usr/bin");
    }

    #[test]
    fn test_resolve_dotdot_past_root() {
        assert_eq!(resolve_path("../../..", "/a"), "/");
    }

}
