//! Task identity: effective names and dedup keys.

use std::fmt;

/// Root directory marker used for unscoped and global tasks.
pub const ROOT_DIR: &str = ".";

/// Dedup key for one task execution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId {
    pub name: String,
    pub path: String,
}

impl TaskId {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }

    /// Key for a global task: base name at the root, whatever the suffix or path.
    pub fn global(base_name: impl Into<String>) -> Self {
        Self::new(base_name, ROOT_DIR)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.path)
    }
}

/// `base` or `base:suffix`.
pub fn effective_name(base: &str, suffix: Option<&str>) -> String {
    match suffix {
        Some(suffix) if !suffix.is_empty() => format!("{base}:{suffix}"),
        _ => base.to_string(),
    }
}

/// Nest `inner` under an already-accumulated suffix.
pub fn compose_suffix(outer: Option<&str>, inner: &str) -> String {
    match outer {
        Some(outer) if !outer.is_empty() => format!("{outer}:{inner}"),
        _ => inner.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_id_displays_name_at_path() {
        assert_eq!(TaskId::new("lint", "pkg").to_string(), "lint@pkg");
        assert_eq!(TaskId::global("fmt").to_string(), "fmt@.");
    }

    #[test]
    fn suffixes_compose_with_colons() {
        let suffix = compose_suffix(None, "py");
        let suffix = compose_suffix(Some(&suffix), "3.9");
        assert_eq!(effective_name("test", Some(&suffix)), "test:py:3.9");
        assert_eq!(effective_name("test", None), "test");
        assert_eq!(effective_name("test", Some("")), "test");
    }
}
