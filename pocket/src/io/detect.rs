//! Ready-made detect functions.

use std::path::Path;
use std::sync::Arc;

use tracing::trace;

use crate::core::identity::ROOT_DIR;
use crate::core::resolve::DetectFn;

/// Keep candidate directories containing at least one of `markers`
/// (for example `go.mod` or `pyproject.toml`).
pub fn detect_by_file<S: AsRef<str>>(markers: &[S]) -> DetectFn {
    let markers: Vec<String> = markers.iter().map(|m| m.as_ref().to_string()).collect();
    Arc::new(move |candidates: &[String], root: &Path| {
        candidates
            .iter()
            .filter(|dir| {
                let base = if dir.as_str() == ROOT_DIR {
                    root.to_path_buf()
                } else {
                    root.join(dir.as_str())
                };
                let found = markers.iter().any(|marker| base.join(marker).is_file());
                trace!(dir = %dir, found, "detect by file");
                found
            })
            .cloned()
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{dirs, make_repo};

    #[test]
    fn keeps_directories_with_marker_files() {
        let temp = tempfile::tempdir().expect("tempdir");
        make_repo(
            temp.path(),
            &["api", "web", "docs"],
            &["go.mod", "api/go.mod", "web/pyproject.toml"],
        );
        let detect = detect_by_file(&["go.mod", "pyproject.toml"]);

        let found = detect(&dirs(&[".", "api", "web", "docs"]), temp.path());

        assert_eq!(found, dirs(&[".", "api", "web"]));
    }

    #[test]
    fn marker_directories_do_not_count() {
        let temp = tempfile::tempdir().expect("tempdir");
        make_repo(temp.path(), &["api/go.mod"], &[]);
        let detect = detect_by_file(&["go.mod"]);
        assert!(detect(&dirs(&["api"]), temp.path()).is_empty());
    }
}
