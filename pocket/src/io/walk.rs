//! One-shot directory listing of the repository.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, instrument};
use walkdir::{DirEntry, WalkDir};

use crate::core::identity::ROOT_DIR;
use crate::io::config::WalkConfig;

fn is_pruned(entry: &DirEntry, config: &WalkConfig) -> bool {
    // Never prune the root itself.
    if entry.depth() == 0 {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    if !config.include_hidden && name.starts_with('.') {
        return true;
    }
    config.skip_dirs.iter().any(|skip| skip == name.as_ref())
}

/// List every directory under `root` as sorted, `/`-separated relative paths.
/// The root is `.` and is always first.
#[instrument(skip_all, fields(root = %root.display()))]
pub fn list_directories(root: &Path, config: &WalkConfig) -> Result<Vec<String>> {
    let mut dirs = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| entry.file_type().is_dir() && !is_pruned(entry, config));
    for entry in walker {
        let entry = entry.with_context(|| format!("walk {}", root.display()))?;
        if entry.depth() == 0 {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root)
            .with_context(|| format!("relativize {}", entry.path().display()))?;
        let parts: Vec<String> = relative
            .components()
            .map(|part| part.as_os_str().to_string_lossy().into_owned())
            .collect();
        dirs.push(parts.join("/"));
    }
    dirs.sort();
    dirs.insert(0, ROOT_DIR.to_string());
    debug!(count = dirs.len(), "listed directories");
    Ok(dirs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::make_repo;

    #[test]
    fn lists_sorted_relative_directories() {
        let temp = tempfile::tempdir().expect("tempdir");
        make_repo(
            temp.path(),
            &["services/web", "services/api", "pkg"],
            &["pkg/go.mod"],
        );

        let dirs = list_directories(temp.path(), &WalkConfig::default()).expect("list");

        assert_eq!(dirs, vec![".", "pkg", "services", "services/api", "services/web"]);
    }

    #[test]
    fn skips_hidden_and_configured_directories() {
        let temp = tempfile::tempdir().expect("tempdir");
        make_repo(
            temp.path(),
            &[".git/objects", "node_modules/left-pad", ".config", "app/target", "app"],
            &[],
        );

        let dirs = list_directories(temp.path(), &WalkConfig::default()).expect("list");
        assert_eq!(dirs, vec![".", "app"]);

        let config = WalkConfig {
            include_hidden: true,
            ..WalkConfig::default()
        };
        let dirs = list_directories(temp.path(), &config).expect("list");
        assert_eq!(dirs, vec![".", ".config", "app"]);
    }
}
