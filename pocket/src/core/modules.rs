//! Module (shim) directory derivation.

use std::collections::BTreeSet;

use crate::core::identity::ROOT_DIR;
use crate::core::pattern::PathPattern;

/// Directories where a wrapper entry point must exist.
///
/// Always starts with the root. Literal include patterns contribute their own
/// directory; regex patterns contribute the shallowest listed directories they
/// match as a whole, so `tools/.*` yields `tools/a` but not `tools/a/x`.
/// Sub-directories reached only through prefix matching or detection are
/// never module directories.
pub fn derive_module_directories(includes: &[PathPattern], all_dirs: &[String]) -> Vec<String> {
    let mut found = BTreeSet::new();
    for pattern in includes {
        if pattern.is_literal() {
            found.insert(pattern.as_str().to_string());
            continue;
        }
        let matched: Vec<&String> = all_dirs
            .iter()
            .filter(|dir| pattern.matches_exactly(dir))
            .collect();
        for dir in &matched {
            let nested = matched.iter().any(|other| is_strict_subpath(dir, other));
            if !nested {
                found.insert((*dir).clone());
            }
        }
    }
    found.remove(ROOT_DIR);

    let mut dirs = Vec::with_capacity(found.len() + 1);
    dirs.push(ROOT_DIR.to_string());
    dirs.extend(found);
    dirs
}

fn is_strict_subpath(dir: &str, ancestor: &str) -> bool {
    dir.strip_prefix(ancestor)
        .is_some_and(|rest| rest.starts_with('/'))
}
