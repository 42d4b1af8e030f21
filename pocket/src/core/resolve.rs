//! Scope resolution: which directories a scope, and each task inside it, runs in.
//!
//! Pure set algebra over the candidate directory listing. Nesting narrows:
//! an inner scope only ever filters what its parent already resolved.

use std::path::Path;
use std::sync::Arc;

use crate::core::identity::ROOT_DIR;
use crate::core::pattern::PathPattern;

/// Custom directory discovery: `(candidates, repo root) -> directories`.
pub type DetectFn = Arc<dyn Fn(&[String], &Path) -> Vec<String> + Send + Sync>;

/// Directories a scope resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// No include pattern or detect function anywhere up the chain; tasks run at the root.
    Unconstrained,
    Dirs(Vec<String>),
}

impl Resolution {
    /// Directories a task under this resolution starts from.
    pub fn base_dirs(&self) -> Vec<String> {
        match self {
            Resolution::Unconstrained => vec![ROOT_DIR.to_string()],
            Resolution::Dirs(dirs) => dirs.clone(),
        }
    }

    /// Combine the resolutions of one scope reached from several places in a tree.
    pub fn merge(self, other: Resolution) -> Resolution {
        match (self, other) {
            (Resolution::Unconstrained, Resolution::Unconstrained) => Resolution::Unconstrained,
            (left, right) => {
                let mut dirs = left.base_dirs();
                for dir in right.base_dirs() {
                    if !dirs.contains(&dir) {
                        dirs.push(dir);
                    }
                }
                Resolution::Dirs(dirs)
            }
        }
    }
}

/// One exclude pattern, optionally restricted to named tasks.
#[derive(Debug, Clone)]
pub struct ExcludeRule {
    pub pattern: PathPattern,
    /// Empty means every task in the scope.
    pub tasks: Vec<String>,
}

impl ExcludeRule {
    pub fn is_scope_wide(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn applies_to(&self, base_name: &str, effective_name: &str) -> bool {
        self.is_scope_wide()
            || self
                .tasks
                .iter()
                .any(|task| task == base_name || task == effective_name)
    }
}

/// Inputs for resolving one scope.
pub struct ScopeInput<'a> {
    /// Resolution of the enclosing scope.
    pub parent: &'a Resolution,
    /// Every directory in the repository listing.
    pub all_dirs: &'a [String],
    /// Excludes accumulated from ancestor scopes.
    pub ancestor_excludes: &'a [ExcludeRule],
    pub includes: &'a [PathPattern],
    pub detect: Option<&'a DetectFn>,
    pub root: &'a Path,
}

/// Resolve the directories for one scope.
///
/// Ancestor scope-wide excludes prune the candidates before detection or
/// include matching sees them. A detect function supersedes include patterns;
/// with neither, the (pruned) parent resolution is inherited.
pub fn resolve_scope(input: &ScopeInput<'_>) -> Resolution {
    let candidates: Vec<String> = match input.parent {
        Resolution::Unconstrained => input.all_dirs.to_vec(),
        Resolution::Dirs(dirs) => dirs.clone(),
    };
    let filtered: Vec<String> = candidates
        .into_iter()
        .filter(|dir| {
            !input
                .ancestor_excludes
                .iter()
                .any(|rule| rule.is_scope_wide() && rule.pattern.matches(dir))
        })
        .collect();

    if let Some(detect) = input.detect {
        let detected = detect(&filtered, input.root);
        // Detection may only narrow: anything outside the candidates is dropped.
        let dirs = filtered
            .iter()
            .filter(|dir| detected.contains(dir))
            .cloned()
            .collect();
        return Resolution::Dirs(dirs);
    }

    if !input.includes.is_empty() {
        let dirs = filtered
            .into_iter()
            .filter(|dir| input.includes.iter().any(|pattern| pattern.matches(dir)))
            .collect();
        return Resolution::Dirs(dirs);
    }

    match input.parent {
        Resolution::Unconstrained => Resolution::Unconstrained,
        Resolution::Dirs(_) => Resolution::Dirs(filtered),
    }
}

/// Final directories for one task: the scope's resolution minus every active
/// exclude that targets all tasks or this task by name.
pub fn task_paths(
    resolution: &Resolution,
    excludes: &[ExcludeRule],
    base_name: &str,
    effective_name: &str,
) -> Vec<String> {
    resolution
        .base_dirs()
        .into_iter()
        .filter(|dir| {
            !excludes
                .iter()
                .any(|rule| rule.applies_to(base_name, effective_name) && rule.pattern.matches(dir))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dirs(items: &[&str]) -> Vec<String> {
        items.iter().map(|item| item.to_string()).collect()
    }

    fn patterns(items: &[&str]) -> Vec<PathPattern> {
        items
            .iter()
            .map(|item| PathPattern::new(item).expect("pattern"))
            .collect()
    }

    fn exclude(pattern: &str, tasks: &[&str]) -> ExcludeRule {
        ExcludeRule {
            pattern: PathPattern::new(pattern).expect("pattern"),
            tasks: dirs(tasks),
        }
    }

    fn resolve(
        parent: &Resolution,
        all: &[String],
        excludes: &[ExcludeRule],
        includes: &[PathPattern],
    ) -> Resolution {
        resolve_scope(&ScopeInput {
            parent,
            all_dirs: all,
            ancestor_excludes: excludes,
            includes,
            detect: None,
            root: Path::new("."),
        })
    }

    #[test]
    fn include_keeps_matching_directories() {
        let all = dirs(&[".", "pkg", "services", "services/api"]);
        let resolved = resolve(&Resolution::Unconstrained, &all, &[], &patterns(&["services"]));
        assert_eq!(resolved, Resolution::Dirs(dirs(&["services", "services/api"])));
    }

    #[test]
    fn nested_includes_intersect() {
        let all = dirs(&[".", "pkg", "services", "services/api", "services/web"]);
        let outer = resolve(&Resolution::Unconstrained, &all, &[], &patterns(&["services"]));
        let inner = resolve(&outer, &all, &[], &patterns(&["services/api", "pkg"]));
        assert_eq!(inner, Resolution::Dirs(dirs(&["services/api"])));
    }

    #[test]
    fn bare_scope_inherits_parent() {
        let all = dirs(&[".", "pkg"]);
        assert_eq!(
            resolve(&Resolution::Unconstrained, &all, &[], &[]),
            Resolution::Unconstrained
        );
        let parent = Resolution::Dirs(dirs(&["pkg"]));
        assert_eq!(resolve(&parent, &all, &[], &[]), parent);
    }

    #[test]
    fn ancestor_scope_wide_excludes_prune_before_include() {
        let all = dirs(&[".", "services", "services/api", "services/legacy"]);
        let excludes = vec![exclude("services/legacy", &[]), exclude("services/api", &["lint"])];
        let resolved = resolve(&Resolution::Unconstrained, &all, &excludes, &patterns(&["services"]));
        // The task-specific exclude must not prune scope candidates.
        assert_eq!(resolved, Resolution::Dirs(dirs(&["services", "services/api"])));
    }

    #[test]
    fn detect_supersedes_include_and_only_narrows() {
        let all = dirs(&[".", "a", "b", "c"]);
        let detect: DetectFn = Arc::new(|candidates: &[String], _root: &Path| {
            let mut found: Vec<String> = candidates
                .iter()
                .filter(|dir| dir.as_str() != "b")
                .cloned()
                .collect();
            found.push("elsewhere".to_string());
            found
        });
        let includes = patterns(&["b"]);
        let resolved = resolve_scope(&ScopeInput {
            parent: &Resolution::Dirs(dirs(&["a", "b"])),
            all_dirs: &all,
            ancestor_excludes: &[],
            includes: &includes,
            detect: Some(&detect),
            root: Path::new("."),
        });
        assert_eq!(resolved, Resolution::Dirs(dirs(&["a"])));
    }

    #[test]
    fn task_paths_apply_task_specific_excludes() {
        let resolution = Resolution::Dirs(dirs(&["pkg", "services"]));
        let excludes = vec![exclude("pkg", &["t2"])];
        assert_eq!(
            task_paths(&resolution, &excludes, "t1", "t1"),
            dirs(&["pkg", "services"])
        );
        assert_eq!(task_paths(&resolution, &excludes, "t2", "t2"), dirs(&["services"]));
    }

    #[test]
    fn unconstrained_task_runs_at_root() {
        assert_eq!(
            task_paths(&Resolution::Unconstrained, &[], "t", "t"),
            dirs(&["."])
        );
    }

    #[test]
    fn merge_unions_directories() {
        let merged = Resolution::Dirs(dirs(&["a"])).merge(Resolution::Dirs(dirs(&["b", "a"])));
        assert_eq!(merged, Resolution::Dirs(dirs(&["a", "b"])));
        let mixed = Resolution::Unconstrained.merge(Resolution::Dirs(dirs(&["a"])));
        assert_eq!(mixed, Resolution::Dirs(dirs(&[".", "a"])));
    }
}
