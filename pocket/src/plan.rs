//! Execution plan: where every task of a tree runs for one invocation.
//!
//! Built once per invocation by walking the composition tree against a single
//! directory listing. Read-only afterwards, so it can be shared freely between
//! parallel branches.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, instrument, trace};

use crate::core::identity::{compose_suffix, effective_name};
use crate::core::modules::derive_module_directories;
use crate::core::pattern::{PathPattern, compile_all};
use crate::core::resolve::{ExcludeRule, Resolution, ScopeInput, resolve_scope, task_paths};
use crate::flags::{FlagError, FlagOverrides, Flags};
use crate::io::config::WalkConfig;
use crate::io::walk::list_directories;
use crate::runnable::Runnable;
use crate::scope::Scope;
use crate::task::{Task, TaskBody};

/// Configuration problems found while planning. Nothing has run yet.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("invalid path pattern {pattern:?}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("duplicate task name {0:?}: two different tasks share it")]
    DuplicateTask(String),
    #[error(transparent)]
    InvalidFlag(#[from] FlagError),
}

/// Where one effective task name runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PathInfo {
    /// Include patterns of the innermost scope that declared any; decides
    /// which wrapper entry points list the task.
    pub include: Vec<String>,
    /// Resolved run directories.
    pub paths: Vec<String>,
}

#[derive(Debug)]
pub struct Plan {
    root: PathBuf,
    candidates: Vec<String>,
    tree: Runnable,
    tasks: Vec<Arc<Task>>,
    owners: BTreeMap<String, Arc<Task>>,
    mappings: BTreeMap<String, PathInfo>,
    scopes: HashMap<usize, Resolution>,
    module_dirs: Vec<String>,
}

impl Plan {
    /// List the repository's directories once and plan `tree` against them.
    #[instrument(skip_all, fields(root = %root.display()))]
    pub fn build(root: &Path, tree: Runnable, walk: &WalkConfig) -> Result<Plan> {
        let candidates = list_directories(root, walk).context("list directories")?;
        let plan = Self::from_candidates(root, candidates, tree)?;
        info!(
            tasks = plan.tasks.len(),
            modules = plan.module_dirs.len(),
            "plan built"
        );
        Ok(plan)
    }

    /// Plan `tree` against an explicit directory listing (relative, `/`-separated).
    pub fn from_candidates(
        root: impl Into<PathBuf>,
        candidates: Vec<String>,
        tree: Runnable,
    ) -> Result<Plan, PlanError> {
        let root = root.into();
        let mut walker = Walker::new(&root, &candidates);
        walker.walk(&tree)?;
        let module_dirs = derive_module_directories(&walker.includes, &candidates);
        let Walker {
            tasks,
            owners,
            mappings,
            scopes,
            ..
        } = walker;
        Ok(Plan {
            root,
            candidates,
            tree,
            tasks,
            owners,
            mappings,
            scopes,
            module_dirs,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn tree(&self) -> &Runnable {
        &self.tree
    }

    /// The directory listing the plan was built against.
    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    /// Every planned task once, in first-visit order. Skipped tasks are absent.
    pub fn tasks(&self) -> &[Arc<Task>] {
        &self.tasks
    }

    pub fn path_info(&self, effective_name: &str) -> Option<&PathInfo> {
        self.mappings.get(effective_name)
    }

    /// Effective name -> path info, sorted by name.
    pub fn path_mappings(&self) -> &BTreeMap<String, PathInfo> {
        &self.mappings
    }

    /// Task declaring an effective name.
    pub fn task_for(&self, effective_name: &str) -> Option<&Arc<Task>> {
        self.owners.get(effective_name)
    }

    /// Look up a task by effective name, falling back to base name.
    pub fn find_task(&self, name: &str) -> Option<&Arc<Task>> {
        self.task_for(name)
            .or_else(|| self.tasks.iter().find(|task| task.name() == name))
    }

    /// Directories needing a wrapper entry point; always starts with `.`.
    pub fn module_directories(&self) -> &[String] {
        &self.module_dirs
    }

    pub(crate) fn scope_resolution(&self, scope: &Arc<Scope>) -> Option<&Resolution> {
        self.scopes.get(&scope_key(scope))
    }
}

/// Scopes are identified by allocation; the plan keeps the tree alive, so
/// keys stay unique for the plan's lifetime.
fn scope_key(scope: &Arc<Scope>) -> usize {
    Arc::as_ptr(scope) as usize
}

/// Depth-first walker carrying the active scope state as stacks.
struct Walker<'a> {
    root: &'a Path,
    all_dirs: &'a [String],
    resolution: Resolution,
    excludes: Vec<ExcludeRule>,
    skips: Vec<String>,
    suffix: Option<String>,
    flags: BTreeMap<String, FlagOverrides>,
    visibility: Vec<String>,
    includes: Vec<PathPattern>,
    tasks: Vec<Arc<Task>>,
    owners: BTreeMap<String, Arc<Task>>,
    mappings: BTreeMap<String, PathInfo>,
    scopes: HashMap<usize, Resolution>,
}

impl<'a> Walker<'a> {
    fn new(root: &'a Path, all_dirs: &'a [String]) -> Self {
        Self {
            root,
            all_dirs,
            resolution: Resolution::Unconstrained,
            excludes: Vec::new(),
            skips: Vec::new(),
            suffix: None,
            flags: BTreeMap::new(),
            visibility: Vec::new(),
            includes: Vec::new(),
            tasks: Vec::new(),
            owners: BTreeMap::new(),
            mappings: BTreeMap::new(),
            scopes: HashMap::new(),
        }
    }

    fn walk(&mut self, node: &Runnable) -> Result<(), PlanError> {
        match node {
            Runnable::Task(task) => self.visit_task(task),
            Runnable::Serial(children) | Runnable::Parallel(children) => {
                for child in children {
                    self.walk(child)?;
                }
                Ok(())
            }
            Runnable::Scope(scope) => self.visit_scope(scope),
        }
    }

    fn visit_scope(&mut self, scope: &Arc<Scope>) -> Result<(), PlanError> {
        let includes = compile_all(scope.includes()).map_err(invalid_pattern)?;
        let mut own_excludes = Vec::with_capacity(scope.excludes().len());
        for spec in scope.excludes() {
            let pattern = PathPattern::new(&spec.pattern).map_err(|source| {
                PlanError::InvalidPattern {
                    pattern: spec.pattern.clone(),
                    source,
                }
            })?;
            own_excludes.push(ExcludeRule {
                pattern,
                tasks: spec.tasks.clone(),
            });
        }

        let resolution = resolve_scope(&ScopeInput {
            parent: &self.resolution,
            all_dirs: self.all_dirs,
            ancestor_excludes: &self.excludes,
            includes: &includes,
            detect: scope.detect(),
            root: self.root,
        });
        debug!(
            includes = ?scope.includes(),
            detect = scope.detect().is_some(),
            resolution = ?resolution,
            "scope resolved"
        );

        let key = scope_key(scope);
        let recorded = match self.scopes.remove(&key) {
            Some(previous) => previous.merge(resolution.clone()),
            None => resolution.clone(),
        };
        self.scopes.insert(key, recorded);

        let saved_visibility = if scope.includes().is_empty() {
            None
        } else {
            Some(std::mem::replace(
                &mut self.visibility,
                includes.iter().map(|p| p.as_str().to_string()).collect(),
            ))
        };
        self.includes.extend(includes);
        let saved_resolution = std::mem::replace(&mut self.resolution, resolution);
        let excludes_len = self.excludes.len();
        self.excludes.extend(own_excludes);
        let skips_len = self.skips.len();
        self.skips.extend(scope.skipped().iter().cloned());
        let saved_suffix = self.suffix.clone();
        if let Some(suffix) = scope.name_suffix() {
            self.suffix = Some(compose_suffix(self.suffix.as_deref(), suffix));
        }
        let saved_flags = if scope.flag_overrides().is_empty() {
            None
        } else {
            let mut merged = self.flags.clone();
            for (task, overrides) in scope.flag_overrides() {
                merged
                    .entry(task.clone())
                    .or_default()
                    .extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
            Some(std::mem::replace(&mut self.flags, merged))
        };

        let result = self.walk(scope.inner());

        if let Some(flags) = saved_flags {
            self.flags = flags;
        }
        self.suffix = saved_suffix;
        self.skips.truncate(skips_len);
        self.excludes.truncate(excludes_len);
        self.resolution = saved_resolution;
        if let Some(visibility) = saved_visibility {
            self.visibility = visibility;
        }
        result
    }

    fn visit_task(&mut self, task: &Arc<Task>) -> Result<(), PlanError> {
        if self.skips.iter().any(|skipped| skipped == task.name()) {
            debug!(task = task.name(), "task skipped by scope");
            return Ok(());
        }

        let name = effective_name(task.name(), self.suffix.as_deref());
        if let Some(overrides) = self.flags.get(task.name()) {
            Flags::resolve(&name, task.flags(), &[overrides])?;
        }
        match self.owners.get(&name) {
            Some(owner) if !Arc::ptr_eq(owner, task) => {
                return Err(PlanError::DuplicateTask(name));
            }
            Some(_) => {}
            None => {
                self.owners.insert(name.clone(), Arc::clone(task));
            }
        }
        if !self.tasks.iter().any(|known| Arc::ptr_eq(known, task)) {
            self.tasks.push(Arc::clone(task));
        }

        let paths = task_paths(&self.resolution, &self.excludes, task.name(), &name);
        trace!(task = %name, paths = ?paths, "task paths");
        let info = self.mappings.entry(name).or_default();
        for pattern in &self.visibility {
            if !info.include.contains(pattern) {
                info.include.push(pattern.clone());
            }
        }
        for dir in paths {
            if !info.paths.contains(&dir) {
                info.paths.push(dir);
            }
        }

        if let TaskBody::Runnable(body) = task.body() {
            self.walk(body)?;
        }
        Ok(())
    }
}

fn invalid_pattern((pattern, source): (String, regex::Error)) -> PlanError {
    PlanError::InvalidPattern { pattern, source }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runnable::{parallel, serial};
    use crate::test_support::{dirs, entries, new_log, recording_task};

    fn plan(tree: Runnable, listing: &[&str]) -> Plan {
        Plan::from_candidates("/repo", dirs(listing), tree).expect("plan")
    }

    fn paths(plan: &Plan, name: &str) -> Vec<String> {
        plan.path_info(name)
            .map(|info| info.paths.clone())
            .unwrap_or_default()
    }

    const LISTING: &[&str] = &[".", "pkg", "services", "services/api", "services/web"];

    #[test]
    fn unscoped_task_runs_at_root() {
        let log = new_log();
        let plan = plan(recording_task("lint", &log).into(), LISTING);
        assert_eq!(paths(&plan, "lint"), vec!["."]);
    }

    #[test]
    fn nested_scopes_intersect() {
        let log = new_log();
        let inner = Scope::new(recording_task("test", &log))
            .include_path("services/api")
            .include_path("pkg");
        let tree = Scope::new(inner).include_path("services").into();
        let plan = plan(tree, LISTING);
        assert_eq!(paths(&plan, "test"), vec!["services/api"]);
    }

    #[test]
    fn task_specific_exclude_only_hits_that_task() {
        let log = new_log();
        let t1 = recording_task("t1", &log).into_ref();
        let t2 = recording_task("t2", &log).into_ref();
        let tree = Scope::new(parallel([t1.clone().into(), t2.clone().into()]))
            .include_path("pkg")
            .include_path("services")
            .exclude_task(&t2, ["pkg"])
            .into();
        let plan = plan(tree, LISTING);

        let t1_paths = paths(&plan, "t1");
        let t2_paths = paths(&plan, "t2");
        assert!(t1_paths.contains(&"pkg".to_string()));
        assert!(!t2_paths.contains(&"pkg".to_string()));
        assert!(t2_paths.contains(&"services".to_string()));
    }

    #[test]
    fn sibling_scopes_do_not_share_excludes() {
        let log = new_log();
        let a = recording_task("a", &log);
        let b = recording_task("b", &log);
        let tree = serial([
            Scope::new(a).include_path("services").exclude_path("services/web").into(),
            Scope::new(b).include_path("services").into(),
        ]);
        let plan = plan(tree, LISTING);
        assert_eq!(paths(&plan, "a"), vec!["services", "services/api"]);
        assert_eq!(paths(&plan, "b"), vec!["services", "services/api", "services/web"]);
    }

    #[test]
    fn ancestor_exclude_prunes_inner_candidates() {
        let log = new_log();
        let inner = Scope::new(recording_task("t", &log)).with_detect(|candidates, _root| {
            candidates.to_vec()
        });
        let tree = Scope::new(inner)
            .include_path("services")
            .exclude_path("services/web")
            .into();
        let plan = plan(tree, LISTING);
        assert_eq!(paths(&plan, "t"), vec!["services", "services/api"]);
    }

    #[test]
    fn skipped_task_is_dropped() {
        let log = new_log();
        let keep = recording_task("keep", &log).into_ref();
        let drop = recording_task("drop", &log).into_ref();
        let tree = Scope::new(serial([keep.clone().into(), drop.clone().into()]))
            .skip_task(&drop)
            .into();
        let plan = plan(tree, LISTING);
        let names: Vec<&str> = plan.tasks().iter().map(|task| task.name()).collect();
        assert_eq!(names, vec!["keep"]);
        assert!(plan.path_info("drop").is_none());
    }

    #[test]
    fn repeated_task_is_listed_once_and_paths_merge() {
        let log = new_log();
        let lint = recording_task("lint", &log).into_ref();
        let tree = serial([
            Scope::new(lint.clone()).include_path("pkg").into(),
            Scope::new(lint.clone()).include_path("services/api").into(),
        ]);
        let plan = plan(tree, LISTING);
        assert_eq!(plan.tasks().len(), 1);
        assert_eq!(paths(&plan, "lint"), vec!["pkg", "services/api"]);
        assert_eq!(
            plan.path_info("lint").map(|info| info.include.clone()),
            Some(vec!["pkg".to_string(), "services/api".to_string()])
        );
    }

    #[test]
    fn distinct_tasks_with_same_name_are_rejected() {
        let log = new_log();
        let tree = serial([
            recording_task("dup", &log).into(),
            recording_task("dup", &log).into(),
        ]);
        let err = Plan::from_candidates("/repo", dirs(LISTING), tree).unwrap_err();
        assert!(matches!(err, PlanError::DuplicateTask(name) if name == "dup"));
    }

    #[test]
    fn name_suffix_creates_distinct_entries() {
        let log = new_log();
        let test = recording_task("test", &log).into_ref();
        let tree = serial([
            Scope::new(test.clone()).with_name_suffix("3.9").into(),
            Scope::new(test.clone()).with_name_suffix("3.10").into(),
        ]);
        let plan = plan(tree, LISTING);
        assert_eq!(plan.tasks().len(), 1);
        assert_eq!(paths(&plan, "test:3.9"), vec!["."]);
        assert_eq!(paths(&plan, "test:3.10"), vec!["."]);
        assert!(plan.find_task("test").is_some());
        assert!(plan.find_task("test:3.9").is_some());
    }

    #[test]
    fn module_directories_come_from_includes_only() {
        let log = new_log();
        let inner = Scope::new(recording_task("t", &log)).with_detect(|candidates, _root| {
            candidates.to_vec()
        });
        let tree = serial([
            Scope::new(inner).include_path("services").into(),
            Scope::new(recording_task("u", &log)).include_path("pkg").into(),
        ]);
        let plan = plan(tree, LISTING);
        assert_eq!(plan.module_directories(), [".", "pkg", "services"]);
    }

    #[test]
    fn empty_tree_still_has_root_module() {
        let plan = plan(serial([]), LISTING);
        assert_eq!(plan.module_directories(), ["."]);
        assert!(plan.tasks().is_empty());
    }

    #[test]
    fn invalid_pattern_aborts_planning() {
        let log = new_log();
        let tree = Scope::new(recording_task("t", &log)).include_path("bad(").into();
        let err = Plan::from_candidates("/repo", dirs(LISTING), tree).unwrap_err();
        assert!(matches!(err, PlanError::InvalidPattern { .. }));
    }

    #[test]
    fn bad_scope_flag_override_aborts_planning() {
        let log = new_log();
        let first = recording_task("a", &log);
        let second = recording_task("b", &log).flag("fix", false, "").into_ref();

        let unknown = serial([
            first.into(),
            Scope::new(second.clone()).with_flag(&second, "nope", true).into(),
        ]);
        let err = Plan::from_candidates("/repo", dirs(LISTING), unknown).unwrap_err();
        assert!(
            matches!(&err, PlanError::InvalidFlag(FlagError::Unknown { flag, .. }) if flag == "nope"),
            "{err}"
        );

        let wrong_type = Scope::new(second.clone()).with_flag(&second, "fix", "yes").into();
        let err = Plan::from_candidates("/repo", dirs(LISTING), wrong_type).unwrap_err();
        assert!(matches!(err, PlanError::InvalidFlag(FlagError::InvalidValue { .. })), "{err}");
        assert!(entries(&log).is_empty());
    }

    #[test]
    fn inner_scope_flag_overrides_win() {
        let log = new_log();
        let task = recording_task("t", &log).flag("level", 1i64, "").into_ref();
        let inner = Scope::new(task.clone()).with_flag(&task, "level", 3i64);
        let tree = Scope::new(inner).with_flag(&task, "level", "high").into();
        // The outer string override is replaced before the task sees it.
        assert!(Plan::from_candidates("/repo", dirs(LISTING), tree).is_ok());
    }

    #[test]
    fn composed_task_bodies_are_planned() {
        let log = new_log();
        let inner = recording_task("inner", &log);
        let outer = Task::composed("outer", Scope::new(inner).include_path("pkg"));
        let plan = plan(outer.into(), LISTING);
        assert_eq!(paths(&plan, "outer"), vec!["."]);
        assert_eq!(paths(&plan, "inner"), vec!["pkg"]);
    }
}
