//! The execution environment threaded through a run.
//!
//! [`Env`] is immutable: scopes, parallel branches and task bodies derive
//! modified copies, so sibling branches never observe each other's suffix,
//! path or flag values.

use std::any::Any;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use crate::core::identity::{ROOT_DIR, compose_suffix};
use crate::flags::{FlagOverrides, Flags};
use crate::io::process::{DEFAULT_INTERRUPT_GRACE, run_command};
use crate::output::{Output, SharedWriter};
use crate::plan::Plan;
use crate::scope::Scope;
use crate::tracker::ExecutionTracker;

/// Value injected by a scope for the tasks beneath it.
pub type ContextValue = Arc<dyn Any + Send + Sync>;

/// Environment variable naming the directory a nested wrapper invocation is scoped to.
pub const ACTIVE_SCOPE_VAR: &str = "POK_CONTEXT";

#[derive(Clone)]
pub struct Env {
    plan: Arc<Plan>,
    tracker: Arc<ExecutionTracker>,
    output: Output,
    cancel: CancellationToken,
    path: String,
    in_scope: bool,
    verbose: bool,
    auto_exec: bool,
    force_run: bool,
    name_suffix: Option<String>,
    target: Option<String>,
    active_path: Option<String>,
    interrupt_grace: Duration,
    scope_flags: Arc<BTreeMap<String, FlagOverrides>>,
    cli_flags: Arc<FlagOverrides>,
    task_name: Option<String>,
    flags: Arc<Flags>,
    values: Arc<BTreeMap<String, ContextValue>>,
}

impl Env {
    /// Fresh environment for one invocation: root path, new tracker, stdio
    /// output, auto-execution mode.
    pub fn new(plan: Arc<Plan>) -> Self {
        Self {
            plan,
            tracker: Arc::new(ExecutionTracker::new()),
            output: Output::stdio(),
            cancel: CancellationToken::new(),
            path: ROOT_DIR.to_string(),
            in_scope: false,
            verbose: false,
            auto_exec: true,
            force_run: false,
            name_suffix: None,
            target: None,
            active_path: None,
            interrupt_grace: DEFAULT_INTERRUPT_GRACE,
            scope_flags: Arc::new(BTreeMap::new()),
            cli_flags: Arc::new(FlagOverrides::new()),
            task_name: None,
            flags: Arc::new(Flags::default()),
            values: Arc::new(BTreeMap::new()),
        }
    }

    /// Run the plan's whole tree.
    pub fn run_tree(&self) -> Result<()> {
        let plan = Arc::clone(&self.plan);
        plan.tree().run(self)
    }

    pub fn with_output(&self, output: Output) -> Self {
        Self {
            output,
            ..self.clone()
        }
    }

    pub fn with_verbose(&self, verbose: bool) -> Self {
        Self {
            verbose,
            ..self.clone()
        }
    }

    pub fn with_cancel(&self, cancel: CancellationToken) -> Self {
        Self {
            cancel,
            ..self.clone()
        }
    }

    pub fn with_interrupt_grace(&self, interrupt_grace: Duration) -> Self {
        Self {
            interrupt_grace,
            ..self.clone()
        }
    }

    /// Run only tasks whose effective or base name is `task`, with `cli_flags`
    /// layered over their flags. Leaves auto-execution mode, so manual tasks run.
    pub fn with_target(&self, task: impl Into<String>, cli_flags: FlagOverrides) -> Self {
        Self {
            target: Some(task.into()),
            cli_flags: Arc::new(cli_flags),
            auto_exec: false,
            ..self.clone()
        }
    }

    /// Restrict execution to tasks running in `path`.
    pub fn with_active_path(&self, path: impl Into<String>) -> Self {
        Self {
            active_path: Some(crate::core::pattern::normalize(&path.into())),
            ..self.clone()
        }
    }

    /// Scope-assigned working directory.
    pub(crate) fn at_path(&self, path: &str) -> Self {
        Self {
            path: path.to_string(),
            in_scope: true,
            ..self.clone()
        }
    }

    /// Copy carrying a scope's suffix, force-run, flag overrides and values.
    pub(crate) fn enter_scope(&self, scope: &Scope) -> Self {
        let mut env = self.clone();
        env.force_run |= scope.force_run();
        if let Some(suffix) = scope.name_suffix() {
            env.name_suffix = Some(compose_suffix(self.name_suffix.as_deref(), suffix));
        }
        if !scope.flag_overrides().is_empty() {
            let mut merged = (*self.scope_flags).clone();
            for (task, overrides) in scope.flag_overrides() {
                merged
                    .entry(task.clone())
                    .or_default()
                    .extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
            env.scope_flags = Arc::new(merged);
        }
        if !scope.values().is_empty() {
            let mut merged = (*self.values).clone();
            merged.extend(scope.values().iter().map(|(k, v)| (k.clone(), Arc::clone(v))));
            env.values = Arc::new(merged);
        }
        env
    }

    /// Copy handed to a task body: its name and resolved flags, no target filter.
    pub(crate) fn for_body(&self, task_name: &str, flags: Flags) -> Self {
        Self {
            task_name: Some(task_name.to_string()),
            flags: Arc::new(flags),
            target: None,
            ..self.clone()
        }
    }

    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    pub fn tracker(&self) -> &ExecutionTracker {
        &self.tracker
    }

    pub fn output(&self) -> &Output {
        &self.output
    }

    pub fn stdout(&self) -> SharedWriter {
        self.output.stdout()
    }

    pub fn stderr(&self) -> SharedWriter {
        self.output.stderr()
    }

    pub fn cancel(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Current directory relative to the repository root (`.` at the root).
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn root(&self) -> &Path {
        self.plan.root()
    }

    /// Absolute working directory for the current path.
    pub fn dir(&self) -> PathBuf {
        if self.path == ROOT_DIR {
            self.root().to_path_buf()
        } else {
            self.root().join(&self.path)
        }
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }

    pub fn auto_exec(&self) -> bool {
        self.auto_exec
    }

    pub fn force_run(&self) -> bool {
        self.force_run
    }

    pub fn name_suffix(&self) -> Option<&str> {
        self.name_suffix.as_deref()
    }

    pub(crate) fn in_scope(&self) -> bool {
        self.in_scope
    }

    pub(crate) fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    pub(crate) fn active_path(&self) -> Option<&str> {
        self.active_path.as_deref()
    }

    pub fn interrupt_grace(&self) -> Duration {
        self.interrupt_grace
    }

    pub(crate) fn scope_flags_for(&self, task: &str) -> Option<&FlagOverrides> {
        self.scope_flags.get(task)
    }

    pub(crate) fn cli_flags(&self) -> &FlagOverrides {
        &self.cli_flags
    }

    /// Effective name of the task whose body is running.
    pub fn task_name(&self) -> Option<&str> {
        self.task_name.as_deref()
    }

    pub fn flags(&self) -> &Flags {
        &self.flags
    }

    /// A value injected by an enclosing scope, if present with type `T`.
    pub fn value<T: Any + Send + Sync>(&self, key: &str) -> Option<&T> {
        self.values.get(key).and_then(|value| value.downcast_ref::<T>())
    }

    /// Run an external command in the current directory; output goes to this
    /// environment's sinks.
    pub fn exec(&self, program: &str, args: &[String]) -> Result<()> {
        run_command(self, program, args)
    }

    pub fn mark_warning(&self) {
        self.tracker.mark_warning();
    }
}
