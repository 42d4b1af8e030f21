//! Directory-scoping wrapper around a runnable.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Result, anyhow};
use tracing::debug;

use crate::cancel;
use crate::core::resolve::{DetectFn, Resolution};
use crate::env::{ContextValue, Env};
use crate::flags::{FlagOverrides, FlagValue};
use crate::runnable::Runnable;
use crate::task::TaskKey;

/// An exclude pattern as declared; an empty task list means every task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExcludeSpec {
    pub pattern: String,
    pub tasks: Vec<String>,
}

/// Wraps one runnable and narrows where its tasks run.
///
/// Built with chained methods:
///
/// ```
/// # use pocket::{Scope, Task};
/// let lint = Task::new("lint", |_env| Ok(())).into_ref();
/// let scope = Scope::new(lint.clone())
///     .include_path("services")
///     .exclude_task(&lint, ["services/legacy"]);
/// ```
pub struct Scope {
    inner: Runnable,
    include: Vec<String>,
    exclude: Vec<ExcludeSpec>,
    skip: Vec<String>,
    flags: BTreeMap<String, FlagOverrides>,
    values: BTreeMap<String, ContextValue>,
    name_suffix: Option<String>,
    detect: Option<DetectFn>,
    force_run: bool,
}

impl Scope {
    pub fn new(inner: impl Into<Runnable>) -> Self {
        Self {
            inner: inner.into(),
            include: Vec::new(),
            exclude: Vec::new(),
            skip: Vec::new(),
            flags: BTreeMap::new(),
            values: BTreeMap::new(),
            name_suffix: None,
            detect: None,
            force_run: false,
        }
    }

    /// Run in directories matching `pattern` (and their sub-directories).
    pub fn include_path(mut self, pattern: impl Into<String>) -> Self {
        self.include.push(pattern.into());
        self
    }

    /// Never run any task of this scope in directories matching `pattern`.
    pub fn exclude_path(mut self, pattern: impl Into<String>) -> Self {
        self.exclude.push(ExcludeSpec {
            pattern: pattern.into(),
            tasks: Vec::new(),
        });
        self
    }

    /// Keep `task` out of directories matching any of `patterns`.
    pub fn exclude_task<I, P>(mut self, task: &(impl TaskKey + ?Sized), patterns: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        let key = task.task_key();
        for pattern in patterns {
            self.exclude.push(ExcludeSpec {
                pattern: pattern.into(),
                tasks: vec![key.clone()],
            });
        }
        self
    }

    /// Drop `task` from this subtree entirely.
    pub fn skip_task(mut self, task: &(impl TaskKey + ?Sized)) -> Self {
        self.skip.push(task.task_key());
        self
    }

    /// Override one flag of `task` for this subtree.
    pub fn with_flag(
        mut self,
        task: &(impl TaskKey + ?Sized),
        flag: impl Into<String>,
        value: impl Into<FlagValue>,
    ) -> Self {
        self.flags
            .entry(task.task_key())
            .or_default()
            .insert(flag.into(), value.into());
        self
    }

    /// Discover directories with `detect` instead of include patterns.
    pub fn with_detect(
        mut self,
        detect: impl Fn(&[String], &Path) -> Vec<String> + Send + Sync + 'static,
    ) -> Self {
        self.detect = Some(Arc::new(detect));
        self
    }

    /// Like [`Scope::with_detect`] for an already shared function.
    pub fn with_detect_fn(mut self, detect: DetectFn) -> Self {
        self.detect = Some(detect);
        self
    }

    /// Bypass deduplication for tasks beneath this scope.
    pub fn with_force_run(mut self) -> Self {
        self.force_run = true;
        self
    }

    /// Append `:suffix` to the names of tasks beneath this scope.
    pub fn with_name_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.name_suffix = Some(suffix.into());
        self
    }

    pub fn with_context_value<T: Any + Send + Sync>(
        mut self,
        key: impl Into<String>,
        value: T,
    ) -> Self {
        self.values.insert(key.into(), Arc::new(value));
        self
    }

    pub fn inner(&self) -> &Runnable {
        &self.inner
    }

    pub fn includes(&self) -> &[String] {
        &self.include
    }

    pub fn excludes(&self) -> &[ExcludeSpec] {
        &self.exclude
    }

    pub fn skipped(&self) -> &[String] {
        &self.skip
    }

    pub fn flag_overrides(&self) -> &BTreeMap<String, FlagOverrides> {
        &self.flags
    }

    pub(crate) fn values(&self) -> &BTreeMap<String, ContextValue> {
        &self.values
    }

    pub fn name_suffix(&self) -> Option<&str> {
        self.name_suffix.as_deref()
    }

    pub fn detect(&self) -> Option<&DetectFn> {
        self.detect.as_ref()
    }

    pub fn force_run(&self) -> bool {
        self.force_run
    }

    /// Run the inner runnable in each planned directory.
    ///
    /// The outermost constraining scope iterates its directories in order.
    /// A nested scope runs once, and only when the current directory is one
    /// of its own; the outer iteration already visits every directory.
    pub(crate) fn run(self: &Arc<Self>, env: &Env) -> Result<()> {
        let resolution = env
            .plan()
            .scope_resolution(self)
            .ok_or_else(|| anyhow!("scope is not part of the plan"))?;
        let env = env.enter_scope(self);
        match resolution {
            Resolution::Unconstrained => self.inner.run(&env),
            Resolution::Dirs(dirs) if env.in_scope() => {
                if dirs.iter().any(|dir| dir == env.path()) {
                    self.inner.run(&env)
                } else {
                    Ok(())
                }
            }
            Resolution::Dirs(dirs) => {
                debug!(dirs = dirs.len(), "running scope");
                for dir in dirs {
                    cancel::check(env.cancel())?;
                    self.inner.run(&env.at_path(dir))?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("inner", &self.inner)
            .field("include", &self.include)
            .field("exclude", &self.exclude)
            .field("skip", &self.skip)
            .field("flags", &self.flags)
            .field("name_suffix", &self.name_suffix)
            .field("detect", &self.detect.is_some())
            .field("force_run", &self.force_run)
            .finish_non_exhaustive()
    }
}
