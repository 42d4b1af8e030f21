//! Named leaf tasks and their run-time semantics.

use std::fmt;
use std::io::Write;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, instrument};

use crate::core::identity::{ROOT_DIR, TaskId, effective_name};
use crate::env::Env;
use crate::flags::{FlagError, FlagOverrides, FlagSpec, FlagValue, Flags};
use crate::runnable::Runnable;

/// Task body callback.
pub type TaskFn = Arc<dyn Fn(&Env) -> Result<()> + Send + Sync>;

/// What a task executes.
#[derive(Clone)]
pub enum TaskBody {
    Func(TaskFn),
    /// A composed sub-tree, run in the task's directory.
    Runnable(Runnable),
}

/// How a task is deduplicated within one invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Dedup {
    /// Once per (effective name, path).
    #[default]
    Local,
    /// Once per invocation, whatever the suffix or path.
    Global,
}

pub struct Task {
    name: String,
    usage: String,
    flags: Vec<FlagSpec>,
    dedup: Dedup,
    hidden: bool,
    manual: bool,
    hide_header: bool,
    body: TaskBody,
}

impl Task {
    pub fn new(
        name: impl Into<String>,
        body: impl Fn(&Env) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        Self::with_body(name, TaskBody::Func(Arc::new(body)))
    }

    /// Task whose body is a composed sub-tree.
    pub fn composed(name: impl Into<String>, body: impl Into<Runnable>) -> Self {
        Self::with_body(name, TaskBody::Runnable(body.into()))
    }

    pub fn with_body(name: impl Into<String>, body: TaskBody) -> Self {
        Self {
            name: name.into(),
            usage: String::new(),
            flags: Vec::new(),
            dedup: Dedup::Local,
            hidden: false,
            manual: false,
            hide_header: false,
            body,
        }
    }

    pub fn usage(mut self, usage: impl Into<String>) -> Self {
        self.usage = usage.into();
        self
    }

    /// Declare a flag; the default's type is the flag's type.
    pub fn flag(
        mut self,
        name: impl Into<String>,
        default: impl Into<FlagValue>,
        help: impl Into<String>,
    ) -> Self {
        let name = name.into();
        let spec = FlagSpec {
            name: name.clone(),
            default: default.into(),
            help: help.into(),
        };
        match self.flags.iter_mut().find(|existing| existing.name == name) {
            Some(existing) => *existing = spec,
            None => self.flags.push(spec),
        }
        self
    }

    pub fn global(mut self) -> Self {
        self.dedup = Dedup::Global;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    /// Only runs when invoked by name, never as part of a full run.
    pub fn manual(mut self) -> Self {
        self.manual = true;
        self
    }

    pub fn hide_header(mut self) -> Self {
        self.hide_header = true;
        self
    }

    pub fn into_ref(self) -> Arc<Task> {
        Arc::new(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn usage_text(&self) -> &str {
        &self.usage
    }

    pub fn flags(&self) -> &[FlagSpec] {
        &self.flags
    }

    pub fn dedup(&self) -> Dedup {
        self.dedup
    }

    pub fn is_global(&self) -> bool {
        self.dedup == Dedup::Global
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    pub fn is_manual(&self) -> bool {
        self.manual
    }

    pub fn is_header_hidden(&self) -> bool {
        self.hide_header
    }

    pub fn body(&self) -> &TaskBody {
        &self.body
    }

    /// Run this task at the environment's current path.
    ///
    /// Skips silently (returning `Ok`) when the task is manual during a full
    /// run, targets another task, is not planned for this path, or has already
    /// run with the same identity.
    #[instrument(skip_all, fields(task = %self.name, path = %env.path()))]
    pub fn run(&self, env: &Env) -> Result<()> {
        let name = effective_name(&self.name, env.name_suffix());

        if let Some(target) = env.target()
            && target != name
            && target != self.name
        {
            return Ok(());
        }
        if self.manual && env.auto_exec() {
            debug!(task = %name, "manual task skipped during full run");
            return Ok(());
        }

        let empty = FlagOverrides::new();
        let scope_layer = env.scope_flags_for(&self.name).unwrap_or(&empty);
        let cli_layer = if env.target().is_some() {
            env.cli_flags()
        } else {
            &empty
        };
        let path = env.path();
        let flags = Flags::resolve(&name, &self.flags, &[scope_layer, cli_layer])
            .with_context(|| format!("task {name} in {path}"))?;

        if let Some(active) = env.active_path()
            && active != path
        {
            return Ok(());
        }
        let planned = env
            .plan()
            .path_info(&name)
            .is_some_and(|info| info.paths.iter().any(|dir| dir == path));
        if !planned {
            debug!(task = %name, path, "path not planned for task");
            return Ok(());
        }

        if !env.force_run() {
            let id = match self.dedup {
                Dedup::Global => TaskId::global(&self.name),
                Dedup::Local => TaskId::new(&name, path),
            };
            if env.tracker().mark_done(id) {
                debug!(task = %name, path, "already executed");
                return Ok(());
            }
        }

        if !self.hide_header {
            let header = if path == ROOT_DIR {
                format!(":: {name}\n")
            } else {
                format!(":: {name} [{path}]\n")
            };
            env.stdout()
                .write_all(header.as_bytes())
                .context("write task header")?;
        }

        debug!(task = %name, path, "running task body");
        let body_env = env.for_body(&name, flags);
        invoke_body(&self.body, &body_env).with_context(|| format!("task {name} in {path}"))
    }
}

/// Run a body, converting a [`FlagError`] panic into an error. Other panics
/// continue unwinding.
fn invoke_body(body: &TaskBody, env: &Env) -> Result<()> {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| match body {
        TaskBody::Func(func) => func(env),
        TaskBody::Runnable(runnable) => runnable.run(env),
    }));
    match outcome {
        Ok(result) => result,
        Err(payload) => match payload.downcast::<FlagError>() {
            Ok(err) => Err((*err).into()),
            Err(other) => panic::resume_unwind(other),
        },
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("flags", &self.flags)
            .field("dedup", &self.dedup)
            .field("hidden", &self.hidden)
            .field("manual", &self.manual)
            .finish_non_exhaustive()
    }
}

/// Anything that names a task in scope rules.
pub trait TaskKey {
    fn task_key(&self) -> String;
}

impl TaskKey for Task {
    fn task_key(&self) -> String {
        self.name.clone()
    }
}

impl TaskKey for Arc<Task> {
    fn task_key(&self) -> String {
        self.name.clone()
    }
}

impl TaskKey for str {
    fn task_key(&self) -> String {
        self.to_string()
    }
}

impl TaskKey for String {
    fn task_key(&self) -> String {
        self.clone()
    }
}
