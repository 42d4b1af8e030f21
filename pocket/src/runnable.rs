//! The composition tree.

use std::sync::Arc;

use anyhow::Result;

use crate::compose::{run_parallel, run_serial};
use crate::env::Env;
use crate::scope::Scope;
use crate::task::Task;

/// A node of the composition tree. Cloning shares tasks and scopes.
#[derive(Debug, Clone)]
pub enum Runnable {
    Task(Arc<Task>),
    /// Children strictly in order; stops at the first error.
    Serial(Vec<Runnable>),
    /// Children concurrently; output of each child kept contiguous.
    Parallel(Vec<Runnable>),
    Scope(Arc<Scope>),
}

impl Runnable {
    pub fn run(&self, env: &Env) -> Result<()> {
        match self {
            Runnable::Task(task) => task.run(env),
            Runnable::Serial(children) => run_serial(children, env),
            Runnable::Parallel(children) => run_parallel(children, env),
            Runnable::Scope(scope) => scope.run(env),
        }
    }
}

pub fn serial(children: impl IntoIterator<Item = Runnable>) -> Runnable {
    Runnable::Serial(children.into_iter().collect())
}

pub fn parallel(children: impl IntoIterator<Item = Runnable>) -> Runnable {
    Runnable::Parallel(children.into_iter().collect())
}

impl From<Arc<Task>> for Runnable {
    fn from(task: Arc<Task>) -> Self {
        Runnable::Task(task)
    }
}

impl From<Task> for Runnable {
    fn from(task: Task) -> Self {
        Runnable::Task(Arc::new(task))
    }
}

impl From<&Arc<Task>> for Runnable {
    fn from(task: &Arc<Task>) -> Self {
        Runnable::Task(Arc::clone(task))
    }
}

impl From<Scope> for Runnable {
    fn from(scope: Scope) -> Self {
        Runnable::Scope(Arc::new(scope))
    }
}

impl From<Arc<Scope>> for Runnable {
    fn from(scope: Arc<Scope>) -> Self {
        Runnable::Scope(scope)
    }
}
