//! Build a composition tree from `pocket.toml` task and tree declarations.

use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};

use anyhow::{Context, Result, anyhow};
use regex::{Captures, Regex};
use tracing::debug;

use crate::env::Env;
use crate::flags::Flags;
use crate::io::config::{
    NodeConfig, ParallelConfig, PocketConfig, ScopeConfig, SerialConfig, TaskConfig,
};
use crate::io::detect::detect_by_file;
use crate::runnable::{Runnable, parallel, serial};
use crate::scope::Scope;
use crate::task::Task;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z0-9_-]+)\}").expect("placeholder regex"));

/// Build the runnable tree described by `config`.
///
/// Without a `tree`, every declared task runs in declaration order.
pub fn build_tree(config: &PocketConfig) -> Result<Runnable> {
    let tasks: BTreeMap<&str, Arc<Task>> = config
        .tasks
        .iter()
        .map(|task| (task.name.as_str(), command_task(task).into_ref()))
        .collect();

    let tree = match &config.tree {
        Some(node) => build_node(node, &tasks)?,
        None => serial(
            config
                .tasks
                .iter()
                .filter_map(|task| tasks.get(task.name.as_str()))
                .map(Runnable::from),
        ),
    };
    debug!(tasks = tasks.len(), "declarative tree built");
    Ok(tree)
}

fn command_task(config: &TaskConfig) -> Task {
    let argv = config.run.clone();
    let name = config.name.clone();
    let mut task = Task::new(config.name.clone(), move |env: &Env| {
        let expanded = expand_argv(&argv, env.flags())
            .with_context(|| format!("expand command for {name}"))?;
        let (program, args) = expanded
            .split_first()
            .ok_or_else(|| anyhow!("task {name} has an empty command"))?;
        env.exec(program, args)
    })
    .usage(config.usage.clone());
    for (flag, spec) in &config.flags {
        task = task.flag(flag.clone(), spec.default.clone(), spec.help.clone());
    }
    if config.global {
        task = task.global();
    }
    if config.hidden {
        task = task.hidden();
    }
    if config.manual {
        task = task.manual();
    }
    if config.hide_header {
        task = task.hide_header();
    }
    task
}

/// Replace every `${flag}` with the flag's resolved value.
pub fn expand_argv(argv: &[String], flags: &Flags) -> Result<Vec<String>> {
    argv.iter()
        .map(|arg| {
            let mut missing = None;
            let expanded = PLACEHOLDER.replace_all(arg, |caps: &Captures<'_>| {
                match flags.get(&caps[1]) {
                    Ok(value) => value.to_string(),
                    Err(err) => {
                        missing.get_or_insert(err);
                        String::new()
                    }
                }
            });
            match missing {
                Some(err) => Err(err.into()),
                None => Ok(expanded.into_owned()),
            }
        })
        .collect()
}

fn build_node(node: &NodeConfig, tasks: &BTreeMap<&str, Arc<Task>>) -> Result<Runnable> {
    match node {
        NodeConfig::Task(name) => tasks
            .get(name.as_str())
            .map(Runnable::from)
            .ok_or_else(|| anyhow!("tree references unknown task {name:?}")),
        NodeConfig::Serial(SerialConfig { serial: children }) => Ok(serial(
            children
                .iter()
                .map(|child| build_node(child, tasks))
                .collect::<Result<Vec<_>>>()?,
        )),
        NodeConfig::Parallel(ParallelConfig { parallel: children }) => Ok(parallel(
            children
                .iter()
                .map(|child| build_node(child, tasks))
                .collect::<Result<Vec<_>>>()?,
        )),
        NodeConfig::Scope(config) => build_scope(config, tasks).map(Runnable::from),
    }
}

fn build_scope(config: &ScopeConfig, tasks: &BTreeMap<&str, Arc<Task>>) -> Result<Scope> {
    let mut scope = Scope::new(build_node(&config.scope, tasks)?);
    for pattern in &config.include {
        scope = scope.include_path(pattern.clone());
    }
    for pattern in &config.exclude {
        scope = scope.exclude_path(pattern.clone());
    }
    for (task, patterns) in &config.exclude_tasks {
        scope = scope.exclude_task(task, patterns.iter().cloned());
    }
    for task in &config.skip {
        scope = scope.skip_task(task);
    }
    for (task, overrides) in &config.flags {
        for (flag, value) in overrides {
            scope = scope.with_flag(task, flag.clone(), value.clone());
        }
    }
    if !config.detect_files.is_empty() {
        scope = scope.with_detect_fn(detect_by_file(&config.detect_files));
    }
    if let Some(suffix) = &config.name_suffix {
        scope = scope.with_name_suffix(suffix.clone());
    }
    if config.force_run {
        scope = scope.with_force_run();
    }
    Ok(scope)
}
