//! Repository configuration stored in `pocket.toml`.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};

use crate::core::pattern::PathPattern;
use crate::flags::{FlagOverrides, FlagValue};

/// Config file name at the repository root.
pub const CONFIG_FILE: &str = "pocket.toml";

/// Pocket configuration (TOML).
///
/// Every section is optional; a missing file is the same as an empty one.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PocketConfig {
    pub walk: WalkConfig,
    pub exec: ExecConfig,
    pub tasks: Vec<TaskConfig>,
    /// Composition of `tasks`; all tasks in declaration order when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tree: Option<NodeConfig>,
}

/// Directory listing options.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WalkConfig {
    /// Directory names never descended into.
    pub skip_dirs: Vec<String>,
    /// List directories whose names start with `.`.
    pub include_hidden: bool,
}

impl Default for WalkConfig {
    fn default() -> Self {
        Self {
            skip_dirs: [".git", "node_modules", "target", "vendor", ".pocket"]
                .iter()
                .map(|dir| dir.to_string())
                .collect(),
            include_hidden: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ExecConfig {
    /// Seconds a cancelled command gets between interrupt and kill.
    pub interrupt_grace_secs: u64,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            interrupt_grace_secs: 5,
        }
    }
}

impl ExecConfig {
    pub fn interrupt_grace(&self) -> Duration {
        Duration::from_secs(self.interrupt_grace_secs)
    }
}

/// A task that runs one command.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskConfig {
    pub name: String,
    #[serde(default)]
    pub usage: String,
    /// Program and arguments; `${flag}` is replaced by the flag's value.
    pub run: Vec<String>,
    #[serde(default)]
    pub flags: BTreeMap<String, FlagConfig>,
    #[serde(default)]
    pub global: bool,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub manual: bool,
    #[serde(default)]
    pub hide_header: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FlagConfig {
    pub default: FlagValue,
    #[serde(default)]
    pub help: String,
}

/// One node of the declarative tree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum NodeConfig {
    /// A task by name.
    Task(String),
    Serial(SerialConfig),
    Parallel(ParallelConfig),
    Scope(Box<ScopeConfig>),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SerialConfig {
    pub serial: Vec<NodeConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ParallelConfig {
    pub parallel: Vec<NodeConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ScopeConfig {
    pub scope: NodeConfig,
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
    /// Task name -> patterns that task never runs in.
    #[serde(default)]
    pub exclude_tasks: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub skip: Vec<String>,
    /// Detect directories containing any of these files instead of `include`.
    #[serde(default)]
    pub detect_files: Vec<String>,
    #[serde(default)]
    pub name_suffix: Option<String>,
    #[serde(default)]
    pub force_run: bool,
    /// Task name -> flag overrides.
    #[serde(default)]
    pub flags: BTreeMap<String, FlagOverrides>,
}

impl PocketConfig {
    pub fn validate(&self) -> Result<()> {
        if self.exec.interrupt_grace_secs == 0 {
            return Err(anyhow!("exec.interrupt_grace_secs must be > 0"));
        }
        let mut names = BTreeSet::new();
        for task in &self.tasks {
            if task.name.trim().is_empty() {
                bail!("task name must be non-empty");
            }
            if task.name.contains(':') {
                bail!("task {}: name must not contain ':'", task.name);
            }
            if !names.insert(task.name.as_str()) {
                bail!("duplicate task name {:?}", task.name);
            }
            if task.run.is_empty() || task.run[0].trim().is_empty() {
                bail!("task {}: run must be a non-empty array", task.name);
            }
            for flag in task.flags.keys() {
                if flag.is_empty() || flag.starts_with('-') {
                    bail!("task {}: invalid flag name {flag:?}", task.name);
                }
            }
        }
        if let Some(tree) = &self.tree {
            validate_node(tree, &names)?;
        }
        Ok(())
    }
}

fn ensure_known(name: &str, names: &BTreeSet<&str>) -> Result<()> {
    if names.contains(name) {
        Ok(())
    } else {
        Err(anyhow!("tree references unknown task {name:?}"))
    }
}

fn validate_node(node: &NodeConfig, names: &BTreeSet<&str>) -> Result<()> {
    match node {
        NodeConfig::Task(name) => ensure_known(name, names),
        NodeConfig::Serial(SerialConfig { serial: children })
        | NodeConfig::Parallel(ParallelConfig { parallel: children }) => {
            for child in children {
                validate_node(child, names)?;
            }
            Ok(())
        }
        NodeConfig::Scope(scope) => {
            let patterns = scope
                .include
                .iter()
                .chain(&scope.exclude)
                .chain(scope.exclude_tasks.values().flatten());
            for pattern in patterns {
                PathPattern::new(pattern)
                    .with_context(|| format!("invalid path pattern {pattern:?}"))?;
            }
            for name in scope
                .exclude_tasks
                .keys()
                .chain(&scope.skip)
                .chain(scope.flags.keys())
            {
                ensure_known(name, names)?;
            }
            if scope.name_suffix.as_deref().is_some_and(str::is_empty) {
                bail!("name_suffix must be non-empty");
            }
            validate_node(&scope.scope, names)
        }
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `PocketConfig::default()`.
pub fn load_config(path: &Path) -> Result<PocketConfig> {
    if !path.exists() {
        let cfg = PocketConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: PocketConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}
