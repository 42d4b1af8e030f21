//! Read-only views of a plan for `pok plan`.

use std::fmt::Write as _;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::flags::FlagSpec;
use crate::plan::Plan;
use crate::runnable::Runnable;
use crate::task::{Dedup, TaskBody};

/// Serializable summary of a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanReport {
    pub tasks: Vec<TaskReport>,
    pub module_directories: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskReport {
    /// Effective name (base name plus any scope suffixes).
    pub name: String,
    pub base_name: String,
    pub usage: String,
    pub hidden: bool,
    pub manual: bool,
    pub dedup: Dedup,
    pub flags: Vec<FlagSpec>,
    pub include: Vec<String>,
    pub paths: Vec<String>,
}

impl PlanReport {
    pub fn from_plan(plan: &Plan) -> Self {
        let tasks = plan
            .path_mappings()
            .iter()
            .filter_map(|(name, info)| {
                let task = plan.task_for(name)?;
                Some(TaskReport {
                    name: name.clone(),
                    base_name: task.name().to_string(),
                    usage: task.usage_text().to_string(),
                    hidden: task.is_hidden(),
                    manual: task.is_manual(),
                    dedup: task.dedup(),
                    flags: task.flags().to_vec(),
                    include: info.include.clone(),
                    paths: info.paths.clone(),
                })
            })
            .collect();
        Self {
            tasks,
            module_directories: plan.module_directories().to_vec(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        let mut payload = serde_json::to_string_pretty(self).context("serialize plan json")?;
        payload.push('\n');
        Ok(payload)
    }

    /// Visible tasks, one per line, with their directories.
    pub fn task_listing(&self) -> String {
        let mut out = String::new();
        for task in self.tasks.iter().filter(|task| !task.hidden) {
            let _ = write!(out, "{}", task.name);
            if task.manual {
                out.push_str(" (manual)");
            }
            if !task.usage.is_empty() {
                let _ = write!(out, "  {}", task.usage);
            }
            let _ = writeln!(out, "  [{}]", task.paths.join(", "));
        }
        out
    }
}

/// Indented text rendering of a composition tree.
pub fn render_tree(tree: &Runnable) -> String {
    let mut out = String::new();
    render_node(tree, 0, &mut out);
    out
}

fn render_node(node: &Runnable, depth: usize, out: &mut String) {
    let indent = "  ".repeat(depth);
    match node {
        Runnable::Task(task) => {
            let _ = write!(out, "{indent}{}", task.name());
            if task.is_global() {
                out.push_str(" (global)");
            }
            if task.is_manual() {
                out.push_str(" (manual)");
            }
            out.push('\n');
            if let TaskBody::Runnable(body) = task.body() {
                render_node(body, depth + 1, out);
            }
        }
        Runnable::Serial(children) => {
            let _ = writeln!(out, "{indent}serial");
            for child in children {
                render_node(child, depth + 1, out);
            }
        }
        Runnable::Parallel(children) => {
            let _ = writeln!(out, "{indent}parallel");
            for child in children {
                render_node(child, depth + 1, out);
            }
        }
        Runnable::Scope(scope) => {
            let _ = write!(out, "{indent}scope");
            if !scope.includes().is_empty() {
                let _ = write!(out, " include=[{}]", scope.includes().join(", "));
            }
            if !scope.excludes().is_empty() {
                let excludes: Vec<String> = scope
                    .excludes()
                    .iter()
                    .map(|spec| {
                        if spec.tasks.is_empty() {
                            spec.pattern.clone()
                        } else {
                            format!("{}({})", spec.pattern, spec.tasks.join(","))
                        }
                    })
                    .collect();
                let _ = write!(out, " exclude=[{}]", excludes.join(", "));
            }
            if !scope.skipped().is_empty() {
                let _ = write!(out, " skip=[{}]", scope.skipped().join(", "));
            }
            if scope.detect().is_some() {
                out.push_str(" detect");
            }
            if let Some(suffix) = scope.name_suffix() {
                let _ = write!(out, " suffix={suffix}");
            }
            if scope.force_run() {
                out.push_str(" force");
            }
            out.push('\n');
            render_node(scope.inner(), depth + 1, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runnable::{parallel, serial};
    use crate::scope::Scope;
    use crate::task::Task;
    use crate::test_support::{dirs, new_log, recording_task};

    fn sample() -> Runnable {
        let log = new_log();
        let lint = recording_task("lint", &log).usage("run linters").into_ref();
        let test = recording_task("test", &log).flag("race", false, "race detector").into_ref();
        let release = Task::new("release", |_env| Ok(())).manual().hidden().into_ref();
        serial([
            Scope::new(parallel([lint.clone().into(), test.into()]))
                .include_path("services")
                .exclude_task(&lint, ["services/web"])
                .into(),
            release.into(),
        ])
    }

    #[test]
    fn report_lists_effective_tasks_and_modules() {
        let plan = Plan::from_candidates(
            "/repo",
            dirs(&[".", "services", "services/api", "services/web"]),
            sample(),
        )
        .expect("plan");

        let report = PlanReport::from_plan(&plan);

        let names: Vec<&str> = report.tasks.iter().map(|task| task.name.as_str()).collect();
        assert_eq!(names, vec!["lint", "release", "test"]);
        assert_eq!(report.tasks[0].paths, vec!["services", "services/api"]);
        assert_eq!(report.tasks[0].include, vec!["services"]);
        assert_eq!(report.module_directories, vec![".", "services"]);

        let json: serde_json::Value =
            serde_json::from_str(&report.to_json().expect("json")).expect("parse json");
        assert_eq!(json["tasks"][2]["flags"][0]["name"], "race");
        assert_eq!(json["tasks"][1]["dedup"], "local");

        let listing = report.task_listing();
        assert!(listing.contains("lint  run linters  [services, services/api]"));
        assert!(!listing.contains("release"));
    }

    #[test]
    fn renders_tree_structure() {
        let text = render_tree(&sample());
        assert_eq!(
            text,
            "serial\n  scope include=[services] exclude=[services/web(lint)]\n    parallel\n      lint\n      test\n  release (manual)\n"
        );
    }
}
