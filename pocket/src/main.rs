//! `pok`: run the tasks declared in `pocket.toml`.
//!
//! Without a task name the whole tree runs (manual tasks are skipped). With a
//! task name only that task runs, through the scopes that contain it, with
//! any trailing `--flag` arguments layered over its flag defaults.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use tracing::debug;

use pocket::declarative::build_tree;
use pocket::exit_codes;
use pocket::flags::parse_cli_flags;
use pocket::io::config::{CONFIG_FILE, PocketConfig, load_config};
use pocket::logging;
use pocket::report::{PlanReport, render_tree};
use pocket::{ACTIVE_SCOPE_VAR, Env, Plan};

#[derive(Parser)]
#[command(
    name = "pok",
    version,
    about = "Run composed tasks across the directories of a repository",
    args_conflicts_with_subcommands = true
)]
struct Cli {
    /// Print debug diagnostics and echo commands.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (default: ./pocket.toml).
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,

    /// Task to run, followed by its flags.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "TASK")]
    task: Vec<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Show the tasks, their directories and the composition tree.
    Plan {
        /// Emit the plan as JSON.
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    std::process::exit(run(cli));
}

/// Configuration or planning failure: nothing ran.
fn invalid(err: anyhow::Error) -> i32 {
    eprintln!("{err:#}");
    exit_codes::INVALID
}

fn run(cli: Cli) -> i32 {
    let root = match std::env::current_dir().context("resolve working directory") {
        Ok(root) => root,
        Err(err) => return invalid(err),
    };
    let config_path = cli.config.clone().unwrap_or_else(|| root.join(CONFIG_FILE));
    let (config, plan) = match load_plan(&root, &config_path) {
        Ok(loaded) => loaded,
        Err(err) => return invalid(err),
    };

    match &cli.command {
        Some(Command::Plan { json }) => match print_plan(&plan, *json) {
            Ok(()) => exit_codes::OK,
            Err(err) => invalid(err),
        },
        None => execute(&cli, &config, plan),
    }
}

fn load_plan(root: &Path, config_path: &Path) -> Result<(PocketConfig, Plan)> {
    let config = load_config(config_path)?;
    let tree = build_tree(&config).context("build task tree")?;
    let plan = Plan::build(root, tree, &config.walk).context("plan tasks")?;
    Ok((config, plan))
}

fn print_plan(plan: &Plan, json: bool) -> Result<()> {
    let report = PlanReport::from_plan(plan);
    if json {
        print!("{}", report.to_json()?);
    } else {
        print!("{}", report.task_listing());
        println!();
        print!("{}", render_tree(plan.tree()));
    }
    Ok(())
}

fn execute(cli: &Cli, config: &PocketConfig, plan: Plan) -> i32 {
    let plan = Arc::new(plan);
    let mut env = Env::new(Arc::clone(&plan))
        .with_verbose(cli.verbose)
        .with_interrupt_grace(config.exec.interrupt_grace());

    if let Ok(active) = std::env::var(ACTIVE_SCOPE_VAR)
        && !active.is_empty()
    {
        debug!(active = %active, "restricting to active directory");
        env = env.with_active_path(active);
    }

    if let Some((name, args)) = cli.task.split_first() {
        let task = match plan
            .find_task(name)
            .ok_or_else(|| anyhow!("unknown task {name:?}; run `pok plan` to list tasks"))
        {
            Ok(task) => task,
            Err(err) => return invalid(err),
        };
        let overrides = match parse_cli_flags(name, task.flags(), args) {
            Ok(overrides) => overrides,
            Err(err) => return invalid(err),
        };
        env = env.with_target(name.clone(), overrides);
    }

    if let Err(err) = env.run_tree() {
        eprintln!("{err:#}");
        return exit_codes::FAILED;
    }
    if env.tracker().warnings() {
        eprintln!("completed with warnings");
    }
    exit_codes::OK
}
