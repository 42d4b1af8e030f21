//! CLI tests for the `pok` binary.
//!
//! Each test writes a `pocket.toml` into a temporary repository, spawns the
//! binary there and checks exit codes and output.

#![cfg(unix)]

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use pocket::exit_codes;
use pocket::test_support::temp_repo;

const CONFIG: &str = r#"
[[tasks]]
name = "build"
usage = "build every module"
run = ["sh", "-c", "echo built $POK_CONTEXT"]

[[tasks]]
name = "greet"
run = ["sh", "-c", "echo hello ${name}"]
manual = true
flags = { name = { default = "nobody", help = "who to greet" } }

[tree]
serial = [
  { scope = "build", include = ["api", "web"] },
  "greet",
]
"#;

fn pok(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_pok"))
        .current_dir(dir)
        .env_remove("POK_CONTEXT")
        .env_remove("RUST_LOG")
        .args(args)
        .output()
        .expect("spawn pok")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn repo_with(config: &str) -> tempfile::TempDir {
    let repo = temp_repo(&["api", "web", "docs"], &[]);
    fs::write(repo.path().join("pocket.toml"), config).expect("write config");
    repo
}

#[test]
fn full_run_skips_manual_tasks() {
    let repo = repo_with(CONFIG);

    let output = pok(repo.path(), &[]);

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert_eq!(
        stdout(&output),
        ":: build [api]\nbuilt api\n:: build [web]\nbuilt web\n"
    );
}

#[test]
fn named_manual_task_runs_with_cli_flags() {
    let repo = repo_with(CONFIG);

    let output = pok(repo.path(), &["greet", "--name", "world"]);

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert_eq!(stdout(&output), ":: greet\nhello world\n");
}

#[test]
fn context_variable_restricts_directory() {
    let repo = repo_with(CONFIG);

    let output = Command::new(env!("CARGO_BIN_EXE_pok"))
        .current_dir(repo.path())
        .env("POK_CONTEXT", "web")
        .output()
        .expect("spawn pok");

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert_eq!(stdout(&output), ":: build [web]\nbuilt web\n");
}

#[test]
fn plan_json_lists_tasks_and_modules() {
    let repo = repo_with(CONFIG);

    let output = pok(repo.path(), &["plan", "--json"]);

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let plan: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(plan["tasks"][0]["name"], "build");
    assert_eq!(plan["tasks"][0]["paths"], serde_json::json!(["api", "web"]));
    assert_eq!(plan["tasks"][1]["manual"], true);
    assert_eq!(plan["module_directories"], serde_json::json!([".", "api", "web"]));
}

#[test]
fn failing_task_exits_with_failed_code() {
    let repo = repo_with(
        r#"
        [[tasks]]
        name = "broken"
        run = ["sh", "-c", "exit 4"]
        "#,
    );

    let output = pok(repo.path(), &[]);

    assert_eq!(output.status.code(), Some(exit_codes::FAILED));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("task broken in ."), "{stderr}");
}

#[test]
fn unknown_task_and_bad_config_are_invalid() {
    let repo = repo_with(CONFIG);
    let output = pok(repo.path(), &["deploy"]);
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));

    let output = pok(repo.path(), &["greet", "--volume", "11"]);
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));

    let bad = repo_with("[tree]\nserial = [\"missing\"]\n");
    let output = pok(bad.path(), &[]);
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
}

#[test]
fn unknown_scope_flag_fails_before_anything_runs() {
    let repo = repo_with(
        r#"
        [[tasks]]
        name = "first"
        run = ["touch", "first-ran"]

        [[tasks]]
        name = "second"
        run = ["true"]

        [tree]
        serial = [
          "first",
          { scope = "second", flags = { second = { nope = true } } },
        ]
        "#,
    );

    let output = pok(repo.path(), &[]);

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unknown flag \"nope\""), "{stderr}");
    assert!(!repo.path().join("first-ran").exists());
}
