//! Test-only helpers for building task trees and repository fixtures.

use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::anyhow;

use crate::env::Env;
use crate::task::Task;

/// Shared record of task invocations.
pub type Log = Arc<Mutex<Vec<String>>>;

pub fn new_log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

/// Snapshot of everything recorded so far.
pub fn entries(log: &Log) -> Vec<String> {
    log.lock().expect("log lock").clone()
}

/// Task that records `"{effective name}@{path}"` each time its body runs.
pub fn recording_task(name: &str, log: &Log) -> Task {
    let log = Arc::clone(log);
    Task::new(name, move |env: &Env| {
        log.lock()
            .expect("log lock")
            .push(format!("{}@{}", env.task_name().unwrap_or_default(), env.path()));
        Ok(())
    })
}

/// Like [`recording_task`], then fails with `message`.
pub fn failing_task(name: &str, log: &Log, message: &str) -> Task {
    let log = Arc::clone(log);
    let message = message.to_string();
    Task::new(name, move |env: &Env| {
        log.lock()
            .expect("log lock")
            .push(format!("{}@{}", env.task_name().unwrap_or_default(), env.path()));
        Err(anyhow!("{message}"))
    })
}

/// Candidate directory listing from string literals.
pub fn dirs(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| item.to_string()).collect()
}

/// Temporary repository containing `dirs` and empty `files`.
pub fn temp_repo(dirs: &[&str], files: &[&str]) -> tempfile::TempDir {
    let temp = tempfile::tempdir().expect("tempdir");
    make_repo(temp.path(), dirs, files);
    temp
}

/// Create each relative directory (and any `file` marker inside it) under `root`.
pub fn make_repo(root: &Path, dirs: &[&str], files: &[&str]) {
    for dir in dirs {
        fs::create_dir_all(root.join(dir)).expect("create dir");
    }
    for file in files {
        let path = root.join(file);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent");
        }
        fs::write(&path, "").expect("write marker");
    }
}
