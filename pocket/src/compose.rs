//! Serial and parallel execution of sibling runnables.
//!
//! Parallel branches each get one OS thread and a private output buffer. A
//! finished branch flushes its buffer to the parent output as one block, so
//! sibling output never interleaves and appears in completion order.

use std::sync::mpsc;
use std::thread;

use anyhow::Result;
use tracing::{debug, warn};

use crate::cancel::{self, Canceled};
use crate::env::Env;
use crate::output::Output;
use crate::runnable::Runnable;

/// Run children in order, stopping at the first error.
pub(crate) fn run_serial(children: &[Runnable], env: &Env) -> Result<()> {
    for child in children {
        child.run(env)?;
    }
    Ok(())
}

/// Run children concurrently and return the first error by completion order.
///
/// The first failure cancels the group's token; siblings stop at their next
/// cancellation check (external processes are interrupted). The call returns
/// only after every branch has returned.
pub(crate) fn run_parallel(children: &[Runnable], env: &Env) -> Result<()> {
    if children.is_empty() {
        return Ok(());
    }
    cancel::check(env.cancel())?;
    if let [only] = children {
        return only.run(env);
    }

    let group = env.cancel().child_token();
    let group_env = env.with_cancel(group.clone());
    let parent = env.output();
    debug!(branches = children.len(), "parallel fan-out");

    let first_error = thread::scope(|s| {
        let (tx, rx) = mpsc::channel();
        for (index, child) in children.iter().enumerate() {
            let (output, capture) = Output::capture();
            let branch_env = group_env.with_output(output);
            let group = group.clone();
            let tx = tx.clone();
            s.spawn(move || {
                let result = child.run(&branch_env);
                if result.is_err() {
                    group.cancel();
                }
                if let Err(err) = parent.flush_capture(&capture) {
                    warn!(branch = index, err = %err, "failed to flush branch output");
                }
                // The receiver outlives every branch inside this scope.
                let _ = tx.send((index, result));
            });
        }
        drop(tx);

        let mut first_error = None;
        for (index, result) in rx {
            if let Err(err) = result {
                debug!(branch = index, "parallel branch failed");
                if first_error.is_none() {
                    first_error = Some(err);
                } else if err.downcast_ref::<Canceled>().is_none() {
                    warn!(branch = index, err = %format!("{err:#}"), "additional parallel failure");
                }
            }
        }
        first_error
    });

    match first_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
