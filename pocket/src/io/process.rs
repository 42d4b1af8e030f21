//! Running external commands for task bodies.
//!
//! Output is streamed into the environment's sinks while the child runs, so a
//! command inside a parallel branch lands in that branch's buffer. The wait
//! loop polls the cancellation token; a cancelled command gets an interrupt,
//! then a kill once the grace period runs out.

use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow, bail};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

use crate::cancel::{self, Canceled};
use crate::env::{ACTIVE_SCOPE_VAR, Env};
use crate::output::SharedWriter;

/// Time a command gets to exit after an interrupt before it is killed.
pub const DEFAULT_INTERRUPT_GRACE: Duration = Duration::from_secs(5);

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How long a cancelled command's output pipes may stay open after it exits.
/// Descendants that inherited them are not waited for past this.
const CANCELLED_DRAIN: Duration = Duration::from_millis(100);

/// Run `program` with `args` in the environment's current directory.
///
/// The child sees `POK_CONTEXT` set to the task path. A non-zero exit is an
/// error; a cancelled run returns [`Canceled`].
#[instrument(skip_all, fields(program = %program, path = %env.path()))]
pub fn run_command(env: &Env, program: &str, args: &[String]) -> Result<()> {
    cancel::check(env.cancel())?;

    let dir = env.dir();
    if env.verbose() {
        let mut line = format!("$ {program}");
        for arg in args {
            line.push(' ');
            line.push_str(arg);
        }
        line.push('\n');
        env.stderr()
            .write_block(line.as_bytes())
            .context("write command echo")?;
    }

    let mut cmd = Command::new(program);
    cmd.args(args)
        .current_dir(&dir)
        .env(ACTIVE_SCOPE_VAR, env.path())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    debug!(dir = %dir.display(), "spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, program, "failed to spawn command");
            return Err(e).with_context(|| format!("spawn {program}"));
        }
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;
    let stdout_done = spawn_reader(stdout, env.stdout());
    let stderr_done = spawn_reader(stderr, env.stderr());

    let mut cancelled = false;
    let status = loop {
        if let Some(status) = child.wait_timeout(POLL_INTERVAL).context("wait for command")? {
            break status;
        }
        if env.cancel().is_cancelled() {
            cancelled = true;
            break shutdown(&mut child, env.interrupt_grace())?;
        }
    };

    debug!(exit_code = ?status.code(), cancelled, "command finished");
    if cancelled {
        let deadline = Instant::now() + CANCELLED_DRAIN;
        for (stream, done) in [("stdout", &stdout_done), ("stderr", &stderr_done)] {
            if let Err(err) = drain_reader(done, Some(deadline)) {
                debug!(stream, err = %format!("{err:#}"), "output of cancelled command dropped");
            }
        }
        return Err(Canceled.into());
    }
    drain_reader(&stdout_done, None).context("forward stdout")?;
    drain_reader(&stderr_done, None).context("forward stderr")?;
    if !status.success() {
        bail!("{program} failed ({status})");
    }
    Ok(())
}

/// Interrupt the child, then kill it if it outlives `grace`.
fn shutdown(child: &mut Child, grace: Duration) -> Result<ExitStatus> {
    warn!(pid = child.id(), "cancelled, interrupting command");
    if let Err(err) = interrupt(child) {
        warn!(err = %err, "interrupt failed, killing");
        child.kill().context("kill command")?;
        return child.wait().context("wait command after kill");
    }
    match child
        .wait_timeout(grace)
        .context("wait command after interrupt")?
    {
        Some(status) => Ok(status),
        None => {
            warn!(grace_ms = grace.as_millis() as u64, "command ignored interrupt, killing");
            child.kill().context("kill command")?;
            child.wait().context("wait command after kill")
        }
    }
}

#[cfg(unix)]
fn interrupt(child: &Child) -> Result<()> {
    let status = Command::new("kill")
        .args(["-INT", &child.id().to_string()])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .context("spawn kill")?;
    if !status.success() {
        bail!("kill -INT exited with {status}");
    }
    Ok(())
}

#[cfg(not(unix))]
fn interrupt(child: &Child) -> Result<()> {
    bail!("no interrupt signal for pid {} on this platform", child.id())
}

fn forward_stream<R: Read>(mut reader: R, sink: &SharedWriter) -> Result<()> {
    let mut chunk = [0u8; 8192];
    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            return Ok(());
        }
        sink.write_block(&chunk[..n]).context("write output")?;
    }
}

/// Forward `reader` into `sink` on its own thread; the receiver yields the
/// outcome once the pipe closes.
fn spawn_reader<R: Read + Send + 'static>(reader: R, sink: SharedWriter) -> Receiver<Result<()>> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        // The receiver is gone if a cancelled run stopped waiting.
        let _ = tx.send(forward_stream(reader, &sink));
    });
    rx
}

/// Wait for a reader to finish. With a deadline, a pipe still held open by a
/// surviving descendant is abandoned and its reader thread left detached.
fn drain_reader(done: &Receiver<Result<()>>, deadline: Option<Instant>) -> Result<()> {
    let Some(deadline) = deadline else {
        return done
            .recv()
            .map_err(|_| anyhow!("output reader thread panicked"))?;
    };
    match done.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => {
            warn!("output pipe still open after cancellation, detaching reader");
            Ok(())
        }
        Err(RecvTimeoutError::Disconnected) => Err(anyhow!("output reader thread panicked")),
    }
}
