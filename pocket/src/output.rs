//! Output sinks shared by task headers, bodies and child processes.
//!
//! Parallel branches write into private [`Capture`] buffers; each finished
//! branch is copied to its parent's [`Output`] as one contiguous block.

use std::fmt;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};

/// Cloneable, thread-safe handle to one byte sink.
#[derive(Clone)]
pub struct SharedWriter(Arc<Mutex<Box<dyn Write + Send>>>);

impl SharedWriter {
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self(Arc::new(Mutex::new(Box::new(writer))))
    }

    /// Write all of `bytes` while holding the sink, so no other writer interleaves.
    pub fn write_block(&self, bytes: &[u8]) -> io::Result<()> {
        let mut sink = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        sink.write_all(bytes)?;
        sink.flush()
    }
}

impl Write for SharedWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .write(buf)
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.write_block(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).flush()
    }
}

impl fmt::Debug for SharedWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedWriter")
    }
}

/// In-memory sink.
#[derive(Debug, Clone, Default)]
pub struct Buffer(Arc<Mutex<Vec<u8>>>);

impl Buffer {
    /// Drain the buffered bytes.
    pub fn take(&self) -> Vec<u8> {
        std::mem::take(&mut *self.0.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Current contents, lossily decoded.
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap_or_else(PoisonError::into_inner)).into_owned()
    }
}

impl Write for Buffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Private stdout/stderr buffers of one parallel branch.
#[derive(Debug, Clone, Default)]
pub struct Capture {
    pub stdout: Buffer,
    pub stderr: Buffer,
}

/// Where a task's output goes.
#[derive(Debug, Clone)]
pub struct Output {
    stdout: SharedWriter,
    stderr: SharedWriter,
    flush_lock: Arc<Mutex<()>>,
}

impl Output {
    pub fn new(stdout: impl Write + Send + 'static, stderr: impl Write + Send + 'static) -> Self {
        Self {
            stdout: SharedWriter::new(stdout),
            stderr: SharedWriter::new(stderr),
            flush_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn stdio() -> Self {
        Self::new(io::stdout(), io::stderr())
    }

    /// A fresh output backed by in-memory buffers.
    pub fn capture() -> (Output, Capture) {
        let capture = Capture::default();
        let output = Output::new(capture.stdout.clone(), capture.stderr.clone());
        (output, capture)
    }

    pub fn stdout(&self) -> SharedWriter {
        self.stdout.clone()
    }

    pub fn stderr(&self) -> SharedWriter {
        self.stderr.clone()
    }

    /// Copy a finished branch's buffers here as one block per stream.
    pub fn flush_capture(&self, capture: &Capture) -> io::Result<()> {
        let _guard = self.flush_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let stdout = capture.stdout.take();
        if !stdout.is_empty() {
            self.stdout.write_block(&stdout)?;
        }
        let stderr = capture.stderr.take();
        if !stderr.is_empty() {
            self.stderr.write_block(&stderr)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flush_moves_capture_into_parent() {
        let (parent, parent_capture) = Output::capture();
        let (child, child_capture) = Output::capture();
        writeln!(child.stdout(), "hello").expect("write");
        writeln!(child.stderr(), "oops").expect("write");

        parent.flush_capture(&child_capture).expect("flush");

        assert_eq!(parent_capture.stdout.contents(), "hello\n");
        assert_eq!(parent_capture.stderr.contents(), "oops\n");
        assert!(child_capture.stdout.contents().is_empty());
    }
}
