//! Per-invocation record of executed tasks.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use tracing::trace;

use crate::core::identity::TaskId;

/// Thread-safe dedup registry. Discarded after each invocation.
#[derive(Debug, Default)]
pub struct ExecutionTracker {
    done: Mutex<HashSet<TaskId>>,
    warnings: AtomicBool,
}

impl ExecutionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `id` and report whether it was already recorded (caller skips).
    pub fn mark_done(&self, id: TaskId) -> bool {
        let mut done = self.done.lock().unwrap_or_else(PoisonError::into_inner);
        let already = !done.insert(id.clone());
        trace!(task = %id, already, "mark done");
        already
    }

    pub fn mark_warning(&self) {
        self.warnings.store(true, Ordering::SeqCst);
    }

    pub fn warnings(&self) -> bool {
        self.warnings.load(Ordering::SeqCst)
    }

    /// Executed ids in sorted order.
    pub fn executed(&self) -> Vec<TaskId> {
        let done = self.done.lock().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<TaskId> = done.iter().cloned().collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn second_mark_reports_done() {
        let tracker = ExecutionTracker::new();
        assert!(!tracker.mark_done(TaskId::new("lint", "pkg")));
        assert!(tracker.mark_done(TaskId::new("lint", "pkg")));
        assert!(!tracker.mark_done(TaskId::new("lint", "services")));
    }

    #[test]
    fn concurrent_marks_admit_exactly_one() {
        let tracker = Arc::new(ExecutionTracker::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tracker = Arc::clone(&tracker);
                thread::spawn(move || !tracker.mark_done(TaskId::global("fmt")))
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|handle| handle.join().expect("join"))
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }

    #[test]
    fn warnings_are_independent() {
        let tracker = ExecutionTracker::new();
        assert!(!tracker.warnings());
        tracker.mark_warning();
        assert!(tracker.warnings());
        assert!(tracker.executed().is_empty());
    }
}
