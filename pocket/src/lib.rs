//! Composable task runner for multi-directory repositories.
//!
//! Tasks are composed into a tree of [`Runnable`] nodes: serial and parallel
//! groups, and [`Scope`]s that decide which directories their tasks run in.
//! A [`Plan`] resolves the whole tree against one directory listing before
//! anything runs; an [`Env`] then carries the per-invocation state through
//! execution.
//!
//! - **[`core`]**: Pure path matching and scope resolution. No I/O.
//! - **[`io`]**: Configuration, directory listing, detection and processes.
//!
//! ```
//! use std::sync::Arc;
//! use pocket::{Env, Plan, Scope, Task, parallel};
//!
//! let lint = Task::new("lint", |_env| Ok(())).into_ref();
//! let test = Task::new("test", |_env| Ok(())).into_ref();
//! let tree = Scope::new(parallel([lint.into(), test.into()])).include_path("services");
//! let plan = Plan::from_candidates("/repo", vec![".".into(), "services".into()], tree.into())?;
//! assert_eq!(plan.path_info("lint").map(|info| info.paths.clone()), Some(vec!["services".to_string()]));
//! # let _ = Env::new(Arc::new(plan));
//! # Ok::<(), pocket::PlanError>(())
//! ```

pub mod cancel;
mod compose;
pub mod core;
pub mod declarative;
pub mod env;
pub mod exit_codes;
pub mod flags;
pub mod io;
pub mod logging;
pub mod output;
pub mod plan;
pub mod report;
pub mod runnable;
pub mod scope;
pub mod task;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod tracker;

pub use cancel::Canceled;
pub use tokio_util::sync::CancellationToken;
pub use env::{ACTIVE_SCOPE_VAR, Env};
pub use flags::{FlagError, FlagOverrides, FlagSpec, FlagValue, Flags};
pub use output::Output;
pub use plan::{PathInfo, Plan, PlanError};
pub use runnable::{Runnable, parallel, serial};
pub use scope::Scope;
pub use task::{Dedup, Task, TaskBody, TaskKey};
pub use tracker::ExecutionTracker;
