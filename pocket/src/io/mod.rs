//! Side-effecting helpers: configuration, directory listing, detection and
//! child processes.

pub mod config;
pub mod detect;
pub mod process;
pub mod walk;
