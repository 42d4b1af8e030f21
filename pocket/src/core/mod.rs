//! Deterministic, pure logic shared by the planner and the executor.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! directory listings and patterns and return deterministic outputs suitable
//! for tests.

pub mod identity;
pub mod modules;
pub mod pattern;
pub mod resolve;
