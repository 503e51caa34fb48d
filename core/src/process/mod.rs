//! Process management utilities for the hq core library
//!
//! This module starts supervised children with piped standard streams,
//! polls and reaps them, and delivers signals.
//!
//! ## Platform Support
//!
//! - **Unix**: fork/exec with close-on-exec pipes and `waitpid`-based reaping
//!
//! Only Unix is supported; the supervisor relies on signals and `waitpid`
//! semantics that have no direct equivalent elsewhere.

#[cfg(unix)]
pub mod unix;

#[cfg(unix)]
pub use unix::*;
