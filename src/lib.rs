//! # pexec
//!
//! Run many subprocesses (and in-process deferred calls) from a single
//! control thread, with bounded parallelism, completion-order results and
//! failures that surface only when a result is resolved.
//!
//! ## Usage
//!
//! ```bash
//! pexec run --limit 4 "cargo fmt --check" "git status --porcelain" "make lint"
//! ```
//!
//! ## Modules
//!
//! - `future` - The `Deferred` contract, the `FutureIterator` scheduler and in-process adapters
//! - `subprocess` - Child processes as deferred operations
//! - `config` - Engine configuration from files and environment
//! - `error` - Coded application errors
//! - `app` - Logging and per-invocation settings for the binary
//! - `cli` - The `pexec` command line
pub mod app;
pub mod cli;
pub mod config;
pub mod error;
pub mod future;
pub mod subprocess;

pub use error::{PexecError, Result};
pub use future::{Deferred, FutureIterator, FutureKey, FutureState, MethodCallFuture};
pub use subprocess::{ExecCommand, ExecError, ExecFuture, ExecOutput};
