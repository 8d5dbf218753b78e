//! Subprocesses as deferred operations
//!
//! [`ExecFuture`] is the workhorse: a child process with non-blocking pipes
//! that a [`FutureIterator`](crate::future::FutureIterator) can run alongside
//! many others. [`ExecPassthru`] runs a command attached to the terminal.

pub mod command;
pub mod error;
pub mod exec_future;
pub mod passthru;
pub mod status;
pub mod stdin;


pub use command::{ExecCommand, ExecCommandBuilder};
pub use error::{CommandFailure, ExecError};
pub use exec_future::{ExecFuture, ExecOutput, ExecSettings};
pub use passthru::ExecPassthru;
pub use status::{signal_name, ExitStatus};
