//! # testsync executor
//!
//! Command dispatch for registered connections.
//!
//! - [`Command`] - the closed set of commands a client can send
//! - [`Executor`] - stateless dispatcher shared by all connections
//! - [`Session`] - one connection's test and index, bound to the executor
//! - [`Output`] - what a command did
//!
//! Commands from one connection must be fed to its session one at a time,
//! in arrival order. Sessions of different connections run concurrently.

#![warn(missing_docs)]

mod command;
mod executor;
mod output;
mod session;

#[cfg(test)]
mod tests;

pub use command::Command;
pub use executor::Executor;
pub use output::Output;
pub use session::Session;
