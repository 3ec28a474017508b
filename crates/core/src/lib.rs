//! Core types and traits for testsync
//!
//! This crate defines the foundational types used throughout the system:
//! - TestId: identifier of a test
//! - Error: error type hierarchy
//! - Wire: command envelope and reply shapes
//! - Traits: Connection and DataStore abstractions

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod traits;
pub mod types;
pub mod wire;

pub use error::{Error, Result};
pub use traits::{Connection, DataStore};
pub use types::{ConnectionIndex, TestId};
pub use wire::{
    CheckpointRelease, CheckpointRequest, CheckpointStatus, ConnectionCount, Frame, Message,
};
