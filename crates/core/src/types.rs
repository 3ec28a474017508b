//! Core types for testsync
//!
//! This module defines the identifiers shared by every layer:
//! - TestId: externally supplied identifier grouping one payload, its
//!   connected participants and its checkpoints
//! - ConnectionIndex: stable position of a connection inside its test

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of a test.
///
/// Test IDs are never generated by the server; they come from the URL a
/// client connects to (`/register/{test_id}`, `/tests/{test_id}`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TestId(u64);

impl TestId {
    /// Wrap a raw test number.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// The raw test number.
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl From<u64> for TestId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for TestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TestId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u64>().map(Self)
    }
}

/// Zero-based position of a connection in its test's connection registry.
///
/// Indices are assigned on registration and never reused or renumbered,
/// even after the connection closes.
pub type ConnectionIndex = usize;
