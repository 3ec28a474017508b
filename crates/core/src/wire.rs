//! Wire envelope shared by clients and the server
//!
//! Every frame exchanged on a registered connection is a JSON envelope
//! `{"command": <name>, "content": <command-specific JSON>}`. The only
//! exception is the `read_data` reply, which is the raw payload sent as a
//! binary frame.
//!
//! `content` is kept as raw JSON: `update_data` stores it byte-for-byte,
//! so a client reading the payload back receives exactly what it sent.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::value::RawValue;

use crate::error::{Error, Result};

/// `read_data` command name
pub const READ_DATA: &str = "read_data";
/// `update_data` command name
pub const UPDATE_DATA: &str = "update_data";
/// `get_connection_count` command name
pub const GET_CONNECTION_COUNT: &str = "get_connection_count";
/// `wait_checkpoint` command name
pub const WAIT_CHECKPOINT: &str = "wait_checkpoint";
/// `close` command name
pub const CLOSE: &str = "close";

/// One outbound unit written to a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// JSON envelope
    Text(String),
    /// Raw payload bytes
    Binary(Vec<u8>),
}

impl Frame {
    /// Bytes carried by the frame, whatever its kind.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Frame::Text(text) => text.as_bytes(),
            Frame::Binary(data) => data,
        }
    }
}

/// Command envelope, used in both directions.
#[derive(Debug, Serialize, Deserialize)]
pub struct Message {
    /// Command name, one of the constants in this module
    pub command: String,
    /// Command-specific JSON, kept verbatim
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Box<RawValue>>,
}

impl Message {
    /// Build an envelope around a serializable reply.
    pub fn new<T: Serialize>(command: &str, content: &T) -> Result<Self> {
        Ok(Self {
            command: command.to_string(),
            content: Some(serde_json::value::to_raw_value(content)?),
        })
    }

    /// Decode an inbound frame.
    ///
    /// # Errors
    ///
    /// Returns `Error::Decode` when the bytes are not a JSON envelope.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Encode as a text frame.
    pub fn to_frame(&self) -> Result<Frame> {
        Ok(Frame::Text(serde_json::to_string(self)?))
    }

    /// Raw JSON text of `content`, empty when absent.
    pub fn content_bytes(&self) -> &[u8] {
        self.content
            .as_deref()
            .map(|raw| raw.get().as_bytes())
            .unwrap_or_default()
    }

    /// Parse `content` into a typed request.
    ///
    /// # Errors
    ///
    /// Returns `Error::Decode` when `content` is missing or has the wrong shape.
    pub fn parse_content<T: DeserializeOwned>(&self) -> Result<T> {
        let raw = self
            .content
            .as_deref()
            .ok_or_else(|| Error::Decode(format!("{} requires content", self.command)))?;
        Ok(serde_json::from_str(raw.get())?)
    }
}

/// `wait_checkpoint` request content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointRequest {
    /// Checkpoint name, unique within a test
    pub identifier: String,
    /// Arrivals needed before release; only the first request's value counts.
    ///
    /// Missing or negative counts read as 0, which releases on the first arrival.
    #[serde(default, deserialize_with = "non_negative_count")]
    pub target_count: usize,
}

fn non_negative_count<'de, D>(deserializer: D) -> std::result::Result<usize, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = i64::deserialize(deserializer)?;
    Ok(usize::try_from(raw).unwrap_or(0))
}

/// `get_connection_count` reply content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionCount {
    /// Connections ever registered for the test
    pub count: usize,
}

/// Immediate `wait_checkpoint` reply for a checkpoint that already finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointStatus {
    /// Checkpoint name
    pub identifier: String,
    /// Always true for this reply
    pub finished: bool,
}

/// Broadcast `wait_checkpoint` release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointRelease {
    /// Checkpoint name
    pub identifier: String,
    /// Always true for a release
    pub finished: bool,
    /// When participants should start, epoch milliseconds
    pub start_at: i64,
}
