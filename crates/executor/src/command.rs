//! Command enum defining every operation a registered connection can request.
//!
//! Inbound frames are decoded once, here, into a closed set of variants.
//! Anything with a well-formed envelope but an unknown name becomes
//! [`Command::Unrecognized`] so the dispatcher can report it by name.

use testsync_core::wire::{self, CheckpointRequest, Message};
use testsync_core::Result;

/// A decoded client command.
///
/// | Command | Content | Reply |
/// |---------|---------|-------|
/// | `read_data` | ignored | payload as a binary frame |
/// | `update_data` | any JSON, stored verbatim | none |
/// | `get_connection_count` | ignored | `{"count": n}` |
/// | `wait_checkpoint` | `{"identifier", "target_count"}` | release broadcast, or `{"identifier", "finished": true}` if already released |
/// | `close` | ignored | none, the connection closes |
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Send the test's payload back to the caller
    ReadData,
    /// Overwrite the test's payload
    UpdateData {
        /// Raw JSON text of the envelope's `content`
        payload: Vec<u8>,
    },
    /// Report how many connections the test has seen
    GetConnectionCount,
    /// Arrive at a checkpoint
    WaitCheckpoint {
        /// Checkpoint name
        identifier: String,
        /// Arrivals required for release
        target_count: usize,
    },
    /// Close the calling connection
    Close,
    /// Envelope with a command name this server does not know
    Unrecognized {
        /// The name as received
        name: String,
    },
}

impl Command {
    /// Decode an inbound frame.
    ///
    /// # Errors
    ///
    /// `Error::Decode` if the frame is not an envelope, or if a
    /// `wait_checkpoint` content is malformed.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Self::from_message(Message::decode(bytes)?)
    }

    /// Interpret a decoded envelope.
    pub fn from_message(message: Message) -> Result<Self> {
        let command = match message.command.as_str() {
            wire::READ_DATA => Command::ReadData,
            wire::UPDATE_DATA => Command::UpdateData {
                payload: message.content_bytes().to_vec(),
            },
            wire::GET_CONNECTION_COUNT => Command::GetConnectionCount,
            wire::WAIT_CHECKPOINT => {
                let request: CheckpointRequest = message.parse_content()?;
                Command::WaitCheckpoint {
                    identifier: request.identifier,
                    target_count: request.target_count,
                }
            }
            wire::CLOSE => Command::Close,
            _ => Command::Unrecognized {
                name: message.command,
            },
        };
        Ok(command)
    }

    /// Command name as it appears on the wire.
    pub fn name(&self) -> &str {
        match self {
            Command::ReadData => wire::READ_DATA,
            Command::UpdateData { .. } => wire::UPDATE_DATA,
            Command::GetConnectionCount => wire::GET_CONNECTION_COUNT,
            Command::WaitCheckpoint { .. } => wire::WAIT_CHECKPOINT,
            Command::Close => wire::CLOSE,
            Command::Unrecognized { name } => name,
        }
    }
}
