//! Error types for the channel engine

use thiserror::Error;

use crate::channel::ChannelId;

/// Errors returned by channel and instance operations
#[derive(Debug, Error)]
pub enum AtError {
    /// The channel or its modem instance has been closed
    #[error("channel closed")]
    ChannelClosed,

    /// Another command is already outstanding on this channel
    #[error("command already pending on channel")]
    CommandPending,

    /// No final response arrived before the deadline
    #[error("command timed out")]
    Timeout,

    /// I/O failure on the underlying transport
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A command was issued from inside the reader loop
    #[error("command issued from the reader loop")]
    InvalidThread,

    /// The modem reported success but sent none of the expected data
    #[error("invalid response: success without data")]
    InvalidResponse,

    /// The transport refused the write because the modem is not draining it
    #[error("modem blocked")]
    ModemBlocked,

    /// Channel id outside the registry
    #[error("channel {id} out of range (capacity {capacity})")]
    InvalidChannel {
        /// Requested id
        id: ChannelId,
        /// Registry capacity
        capacity: usize,
    },

    /// No channel is open with this id
    #[error("channel {0} is not open")]
    UnknownChannel(ChannelId),

    /// A channel is already open with this id
    #[error("channel {0} is already open")]
    ChannelInUse(ChannelId),

    /// Serial port error
    #[error("serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),

    /// Configuration could not be parsed
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}
