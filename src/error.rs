//! Error types for stk500-uploader.
//!
//! Each layer has its own error enum; [`FlashError`] folds them together and
//! [`UploadError`] pins the umbrella error to the upload stage it came from.

use thiserror::Error;

use crate::protocol::{CommandKind, SessionState};
use crate::upload::UploadPhase;

/// Errors raised by a [`Transport`](crate::transport::Transport).
#[derive(Debug, Error)]
pub enum TransportError {
    /// I/O error on the underlying channel.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The channel could not be opened.
    #[error("Failed to open transport: {0}")]
    Open(String),

    /// An operation was attempted before `open` or after `close`.
    #[error("Transport is not open")]
    NotOpen,

    /// The channel has no DTR/RTS lines.
    #[error("Control lines are not supported by this transport")]
    ControlLinesUnsupported,

    /// `read_bytes` ran out of time before `expected` bytes arrived.
    #[error("Read timed out: received {received} of {expected} bytes")]
    Timeout { expected: usize, received: usize },
}

/// Intel HEX parse failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HexError {
    /// A line starting with `:` could not be decoded.
    #[error("Malformed record on line {line}: {reason}")]
    MalformedRecord { line: usize, reason: String },
}

/// Bootloader protocol failures.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The bootloader never answered `GetSync` in sync.
    #[error("Bootloader did not sync after {attempts} attempts")]
    SyncTimeout { attempts: u32 },

    /// Fewer response bytes than expected arrived before the deadline.
    #[error("Timed out waiting for {command} response: received {received} of {expected} bytes")]
    ResponseTimeout {
        command: CommandKind,
        expected: usize,
        received: usize,
    },

    /// The first response byte was not `STK_INSYNC`.
    #[error("{command} response out of sync: got 0x{byte:02X}")]
    OutOfSync { command: CommandKind, byte: u8 },

    /// The bootloader answered with a non-OK status.
    #[error("{command} failed with status 0x{status:02X}")]
    CommandFailed { command: CommandKind, status: u8 },

    /// The command is not valid in the current session state.
    #[error("{command} is not allowed in state {state:?}")]
    InvalidState {
        command: CommandKind,
        state: SessionState,
    },

    /// Page payload does not fit the 16-bit length field.
    #[error("Page payload of {0} bytes exceeds the protocol maximum")]
    PayloadTooLarge(usize),

    /// Transport failure while exchanging a command.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Any failure that can end an upload.
#[derive(Debug, Error)]
pub enum FlashError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Hex(#[from] HexError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The device signature differs from the board profile.
    #[error("Device signature {actual:02X?} does not match expected {expected:02X?}")]
    SignatureMismatch { expected: [u8; 3], actual: [u8; 3] },

    /// The caller cancelled the upload.
    #[error("Upload cancelled")]
    Cancelled,
}

/// Terminal upload failure, tagged with the stage where it happened.
#[derive(Debug, Error)]
#[error("Upload failed during {stage}: {source}")]
pub struct UploadError {
    pub stage: UploadPhase,
    #[source]
    pub source: FlashError,
}

impl UploadError {
    pub fn new(stage: UploadPhase, source: impl Into<FlashError>) -> Self {
        Self {
            stage,
            source: source.into(),
        }
    }

    /// True if the failure was a caller-requested cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self.source, FlashError::Cancelled)
    }
}

/// Board table loading and lookup failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A profile failed validation.
    #[error("Invalid board profile: {0}")]
    Invalid(String),

    /// No profile under the requested id.
    #[error("Unknown board: {0}")]
    UnknownBoard(String),
}

/// Result type alias using FlashError.
pub type Result<T> = std::result::Result<T, FlashError>;
