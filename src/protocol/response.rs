//! Reply decoding.
//!
//! A reply is `STK_INSYNC`, N value bytes, then one status byte. Anything
//! other than `STK_INSYNC` in the first position is a framing error; the
//! engine does not try to resynchronise inside a reply.

use bytes::Bytes;

use super::command::{CommandKind, STK_FAILED, STK_INSYNC, STK_NODEVICE, STK_OK, STK_UNKNOWN};
use crate::error::ProtocolError;

/// Trailing status byte of a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Failed,
    Unknown,
    NoDevice,
    Other(u8),
}

impl From<u8> for Status {
    fn from(byte: u8) -> Self {
        match byte {
            STK_OK => Status::Ok,
            STK_FAILED => Status::Failed,
            STK_UNKNOWN => Status::Unknown,
            STK_NODEVICE => Status::NoDevice,
            other => Status::Other(other),
        }
    }
}

impl Status {
    pub fn as_byte(self) -> u8 {
        match self {
            Status::Ok => STK_OK,
            Status::Failed => STK_FAILED,
            Status::Unknown => STK_UNKNOWN,
            Status::NoDevice => STK_NODEVICE,
            Status::Other(b) => b,
        }
    }

    /// `Ok(())` for `STK_OK`, `CommandFailed` for anything else.
    pub fn check(self, command: CommandKind) -> Result<(), ProtocolError> {
        match self {
            Status::Ok => Ok(()),
            other => Err(ProtocolError::CommandFailed {
                command,
                status: other.as_byte(),
            }),
        }
    }
}

/// Check the in-sync marker of a reply.
#[inline]
pub fn check_insync(command: CommandKind, byte: u8) -> Result<(), ProtocolError> {
    if byte == STK_INSYNC {
        Ok(())
    } else {
        Err(ProtocolError::OutOfSync { command, byte })
    }
}

/// Decode a complete reply carrying `value_len` value bytes.
///
/// Returns the value bytes on `STK_OK`.
pub fn decode_reply(
    command: CommandKind,
    reply: &Bytes,
    value_len: usize,
) -> Result<Bytes, ProtocolError> {
    let expected = value_len + 2;
    if reply.is_empty() {
        return Err(ProtocolError::ResponseTimeout {
            command,
            expected,
            received: 0,
        });
    }
    check_insync(command, reply[0])?;
    if reply.len() < expected {
        return Err(ProtocolError::ResponseTimeout {
            command,
            expected,
            received: reply.len(),
        });
    }
    Status::from(reply[expected - 1]).check(command)?;
    Ok(reply.slice(1..1 + value_len))
}
