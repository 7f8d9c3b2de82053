//! STK500v1 command encoding.
//!
//! Every command is an opcode, zero or more parameter bytes and `CRC_EOP`:
//! ```text
//! ┌────────┬──────────────────┬─────────┐
//! │ Opcode │ Parameters       │ CRC_EOP │
//! │ 1 byte │ 0..n bytes       │ 0x20    │
//! └────────┴──────────────────┴─────────┘
//! ```
//!
//! Replies are `STK_INSYNC`, [`Command::response_len`] value bytes, then a
//! status byte.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

/// Status: command succeeded.
pub const STK_OK: u8 = 0x10;
/// Status: command failed.
pub const STK_FAILED: u8 = 0x11;
/// Status: unknown command.
pub const STK_UNKNOWN: u8 = 0x12;
/// Status: no target device.
pub const STK_NODEVICE: u8 = 0x13;
/// First byte of every in-sync reply.
pub const STK_INSYNC: u8 = 0x14;
/// Reply to a command without a valid end marker.
pub const STK_NOSYNC: u8 = 0x15;
/// End-of-command marker.
pub const CRC_EOP: u8 = 0x20;

/// Opcode bytes.
pub mod opcode {
    pub const GET_SYNC: u8 = 0x30;
    pub const GET_PARAMETER: u8 = 0x41;
    pub const ENTER_PROGMODE: u8 = 0x50;
    pub const LEAVE_PROGMODE: u8 = 0x51;
    pub const LOAD_ADDRESS: u8 = 0x55;
    pub const PROG_PAGE: u8 = 0x64;
    pub const READ_SIGN: u8 = 0x75;
}

/// Target memory of a page write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryType {
    Flash,
    Eeprom,
}

impl MemoryType {
    #[inline]
    pub fn as_byte(self) -> u8 {
        match self {
            MemoryType::Flash => b'F',
            MemoryType::Eeprom => b'E',
        }
    }
}

/// Bootloader parameters readable with `GetParameter`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parameter {
    HwVersion,
    SwMajor,
    SwMinor,
}

impl Parameter {
    #[inline]
    pub fn as_byte(self) -> u8 {
        match self {
            Parameter::HwVersion => 0x80,
            Parameter::SwMajor => 0x81,
            Parameter::SwMinor => 0x82,
        }
    }
}

/// Payload-free command identifier, used in errors and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    GetSync,
    GetParameter,
    EnterProgMode,
    LeaveProgMode,
    LoadAddress,
    ProgPage,
    ReadSignature,
}

impl CommandKind {
    #[inline]
    pub fn opcode(self) -> u8 {
        match self {
            CommandKind::GetSync => opcode::GET_SYNC,
            CommandKind::GetParameter => opcode::GET_PARAMETER,
            CommandKind::EnterProgMode => opcode::ENTER_PROGMODE,
            CommandKind::LeaveProgMode => opcode::LEAVE_PROGMODE,
            CommandKind::LoadAddress => opcode::LOAD_ADDRESS,
            CommandKind::ProgPage => opcode::PROG_PAGE,
            CommandKind::ReadSignature => opcode::READ_SIGN,
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CommandKind::GetSync => "GET_SYNC",
            CommandKind::GetParameter => "GET_PARAMETER",
            CommandKind::EnterProgMode => "ENTER_PROGMODE",
            CommandKind::LeaveProgMode => "LEAVE_PROGMODE",
            CommandKind::LoadAddress => "LOAD_ADDRESS",
            CommandKind::ProgPage => "PROG_PAGE",
            CommandKind::ReadSignature => "READ_SIGN",
        };
        f.write_str(name)
    }
}

/// A complete STK500v1 command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    GetSync,
    GetParameter(Parameter),
    EnterProgMode,
    LeaveProgMode,
    /// Address bytes are sent as given, low byte first.
    LoadAddress(u16),
    ProgPage {
        memory: MemoryType,
        payload: Bytes,
    },
    ReadSignature,
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::GetSync => CommandKind::GetSync,
            Command::GetParameter(_) => CommandKind::GetParameter,
            Command::EnterProgMode => CommandKind::EnterProgMode,
            Command::LeaveProgMode => CommandKind::LeaveProgMode,
            Command::LoadAddress(_) => CommandKind::LoadAddress,
            Command::ProgPage { .. } => CommandKind::ProgPage,
            Command::ReadSignature => CommandKind::ReadSignature,
        }
    }

    /// Number of value bytes between `STK_INSYNC` and the status byte.
    pub fn response_len(&self) -> usize {
        match self {
            Command::GetParameter(_) => 1,
            Command::ReadSignature => 3,
            _ => 0,
        }
    }

    /// Encoded length including opcode and `CRC_EOP`.
    pub fn encoded_len(&self) -> usize {
        2 + match self {
            Command::GetParameter(_) => 1,
            Command::LoadAddress(_) => 2,
            Command::ProgPage { payload, .. } => 3 + payload.len(),
            _ => 0,
        }
    }

    /// Encode into a fresh buffer.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode_into(&mut buf);
        buf.freeze()
    }

    /// Append the encoded command to `buf`.
    ///
    /// Page payloads longer than `u16::MAX` are a caller bug; the engine
    /// rejects them before encoding.
    pub fn encode_into(&self, buf: &mut BytesMut) {
        buf.put_u8(self.kind().opcode());
        match self {
            Command::GetParameter(param) => buf.put_u8(param.as_byte()),
            Command::LoadAddress(address) => buf.put_u16_le(*address),
            Command::ProgPage { memory, payload } => {
                debug_assert!(payload.len() <= u16::MAX as usize);
                buf.put_u16(payload.len() as u16);
                buf.put_u8(memory.as_byte());
                buf.put_slice(payload);
            }
            _ => {}
        }
        buf.put_u8(CRC_EOP);
    }
}
