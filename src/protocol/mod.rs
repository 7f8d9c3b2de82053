//! Protocol module - STK500v1 commands, replies and the session engine.
//!
//! This module implements the bootloader side of an upload:
//! - Fixed-format command encoding (opcode, parameters, `CRC_EOP`)
//! - Reply decoding (`STK_INSYNC`, value bytes, status)
//! - [`Stk500`], the one-command-at-a-time session state machine

mod command;
mod engine;
mod response;

pub use command::{
    opcode, Command, CommandKind, MemoryType, Parameter, CRC_EOP, STK_FAILED, STK_INSYNC,
    STK_NODEVICE, STK_NOSYNC, STK_OK, STK_UNKNOWN,
};
pub use engine::{
    ProtocolConfig, SessionState, Stk500, DEFAULT_RESPONSE_TIMEOUT, DEFAULT_SYNC_ATTEMPTS,
    DEFAULT_SYNC_BACKOFF,
};
pub use response::{check_insync, decode_reply, Status};
