//! # stk500-uploader
//!
//! Async firmware uploader for AVR boards running an STK500v1 bootloader
//! (Optiboot on the Arduino Uno, Nano, Pro Mini and friends).
//!
//! ## Architecture
//!
//! ```text
//!  Intel HEX text ──► hex ──► WriteOperations ─┐
//!                                               ▼
//!  BoardProfile ──────────────────────────► upload::Uploader ──► UploadProgress
//!                                               │
//!                                               ▼
//!                                       protocol::Stk500
//!                                               │
//!                                               ▼
//!                                     transport::Transport (serial, stream, mock)
//! ```
//!
//! - **Hex Loader** ([`hex`]): Intel HEX parsing into ordered write operations
//! - **Transport** ([`transport`]): byte channel with DTR/RTS reset lines
//! - **Protocol Engine** ([`protocol`]): STK500v1 commands and session state
//! - **Orchestrator** ([`upload`]): reset, sync, program, verify, cleanup
//!
//! ## Example
//!
//! ```ignore
//! use stk500_uploader::{BoardTable, SerialTransport, UploadProgress, Uploader};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let board = BoardTable::builtin().require("uno")?.clone();
//!     let firmware = std::fs::read_to_string("blink.hex")?;
//!
//!     let report = Uploader::new(board)
//!         .upload(
//!             SerialTransport::new("/dev/ttyACM0"),
//!             &firmware,
//!             |p: &UploadProgress| println!("[{:3}%] {}", p.percent, p.message),
//!         )
//!         .await?;
//!
//!     println!("{} bytes written", report.bytes_written);
//!     Ok(())
//! }
//! ```

pub mod board;
pub mod error;
pub mod hex;
pub mod protocol;
pub mod transport;
pub mod upload;

pub use board::{BoardProfile, BoardTable, ProtocolVariant};
pub use error::{ConfigError, FlashError, HexError, ProtocolError, TransportError, UploadError};
pub use protocol::Stk500;
#[cfg(feature = "serial")]
pub use transport::SerialTransport;
pub use transport::{StreamTransport, Transport};
pub use upload::{CancelHandle, ProgressObserver, Stage, UploadProgress, UploadReport, Uploader};
