//! STK500v1 session state machine.
//!
//! [`Stk500`] owns the transport for the length of a session and issues one
//! command at a time: every operation writes a command, then reads its full
//! reply (or declares a timeout) before returning.
//!
//! ```text
//! Unsynced ──sync──► Synced ──enter──► ProgramMode ──leave──► Terminated
//!     └──────────────────┴─────────────────┴──────────┴── any error ──► Failed
//!
//! Failed ──sync──► Synced
//! ```
//!
//! # Example
//!
//! ```ignore
//! let mut session = Stk500::new(transport, ProtocolConfig::default());
//! session.sync().await?;
//! session.enter_program_mode().await?;
//! session.program_page(0x0000, &page).await?;
//! session.leave_program_mode().await?;
//! let transport = session.into_inner();
//! ```

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::time::Instant;

use super::command::{Command, CommandKind, MemoryType, Parameter};
use super::response::{check_insync, decode_reply};
use crate::error::{ProtocolError, TransportError};
use crate::transport::Transport;

/// Default number of `GetSync` attempts.
pub const DEFAULT_SYNC_ATTEMPTS: u32 = 10;

/// Default pause between sync attempts.
pub const DEFAULT_SYNC_BACKOFF: Duration = Duration::from_millis(100);

/// Default deadline for one complete reply.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Protocol timing.
#[derive(Debug, Clone)]
pub struct ProtocolConfig {
    /// Upper bound on `GetSync` attempts.
    pub sync_attempts: u32,
    /// Sleep between failed sync attempts.
    pub sync_backoff: Duration,
    /// Deadline for each reply.
    pub response_timeout: Duration,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            sync_attempts: DEFAULT_SYNC_ATTEMPTS,
            sync_backoff: DEFAULT_SYNC_BACKOFF,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
        }
    }
}

/// Session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unsynced,
    Synced,
    ProgramMode,
    Terminated,
    Failed,
}

/// An STK500v1 session over a [`Transport`].
pub struct Stk500<T> {
    transport: T,
    config: ProtocolConfig,
    state: SessionState,
    sync_attempts_used: u32,
}

impl<T: Transport> Stk500<T> {
    /// Start an unsynchronised session on an open transport.
    pub fn new(transport: T, config: ProtocolConfig) -> Self {
        Self {
            transport,
            config,
            state: SessionState::Unsynced,
            sync_attempts_used: 0,
        }
    }

    #[inline]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[inline]
    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    /// Attempts taken by the last `sync` call (0 before the first).
    #[inline]
    pub fn sync_attempts_used(&self) -> u32 {
        self.sync_attempts_used
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// End the session and hand the transport back.
    pub fn into_inner(self) -> T {
        self.transport
    }

    /// Handshake with the bootloader.
    ///
    /// Sends `GetSync` up to `sync_attempts` times, sleeping `sync_backoff`
    /// between tries. Timeouts and bad replies are retried; transport
    /// failures are not.
    pub async fn sync(&mut self) -> Result<(), ProtocolError> {
        self.require(
            CommandKind::GetSync,
            &[
                SessionState::Unsynced,
                SessionState::Synced,
                SessionState::ProgramMode,
                SessionState::Failed,
            ],
        )?;

        let attempts = self.config.sync_attempts.max(1);
        for attempt in 1..=attempts {
            self.sync_attempts_used = attempt;

            // Late replies to an earlier attempt would shift every later read.
            if let Err(e) = self.transport.clear_input().await {
                tracing::debug!("Could not clear input before sync: {}", e);
            }

            match self.exchange(&Command::GetSync).await {
                Ok(_) => {
                    tracing::info!("Bootloader in sync after {} attempt(s)", attempt);
                    self.state = SessionState::Synced;
                    return Ok(());
                }
                Err(
                    e @ (ProtocolError::ResponseTimeout { .. }
                    | ProtocolError::OutOfSync { .. }
                    | ProtocolError::CommandFailed { .. }),
                ) => {
                    tracing::warn!("Sync attempt {}/{} failed: {}", attempt, attempts, e);
                }
                Err(e) => {
                    self.state = SessionState::Failed;
                    return Err(e);
                }
            }

            if attempt < attempts {
                tokio::time::sleep(self.config.sync_backoff).await;
            }
        }

        self.state = SessionState::Failed;
        Err(ProtocolError::SyncTimeout { attempts })
    }

    pub async fn enter_program_mode(&mut self) -> Result<(), ProtocolError> {
        self.require(
            CommandKind::EnterProgMode,
            &[SessionState::Synced, SessionState::ProgramMode],
        )?;
        self.run(Command::EnterProgMode).await?;
        self.state = SessionState::ProgramMode;
        Ok(())
    }

    pub async fn leave_program_mode(&mut self) -> Result<(), ProtocolError> {
        self.require(CommandKind::LeaveProgMode, &[SessionState::ProgramMode])?;
        self.run(Command::LeaveProgMode).await?;
        self.state = SessionState::Terminated;
        Ok(())
    }

    /// Load `address` as given (word vs. byte addressing is the caller's call).
    pub async fn set_address(&mut self, address: u16) -> Result<(), ProtocolError> {
        self.require(CommandKind::LoadAddress, &[SessionState::ProgramMode])?;
        self.run(Command::LoadAddress(address)).await?;
        Ok(())
    }

    /// Write one flash page: `LoadAddress(address)` followed by `ProgPage`.
    ///
    /// A failed write is final; there is no per-page retry.
    pub async fn program_page(
        &mut self,
        address: u16,
        payload: &[u8],
    ) -> Result<(), ProtocolError> {
        self.require(CommandKind::ProgPage, &[SessionState::ProgramMode])?;
        if payload.len() > u16::MAX as usize {
            self.state = SessionState::Failed;
            return Err(ProtocolError::PayloadTooLarge(payload.len()));
        }

        self.set_address(address).await?;
        self.run(Command::ProgPage {
            memory: MemoryType::Flash,
            payload: Bytes::copy_from_slice(payload),
        })
        .await?;
        Ok(())
    }

    /// Read the three device signature bytes.
    pub async fn read_signature(&mut self) -> Result<[u8; 3], ProtocolError> {
        self.require(
            CommandKind::ReadSignature,
            &[SessionState::Synced, SessionState::ProgramMode],
        )?;
        let value = self.run(Command::ReadSignature).await?;
        Ok([value[0], value[1], value[2]])
    }

    /// Read a single bootloader parameter.
    pub async fn get_parameter(&mut self, param: Parameter) -> Result<u8, ProtocolError> {
        self.require(
            CommandKind::GetParameter,
            &[SessionState::Synced, SessionState::ProgramMode],
        )?;
        let value = self.run(Command::GetParameter(param)).await?;
        Ok(value[0])
    }

    /// Reject `command` outside `allowed` states; the rejection fails the session.
    fn require(
        &mut self,
        command: CommandKind,
        allowed: &[SessionState],
    ) -> Result<(), ProtocolError> {
        if allowed.contains(&self.state) {
            return Ok(());
        }
        let err = ProtocolError::InvalidState {
            command,
            state: self.state,
        };
        tracing::debug!("{}", err);
        self.state = SessionState::Failed;
        Err(err)
    }

    /// Exchange a command; any failure moves the session to `Failed`.
    async fn run(&mut self, command: Command) -> Result<Bytes, ProtocolError> {
        match self.exchange(&command).await {
            Ok(value) => Ok(value),
            Err(e) => {
                tracing::debug!("{} failed: {}", command.kind(), e);
                self.state = SessionState::Failed;
                Err(e)
            }
        }
    }

    /// Write one command and read its complete reply.
    async fn exchange(&mut self, command: &Command) -> Result<Bytes, ProtocolError> {
        let kind = command.kind();
        let frame = command.encode();
        tracing::debug!("-> {} ({} bytes)", kind, frame.len());
        self.transport.write_bytes(&frame).await?;

        let value_len = command.response_len();
        let expected = value_len + 2;
        let deadline = Instant::now() + self.config.response_timeout;

        let head = self.read_part(kind, 1, deadline, 0, expected).await?;
        check_insync(kind, head[0])?;

        let tail = self.read_part(kind, value_len + 1, deadline, 1, expected).await?;
        let mut reply = BytesMut::with_capacity(expected);
        reply.extend_from_slice(&head);
        reply.extend_from_slice(&tail);

        let value = decode_reply(kind, &reply.freeze(), value_len)?;
        tracing::debug!("<- {} OK", kind);
        Ok(value)
    }

    /// Read part of a reply against the shared deadline.
    async fn read_part(
        &mut self,
        kind: CommandKind,
        count: usize,
        deadline: Instant,
        already: usize,
        expected: usize,
    ) -> Result<Bytes, ProtocolError> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match self.transport.read_bytes(count, remaining).await {
            Ok(bytes) => Ok(bytes),
            Err(TransportError::Timeout { received, .. }) => Err(ProtocolError::ResponseTimeout {
                command: kind,
                expected,
                received: already + received,
            }),
            Err(e) => Err(e.into()),
        }
    }
}
