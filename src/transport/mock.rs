//! Scripted transport for tests.
//!
//! Every write is recorded and handed to a responder closure; whatever the
//! responder returns is queued as input for the following reads. Returning
//! `None` leaves the bootloader silent so reads time out.
//!
//! # Example
//!
//! ```ignore
//! use stk500_uploader::transport::mock::MockTransport;
//! use stk500_uploader::protocol::{STK_FAILED, STK_INSYNC};
//!
//! // Answer everything normally except page writes.
//! let transport = MockTransport::with_responder(|cmd| match cmd[0] {
//!     0x64 => Some(vec![STK_INSYNC, STK_FAILED]),
//!     _ => MockTransport::default_reply(cmd),
//! });
//! ```

use std::time::Duration;

use bytes::{Bytes, BytesMut};

use super::Transport;
use crate::error::TransportError;
use crate::protocol::{opcode, Parameter, STK_INSYNC, STK_OK};

/// Signature reported by [`MockTransport::default_reply`] (ATmega328P).
pub const MOCK_SIGNATURE: [u8; 3] = [0x1E, 0x95, 0x0F];

type Responder = Box<dyn FnMut(&[u8]) -> Option<Vec<u8>> + Send>;

/// Control-line change observed by the mock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
    Dtr(bool),
    Rts(bool),
}

/// In-memory [`Transport`] with a programmable bootloader.
pub struct MockTransport {
    responder: Responder,
    rx: BytesMut,
    writes: Vec<Vec<u8>>,
    control_events: Vec<ControlEvent>,
    control_lines: bool,
    fail_open: bool,
    is_open: bool,
    baud_rate: Option<u32>,
    open_count: usize,
    close_count: usize,
}

impl MockTransport {
    /// A well-behaved STK500v1 bootloader.
    pub fn new() -> Self {
        Self::with_responder(Self::default_reply)
    }

    /// A bootloader driven by `responder`.
    pub fn with_responder<F>(responder: F) -> Self
    where
        F: FnMut(&[u8]) -> Option<Vec<u8>> + Send + 'static,
    {
        Self {
            responder: Box::new(responder),
            rx: BytesMut::new(),
            writes: Vec::new(),
            control_events: Vec::new(),
            control_lines: true,
            fail_open: false,
            is_open: false,
            baud_rate: None,
            open_count: 0,
            close_count: 0,
        }
    }

    /// Make `open` fail.
    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    /// Report DTR/RTS as unsupported.
    pub fn without_control_lines(mut self) -> Self {
        self.control_lines = false;
        self
    }

    /// Reply of a healthy bootloader to one complete command.
    pub fn default_reply(cmd: &[u8]) -> Option<Vec<u8>> {
        match cmd.first().copied() {
            Some(opcode::READ_SIGN) => {
                let mut reply = vec![STK_INSYNC];
                reply.extend_from_slice(&MOCK_SIGNATURE);
                reply.push(STK_OK);
                Some(reply)
            }
            Some(opcode::GET_PARAMETER) => {
                let value = match cmd.get(1).copied() {
                    Some(p) if p == Parameter::SwMajor.as_byte() => 8,
                    Some(p) if p == Parameter::SwMinor.as_byte() => 0,
                    _ => 3,
                };
                Some(vec![STK_INSYNC, value, STK_OK])
            }
            Some(_) => Some(vec![STK_INSYNC, STK_OK]),
            None => None,
        }
    }

    /// Queue raw input bytes regardless of what was written.
    pub fn inject_rx(&mut self, data: &[u8]) {
        self.rx.extend_from_slice(data);
    }

    /// Every `write_bytes` call, in order.
    pub fn writes(&self) -> &[Vec<u8>] {
        &self.writes
    }

    /// Opcodes of every write, in order.
    pub fn opcodes(&self) -> Vec<u8> {
        self.writes.iter().filter_map(|w| w.first().copied()).collect()
    }

    pub fn control_events(&self) -> &[ControlEvent] {
        &self.control_events
    }

    pub fn baud_rate(&self) -> Option<u32> {
        self.baud_rate
    }

    pub fn is_open(&self) -> bool {
        self.is_open
    }

    pub fn open_count(&self) -> usize {
        self.open_count
    }

    /// Number of `close` calls, including redundant ones.
    pub fn close_count(&self) -> usize {
        self.close_count
    }

    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.is_open {
            Ok(())
        } else {
            Err(TransportError::NotOpen)
        }
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MockTransport {
    async fn open(&mut self, baud_rate: u32) -> Result<(), TransportError> {
        self.open_count += 1;
        if self.fail_open {
            return Err(TransportError::Open("mock port unavailable".to_string()));
        }
        self.is_open = true;
        self.baud_rate = Some(baud_rate);
        Ok(())
    }

    async fn set_dtr(&mut self, level: bool) -> Result<(), TransportError> {
        if !self.control_lines {
            return Err(TransportError::ControlLinesUnsupported);
        }
        self.control_events.push(ControlEvent::Dtr(level));
        Ok(())
    }

    async fn set_rts(&mut self, level: bool) -> Result<(), TransportError> {
        if !self.control_lines {
            return Err(TransportError::ControlLinesUnsupported);
        }
        self.control_events.push(ControlEvent::Rts(level));
        Ok(())
    }

    async fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.ensure_open()?;
        self.writes.push(bytes.to_vec());
        if let Some(reply) = (self.responder)(bytes) {
            self.rx.extend_from_slice(&reply);
        }
        Ok(())
    }

    async fn read_bytes(
        &mut self,
        count: usize,
        _timeout: Duration,
    ) -> Result<Bytes, TransportError> {
        self.ensure_open()?;
        if self.rx.len() >= count {
            return Ok(self.rx.split_to(count).freeze());
        }
        // Not enough input: behave like an expired deadline.
        let received = self.rx.len();
        self.rx.clear();
        Err(TransportError::Timeout {
            expected: count,
            received,
        })
    }

    async fn clear_input(&mut self) -> Result<(), TransportError> {
        self.rx.clear();
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.close_count += 1;
        self.is_open = false;
        Ok(())
    }
}
