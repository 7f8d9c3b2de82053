//! Upload orchestration.
//!
//! The [`UploaderBuilder`] provides a fluent API for the timing knobs; the
//! [`Uploader`] drives one complete upload:
//! 1. Parse the hex text (before touching the board)
//! 2. Open the transport and pulse reset
//! 3. Sync with the bootloader (and check the signature if the board has one)
//! 4. Enter programming mode and write every page in file order
//! 5. Verification delay, leave programming mode
//! 6. Close the transport, exactly once, on every path
//!
//! # Example
//!
//! ```ignore
//! use stk500_uploader::board::BoardProfile;
//! use stk500_uploader::transport::SerialTransport;
//! use stk500_uploader::upload::{UploadProgress, Uploader};
//!
//! let uploader = Uploader::builder(BoardProfile::uno())
//!     .sync_attempts(5)
//!     .build();
//!
//! let report = uploader
//!     .upload(SerialTransport::new("/dev/ttyACM0"), &hex_text, |p: &UploadProgress| {
//!         println!("[{:3}%] {}", p.percent, p.message);
//!     })
//!     .await?;
//! println!("{} bytes in {:?}", report.bytes_written, report.elapsed);
//! ```

use std::time::Duration;

use tokio::time::Instant;

use super::cancel::CancelHandle;
use super::progress::{upload_percent, ProgressObserver, Stage, UploadProgress};
use super::state::{UploadPhase, UploadState};
use crate::board::BoardProfile;
use crate::error::{FlashError, UploadError};
use crate::hex::{self, WriteOperation};
use crate::protocol::{ProtocolConfig, SessionState, Stk500};
use crate::transport::Transport;

/// Default time reset is held asserted.
pub const DEFAULT_RESET_PULSE: Duration = Duration::from_millis(100);

/// Default wait after releasing reset, for the bootloader to start.
pub const DEFAULT_RESET_SETTLE: Duration = Duration::from_secs(2);

/// Default pause between page writes.
pub const DEFAULT_PAGE_DELAY: Duration = Duration::from_millis(10);

/// Default length of the verification step.
pub const DEFAULT_VERIFY_DELAY: Duration = Duration::from_millis(500);

/// Upload timing.
#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub protocol: ProtocolConfig,
    pub reset_pulse: Duration,
    pub reset_settle: Duration,
    /// Gives the bootloader time to drain its receive buffer.
    pub page_delay: Duration,
    /// The verification step only waits; flash is not read back.
    pub verify_delay: Duration,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            protocol: ProtocolConfig::default(),
            reset_pulse: DEFAULT_RESET_PULSE,
            reset_settle: DEFAULT_RESET_SETTLE,
            page_delay: DEFAULT_PAGE_DELAY,
            verify_delay: DEFAULT_VERIFY_DELAY,
        }
    }
}

/// Summary of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReport {
    pub pages_written: usize,
    pub bytes_written: usize,
    /// `GetSync` attempts needed to reach the bootloader.
    pub sync_attempts: u32,
    pub elapsed: Duration,
}

/// Builder for an [`Uploader`].
pub struct UploaderBuilder {
    board: BoardProfile,
    config: UploadConfig,
    cancel: CancelHandle,
}

impl UploaderBuilder {
    /// Create a builder for `board` with default timing.
    pub fn new(board: BoardProfile) -> Self {
        Self {
            board,
            config: UploadConfig::default(),
            cancel: CancelHandle::new(),
        }
    }

    /// Replace the whole timing configuration.
    pub fn config(mut self, config: UploadConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the number of `GetSync` attempts.
    ///
    /// Default: 10
    pub fn sync_attempts(mut self, attempts: u32) -> Self {
        self.config.protocol.sync_attempts = attempts;
        self
    }

    /// Set the pause between sync attempts.
    ///
    /// Default: 100 ms
    pub fn sync_backoff(mut self, backoff: Duration) -> Self {
        self.config.protocol.sync_backoff = backoff;
        self
    }

    /// Set the deadline for each bootloader reply.
    ///
    /// Default: 5 seconds
    pub fn response_timeout(mut self, timeout: Duration) -> Self {
        self.config.protocol.response_timeout = timeout;
        self
    }

    /// Default: 100 ms
    pub fn reset_pulse(mut self, pulse: Duration) -> Self {
        self.config.reset_pulse = pulse;
        self
    }

    /// Set the wait after reset before the first sync.
    ///
    /// Default: 2 seconds
    pub fn reset_settle(mut self, settle: Duration) -> Self {
        self.config.reset_settle = settle;
        self
    }

    /// Default: 10 ms
    pub fn page_delay(mut self, delay: Duration) -> Self {
        self.config.page_delay = delay;
        self
    }

    /// Default: 500 ms
    pub fn verify_delay(mut self, delay: Duration) -> Self {
        self.config.verify_delay = delay;
        self
    }

    /// Use an existing cancel handle instead of a fresh one.
    pub fn cancel_handle(mut self, cancel: CancelHandle) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn build(self) -> Uploader {
        Uploader {
            board: self.board,
            config: self.config,
            cancel: self.cancel,
        }
    }
}

/// Uploads firmware to one board.
///
/// An uploader can be reused; each [`upload`](Self::upload) call is an
/// independent session on the transport it is given. A cancel request is
/// consumed by the upload it stops.
pub struct Uploader {
    board: BoardProfile,
    config: UploadConfig,
    cancel: CancelHandle,
}

impl Uploader {
    /// Uploader for `board` with default timing.
    pub fn new(board: BoardProfile) -> Self {
        UploaderBuilder::new(board).build()
    }

    pub fn builder(board: BoardProfile) -> UploaderBuilder {
        UploaderBuilder::new(board)
    }

    pub fn board(&self) -> &BoardProfile {
        &self.board
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    /// Handle that cancels the running upload from any task.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Upload `hex_text` through `transport`.
    ///
    /// Pass `&mut transport` to keep ownership of it. The transport is closed
    /// exactly once before this returns, whatever the outcome. Failures are
    /// reported to `observer` as a [`Stage::Error`] event before returning.
    ///
    /// A cancel requested before the call stops it before the port is opened.
    /// The flag is cleared once an upload ends as cancelled.
    pub async fn upload<T, O>(
        &self,
        mut transport: T,
        hex_text: &str,
        mut observer: O,
    ) -> Result<UploadReport, UploadError>
    where
        T: Transport,
        O: ProgressObserver,
    {
        let started = Instant::now();
        let mut run = Run::new(&mut observer);
        tracing::info!(
            "Uploading to '{}' at {} baud",
            self.board.name,
            self.board.baud_rate
        );

        let result = self.execute(&mut transport, hex_text, &mut run).await;

        if let Err(e) = transport.close().await {
            tracing::error!("Failed to close transport: {}", e);
        }

        match result {
            Ok(mut report) => {
                report.elapsed = started.elapsed();
                tracing::info!(
                    "Upload complete: {} pages, {} bytes in {:?}",
                    report.pages_written,
                    report.bytes_written,
                    report.elapsed
                );
                Ok(report)
            }
            Err(err) => {
                if err.is_cancelled() {
                    self.cancel.reset();
                }
                tracing::error!("{}", err);
                Err(err)
            }
        }
    }

    async fn execute<T, O>(
        &self,
        transport: &mut T,
        hex_text: &str,
        run: &mut Run<'_, O>,
    ) -> Result<UploadReport, UploadError>
    where
        T: Transport,
        O: ProgressObserver,
    {
        let ops = self.load(hex_text).map_err(|e| run.fail(e))?;
        let bytes_written: usize = ops.iter().map(WriteOperation::len).sum();

        // Connect and reset.
        run.enter(UploadState::Connecting);
        self.checkpoint(run)?;
        run.report(
            Stage::Connecting,
            0,
            format!("Connecting at {} baud", self.board.baud_rate),
        );
        transport
            .open(self.board.baud_rate)
            .await
            .map_err(|e| run.fail(e))?;
        transport.assert_reset().await;
        tokio::time::sleep(self.config.reset_pulse).await;
        transport.release_reset().await;
        tokio::time::sleep(self.config.reset_settle).await;
        run.report(Stage::Connecting, 10, "Board reset");

        let mut session = Stk500::new(&mut *transport, self.config.protocol.clone());

        // Sync and identify.
        run.enter(UploadState::Syncing);
        self.checkpoint(run)?;
        session.sync().await.map_err(|e| run.fail(e))?;
        run.report(
            Stage::Syncing,
            20,
            format!(
                "Bootloader in sync after {} attempt(s)",
                session.sync_attempts_used()
            ),
        );
        if let Some(expected) = self.board.signature {
            let actual = session.read_signature().await.map_err(|e| run.fail(e))?;
            if actual != expected {
                return Err(run.fail(FlashError::SignatureMismatch { expected, actual }));
            }
            tracing::debug!("Device signature {:02X?} matches", actual);
        }

        run.enter(UploadState::ProgrammingModeEntry);
        self.checkpoint(run)?;
        session
            .enter_program_mode()
            .await
            .map_err(|e| run.fail(e))?;

        // Pages.
        let total = ops.len();
        run.enter(UploadState::Uploading { page: 0, total });
        run.report(
            Stage::Uploading,
            upload_percent(0, total),
            format!("Writing {} page(s)", total),
        );
        for (idx, op) in ops.iter().enumerate() {
            self.checkpoint_session(&mut session, run).await?;
            if idx > 0 {
                tokio::time::sleep(self.config.page_delay).await;
            }
            session
                .program_page(op.word_address(), &op.payload)
                .await
                .map_err(|e| run.fail(e))?;

            let page = idx + 1;
            run.enter(UploadState::Uploading { page, total });
            run.report(
                Stage::Uploading,
                upload_percent(page, total),
                format!("Wrote page {}/{} at 0x{:04X}", page, total, op.address),
            );
        }

        // No read-back: verification is a fixed delay.
        run.enter(UploadState::Verifying);
        self.checkpoint_session(&mut session, run).await?;
        run.report(Stage::Verifying, 90, "Verifying");
        tokio::time::sleep(self.config.verify_delay).await;

        run.enter(UploadState::LeavingProgramMode);
        session
            .leave_program_mode()
            .await
            .map_err(|e| run.fail(e))?;

        run.enter(UploadState::Complete);
        run.report(
            Stage::Complete,
            100,
            format!("Uploaded {} bytes in {} page(s)", bytes_written, total),
        );

        Ok(UploadReport {
            pages_written: total,
            bytes_written,
            sync_attempts: session.sync_attempts_used(),
            elapsed: Duration::ZERO,
        })
    }

    fn load(&self, hex_text: &str) -> Result<Vec<WriteOperation>, FlashError> {
        let records = hex::parse(hex_text)?;
        let ops = hex::write_operations(&records, self.board.page_size);
        tracing::debug!(
            "Parsed {} records into {} write operations",
            records.len(),
            ops.len()
        );
        Ok(ops)
    }

    fn checkpoint<O: ProgressObserver>(&self, run: &mut Run<'_, O>) -> Result<(), UploadError> {
        if self.cancel.is_cancelled() {
            Err(run.fail(FlashError::Cancelled))
        } else {
            Ok(())
        }
    }

    /// Like `checkpoint`, but leaves programming mode before giving up.
    async fn checkpoint_session<T, O>(
        &self,
        session: &mut Stk500<T>,
        run: &mut Run<'_, O>,
    ) -> Result<(), UploadError>
    where
        T: Transport,
        O: ProgressObserver,
    {
        if !self.cancel.is_cancelled() {
            return Ok(());
        }
        if session.state() == SessionState::ProgramMode {
            if let Err(e) = session.leave_program_mode().await {
                tracing::warn!("Could not leave programming mode after cancel: {}", e);
            }
        }
        Err(run.fail(FlashError::Cancelled))
    }
}

/// Progress and state bookkeeping for one upload.
struct Run<'a, O> {
    state: UploadState,
    phase: UploadPhase,
    percent: u8,
    observer: &'a mut O,
}

impl<'a, O: ProgressObserver> Run<'a, O> {
    fn new(observer: &'a mut O) -> Self {
        Self {
            state: UploadState::Parsing,
            phase: UploadPhase::Parsing,
            percent: 0,
            observer,
        }
    }

    fn enter(&mut self, next: UploadState) {
        debug_assert!(
            self.state.can_advance_to(&next),
            "illegal upload transition {} -> {}",
            self.state,
            next
        );
        if !matches!(next, UploadState::Uploading { page, .. } if page > 0) {
            tracing::info!("Upload state: {} -> {}", self.state, next);
        }
        if let Some(phase) = next.phase() {
            self.phase = phase;
        }
        self.state = next;
    }

    fn report(&mut self, stage: Stage, percent: u8, message: impl Into<String>) {
        self.percent = self.percent.max(percent);
        self.observer
            .on_progress(&UploadProgress::new(stage, self.percent, message));
    }

    /// Record a failure in the current phase and emit the error event.
    fn fail(&mut self, source: impl Into<FlashError>) -> UploadError {
        let err = UploadError::new(self.phase, source);
        self.enter(UploadState::Error { during: self.phase });
        self.report(Stage::Error, self.percent, err.to_string());
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ProtocolError, TransportError};
    use crate::protocol::{opcode, CommandKind, STK_FAILED, STK_INSYNC};
    use crate::transport::mock::{ControlEvent, MockTransport, MOCK_SIGNATURE};

    /// One 16-byte page at 0x0000 followed by an EOF record.
    const SINGLE_PAGE_HEX: &str =
        ":100000000C945C000C946E000C946E000C946E00CA\n:00000001FF\n";

    fn three_record_hex() -> String {
        hex::encode(&[
            WriteOperation::new(0x0000, vec![0x11; 16]),
            WriteOperation::new(0x0010, vec![0x22; 16]),
            WriteOperation::new(0x0020, vec![0x33; 8]),
        ])
        .unwrap()
    }

    fn collect(events: &mut Vec<UploadProgress>) -> impl FnMut(&UploadProgress) + '_ {
        move |p: &UploadProgress| events.push(p.clone())
    }

    fn failing_at(op: u8) -> MockTransport {
        MockTransport::with_responder(move |cmd| {
            if cmd[0] == op {
                Some(vec![STK_INSYNC, STK_FAILED])
            } else {
                MockTransport::default_reply(cmd)
            }
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_page_upload() {
        let mut mock = MockTransport::new();
        let mut events = Vec::new();

        let report = Uploader::new(BoardProfile::uno())
            .upload(&mut mock, SINGLE_PAGE_HEX, collect(&mut events))
            .await
            .unwrap();

        assert_eq!(report.pages_written, 1);
        assert_eq!(report.bytes_written, 16);
        assert_eq!(report.sync_attempts, 1);
        assert_eq!(mock.baud_rate(), Some(115_200));

        let writes = mock.writes();
        assert_eq!(writes.len(), 5);
        assert_eq!(writes[2], vec![0x55, 0x00, 0x00, 0x20]);
        assert_eq!(&writes[3][..4], &[0x64, 0x00, 0x10, b'F']);
        assert_eq!(writes[3].len(), 4 + 16 + 1);
        assert_eq!(
            mock.opcodes(),
            vec![
                opcode::GET_SYNC,
                opcode::ENTER_PROGMODE,
                opcode::LOAD_ADDRESS,
                opcode::PROG_PAGE,
                opcode::LEAVE_PROGMODE
            ]
        );

        let last = events.last().unwrap();
        assert_eq!(last.stage, Stage::Complete);
        assert_eq!(last.percent, 100);
        assert_eq!(mock.close_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_pulse_precedes_sync() {
        let mut mock = MockTransport::new();

        Uploader::new(BoardProfile::nano_old())
            .upload(&mut mock, SINGLE_PAGE_HEX, |_: &UploadProgress| {})
            .await
            .unwrap();

        assert_eq!(mock.baud_rate(), Some(57_600));
        assert_eq!(
            mock.control_events(),
            &[
                ControlEvent::Dtr(true),
                ControlEvent::Rts(true),
                ControlEvent::Dtr(false),
                ControlEvent::Rts(false),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_settle_delay_is_observed() {
        let mut mock = MockTransport::new();
        let start = Instant::now();

        Uploader::new(BoardProfile::uno())
            .upload(&mut mock, SINGLE_PAGE_HEX, |_: &UploadProgress| {})
            .await
            .unwrap();

        let fixed_delays = DEFAULT_RESET_PULSE + DEFAULT_RESET_SETTLE + DEFAULT_VERIFY_DELAY;
        assert!(start.elapsed() >= fixed_delays);
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_is_monotonic_and_ends_at_100() {
        let mut mock = MockTransport::new();
        let mut events = Vec::new();

        Uploader::new(BoardProfile::uno())
            .upload(&mut mock, &three_record_hex(), collect(&mut events))
            .await
            .unwrap();

        let percents: Vec<u8> = events.iter().map(|e| e.percent).collect();
        assert!(percents.windows(2).all(|w| w[0] <= w[1]), "{:?}", percents);
        assert_eq!(percents.last(), Some(&100));

        let uploading: Vec<u8> = events
            .iter()
            .filter(|e| e.stage == Stage::Uploading)
            .map(|e| e.percent)
            .collect();
        assert_eq!(uploading, vec![30, 46, 63, 80]);
        assert!(events.iter().any(|e| e.stage == Stage::Syncing && e.percent == 20));
        assert!(events.iter().any(|e| e.stage == Stage::Verifying && e.percent == 90));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pages_use_word_addresses() {
        let hex_text = hex::encode(&[
            WriteOperation::new(0x0100, vec![0xAA; 4]),
            WriteOperation::new(0x0081, vec![0xBB; 2]),
        ])
        .unwrap();
        let mut mock = MockTransport::new();

        Uploader::new(BoardProfile::uno())
            .upload(&mut mock, &hex_text, |_: &UploadProgress| {})
            .await
            .unwrap();

        let loads: Vec<&Vec<u8>> = mock
            .writes()
            .iter()
            .filter(|w| w[0] == opcode::LOAD_ADDRESS)
            .collect();
        assert_eq!(loads[0], &vec![0x55, 0x80, 0x00, 0x20]);
        assert_eq!(loads[1], &vec![0x55, 0x40, 0x00, 0x20]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversized_record_is_split_to_page_size() {
        let hex_text = hex::encode(&[WriteOperation::new(0x0000, vec![0x5A; 40])]).unwrap();
        let mut mock = MockTransport::new();

        let report = Uploader::new(BoardProfile::uno().with_page_size(16))
            .upload(&mut mock, &hex_text, |_: &UploadProgress| {})
            .await
            .unwrap();

        assert_eq!(report.pages_written, 3);
        assert_eq!(report.bytes_written, 40);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_once_on_every_failure() {
        let cases = [
            (failing_at(opcode::ENTER_PROGMODE), UploadPhase::ProgrammingModeEntry),
            (failing_at(opcode::PROG_PAGE), UploadPhase::Uploading),
            (failing_at(opcode::LEAVE_PROGMODE), UploadPhase::LeavingProgramMode),
            (MockTransport::with_responder(|_| None), UploadPhase::Syncing),
            (MockTransport::new().failing_open(), UploadPhase::Connecting),
        ];

        for (mut mock, phase) in cases {
            let err = Uploader::new(BoardProfile::uno())
                .upload(&mut mock, SINGLE_PAGE_HEX, |_: &UploadProgress| {})
                .await
                .unwrap_err();

            assert_eq!(err.stage, phase, "{}", err);
            assert_eq!(mock.close_count(), 1, "close count for {}", phase);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_sync_failure_reports_timeout() {
        let mut mock = MockTransport::with_responder(|_| None);
        let mut events = Vec::new();

        let err = Uploader::builder(BoardProfile::uno())
            .sync_attempts(3)
            .build()
            .upload(&mut mock, SINGLE_PAGE_HEX, collect(&mut events))
            .await
            .unwrap_err();

        assert!(matches!(
            err.source,
            FlashError::Protocol(ProtocolError::SyncTimeout { attempts: 3 })
        ));
        assert_eq!(mock.writes().len(), 3);

        let last = events.last().unwrap();
        assert_eq!(last.stage, Stage::Error);
        assert!(last.message.contains("syncing"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_page_failure_stops_upload() {
        let mut mock = failing_at(opcode::PROG_PAGE);

        let err = Uploader::new(BoardProfile::uno())
            .upload(&mut mock, &three_record_hex(), |_: &UploadProgress| {})
            .await
            .unwrap_err();

        assert!(matches!(
            err.source,
            FlashError::Protocol(ProtocolError::CommandFailed {
                command: CommandKind::ProgPage,
                ..
            })
        ));
        let opcodes = mock.opcodes();
        assert_eq!(opcodes.iter().filter(|o| **o == opcode::PROG_PAGE).count(), 1);
        assert!(!opcodes.contains(&opcode::LEAVE_PROGMODE));
    }

    #[tokio::test]
    async fn test_parse_failure_before_connecting() {
        let mut mock = MockTransport::new();
        let mut events = Vec::new();

        let err = Uploader::new(BoardProfile::uno())
            .upload(&mut mock, ":10000000ZZ\n", collect(&mut events))
            .await
            .unwrap_err();

        assert_eq!(err.stage, UploadPhase::Parsing);
        assert!(matches!(err.source, FlashError::Hex(_)));
        assert_eq!(mock.open_count(), 0);
        assert!(mock.writes().is_empty());
        assert_eq!(mock.close_count(), 1);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].stage, Stage::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn test_signature_check() {
        let mut mock = MockTransport::new();
        Uploader::new(BoardProfile::uno().with_signature(MOCK_SIGNATURE))
            .upload(&mut mock, SINGLE_PAGE_HEX, |_: &UploadProgress| {})
            .await
            .unwrap();
        assert_eq!(mock.opcodes()[1], opcode::READ_SIGN);

        let mut mock = MockTransport::new();
        let err = Uploader::new(BoardProfile::uno().with_signature([0x1E, 0x98, 0x01]))
            .upload(&mut mock, SINGLE_PAGE_HEX, |_: &UploadProgress| {})
            .await
            .unwrap_err();

        assert_eq!(err.stage, UploadPhase::Syncing);
        assert!(matches!(
            err.source,
            FlashError::SignatureMismatch {
                actual: MOCK_SIGNATURE,
                ..
            }
        ));
        assert!(!mock.opcodes().contains(&opcode::ENTER_PROGMODE));
        assert_eq!(mock.close_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_between_pages() {
        let uploader = Uploader::new(BoardProfile::uno());
        let cancel = uploader.cancel_handle();
        let mut mock = MockTransport::with_responder(move |cmd| {
            if cmd[0] == opcode::PROG_PAGE {
                cancel.cancel();
            }
            MockTransport::default_reply(cmd)
        });

        let err = uploader
            .upload(&mut mock, &three_record_hex(), |_: &UploadProgress| {})
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(err.stage, UploadPhase::Uploading);

        // The first page stays written; programming mode is left before closing.
        let opcodes = mock.opcodes();
        assert_eq!(opcodes.iter().filter(|o| **o == opcode::PROG_PAGE).count(), 1);
        assert_eq!(opcodes.last(), Some(&opcode::LEAVE_PROGMODE));
        assert_eq!(mock.close_count(), 1);
    }

    #[tokio::test]
    async fn test_cancel_before_start_never_opens() {
        let cancel = CancelHandle::new();
        cancel.cancel();
        let uploader = Uploader::builder(BoardProfile::uno())
            .cancel_handle(cancel)
            .build();
        let mut mock = MockTransport::new();

        let err = uploader
            .upload(&mut mock, SINGLE_PAGE_HEX, |_: &UploadProgress| {})
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(err.stage, UploadPhase::Connecting);
        assert_eq!(mock.open_count(), 0);
        assert_eq!(mock.close_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_uploader_reusable_after_cancel() {
        let uploader = Uploader::new(BoardProfile::uno());
        let cancel = uploader.cancel_handle();
        cancel.cancel();

        let mut first = MockTransport::new();
        let err = uploader
            .upload(&mut first, SINGLE_PAGE_HEX, |_: &UploadProgress| {})
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert!(!cancel.is_cancelled());

        let mut second = MockTransport::new();
        let report = uploader
            .upload(&mut second, SINGLE_PAGE_HEX, |_: &UploadProgress| {})
            .await
            .unwrap();
        assert_eq!(report.pages_written, 1);
        assert_eq!(second.close_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_upload_without_control_lines() {
        let mut mock = MockTransport::new().without_control_lines();

        Uploader::new(BoardProfile::uno())
            .upload(&mut mock, SINGLE_PAGE_HEX, |_: &UploadProgress| {})
            .await
            .unwrap();

        assert!(mock.control_events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_report_counts_sync_attempts() {
        let mut silent = 2;
        let mut mock = MockTransport::with_responder(move |cmd| {
            if cmd[0] == opcode::GET_SYNC && silent > 0 {
                silent -= 1;
                return None;
            }
            MockTransport::default_reply(cmd)
        });

        let report = Uploader::new(BoardProfile::uno())
            .upload(&mut mock, SINGLE_PAGE_HEX, |_: &UploadProgress| {})
            .await
            .unwrap();
        assert_eq!(report.sync_attempts, 3);
    }

    #[tokio::test]
    async fn test_builder_overrides() {
        let uploader = Uploader::builder(BoardProfile::uno())
            .sync_attempts(4)
            .sync_backoff(Duration::from_millis(50))
            .response_timeout(Duration::from_secs(1))
            .reset_pulse(Duration::from_millis(20))
            .reset_settle(Duration::from_millis(500))
            .page_delay(Duration::ZERO)
            .verify_delay(Duration::ZERO)
            .build();

        let config = uploader.config();
        assert_eq!(config.protocol.sync_attempts, 4);
        assert_eq!(config.protocol.sync_backoff, Duration::from_millis(50));
        assert_eq!(config.protocol.response_timeout, Duration::from_secs(1));
        assert_eq!(config.reset_settle, Duration::from_millis(500));
        assert_eq!(config.page_delay, Duration::ZERO);
        assert_eq!(uploader.board().name, "uno");
    }

    #[tokio::test]
    async fn test_transport_error_surfaces_as_transport() {
        let mut mock = MockTransport::new().failing_open();

        let err = Uploader::new(BoardProfile::uno())
            .upload(&mut mock, SINGLE_PAGE_HEX, |_: &UploadProgress| {})
            .await
            .unwrap_err();

        assert!(matches!(
            err.source,
            FlashError::Transport(TransportError::Open(_))
        ));
    }
}
