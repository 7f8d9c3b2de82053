//! Upload state machine.
//!
//! ```text
//! Parsing ─► Connecting ─► Syncing ─► ProgrammingModeEntry ─► Uploading
//!                                                                 │
//!            Complete ◄── LeavingProgramMode ◄── Verifying ◄──────┘
//!
//! any active state ──failure/cancel──► Error { during }
//! ```
//!
//! Both terminal states are followed by transport cleanup.

use std::fmt;

/// Active step of an upload; the `stage` of an [`UploadError`](crate::error::UploadError).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UploadPhase {
    Parsing,
    Connecting,
    Syncing,
    ProgrammingModeEntry,
    Uploading,
    Verifying,
    LeavingProgramMode,
}

impl UploadPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadPhase::Parsing => "parsing",
            UploadPhase::Connecting => "connecting",
            UploadPhase::Syncing => "syncing",
            UploadPhase::ProgrammingModeEntry => "programming-mode entry",
            UploadPhase::Uploading => "uploading",
            UploadPhase::Verifying => "verifying",
            UploadPhase::LeavingProgramMode => "leaving program mode",
        }
    }
}

impl fmt::Display for UploadPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an upload currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    Parsing,
    Connecting,
    Syncing,
    ProgrammingModeEntry,
    /// `page` pages of `total` written so far.
    Uploading {
        page: usize,
        total: usize,
    },
    Verifying,
    LeavingProgramMode,
    Complete,
    Error {
        during: UploadPhase,
    },
}

impl UploadState {
    /// The active phase, or `None` once the upload has ended.
    pub fn phase(&self) -> Option<UploadPhase> {
        match self {
            UploadState::Parsing => Some(UploadPhase::Parsing),
            UploadState::Connecting => Some(UploadPhase::Connecting),
            UploadState::Syncing => Some(UploadPhase::Syncing),
            UploadState::ProgrammingModeEntry => Some(UploadPhase::ProgrammingModeEntry),
            UploadState::Uploading { .. } => Some(UploadPhase::Uploading),
            UploadState::Verifying => Some(UploadPhase::Verifying),
            UploadState::LeavingProgramMode => Some(UploadPhase::LeavingProgramMode),
            UploadState::Complete | UploadState::Error { .. } => None,
        }
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        self.phase().is_none()
    }

    /// Whether `next` is a legal successor of `self`.
    pub fn can_advance_to(&self, next: &UploadState) -> bool {
        use UploadState::*;

        match (self, next) {
            (Complete | Error { .. }, _) => false,
            (from, Error { during }) => from.phase() == Some(*during),
            (Parsing, Connecting)
            | (Connecting, Syncing)
            | (Syncing, ProgrammingModeEntry)
            | (ProgrammingModeEntry, Uploading { .. })
            | (Uploading { .. }, Uploading { .. })
            | (Uploading { .. }, Verifying)
            | (Verifying, LeavingProgramMode)
            | (LeavingProgramMode, Complete) => true,
            _ => false,
        }
    }
}

impl fmt::Display for UploadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadState::Uploading { page, total } => write!(f, "uploading ({}/{})", page, total),
            UploadState::Complete => f.write_str("complete"),
            UploadState::Error { during } => write!(f, "error during {}", during),
            other => match other.phase() {
                Some(phase) => f.write_str(phase.as_str()),
                None => Ok(()),
            },
        }
    }
}
