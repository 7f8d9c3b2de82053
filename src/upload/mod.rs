//! Upload module - the end-to-end firmware upload sequence.
//!
//! - [`Uploader`] / [`UploaderBuilder`] - orchestration and timing
//! - [`UploadState`] / [`UploadPhase`] - where an upload is, or failed
//! - [`UploadProgress`] / [`ProgressObserver`] - progress events
//! - [`CancelHandle`] - cooperative cancellation

mod cancel;
mod progress;
mod state;
mod uploader;

pub use cancel::CancelHandle;
pub use progress::{ChannelObserver, ProgressObserver, Stage, UploadProgress};
pub use state::{UploadPhase, UploadState};
pub use uploader::{
    UploadConfig, UploadReport, Uploader, UploaderBuilder, DEFAULT_PAGE_DELAY,
    DEFAULT_RESET_PULSE, DEFAULT_RESET_SETTLE, DEFAULT_VERIFY_DELAY,
};
