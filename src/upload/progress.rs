//! Progress reporting.
//!
//! Progress events are emitted, never stored. Any `FnMut(&UploadProgress)`
//! is an observer; [`ChannelObserver`] forwards events to an unbounded tokio
//! channel for consumers living on another task (UI, IPC bridges).

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

/// Coarse upload stage as reported to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Connecting,
    Syncing,
    Uploading,
    Verifying,
    Complete,
    Error,
}

/// One progress event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadProgress {
    pub stage: Stage,
    /// 0..=100, non-decreasing over a successful upload.
    pub percent: u8,
    pub message: String,
}

impl UploadProgress {
    pub fn new(stage: Stage, percent: u8, message: impl Into<String>) -> Self {
        Self {
            stage,
            percent: percent.min(100),
            message: message.into(),
        }
    }
}

/// Receives progress events during an upload.
pub trait ProgressObserver {
    fn on_progress(&mut self, progress: &UploadProgress);
}

impl<F> ProgressObserver for F
where
    F: FnMut(&UploadProgress),
{
    fn on_progress(&mut self, progress: &UploadProgress) {
        self(progress)
    }
}

/// Observer that forwards every event into an unbounded channel.
///
/// A dropped receiver is not an error; events are discarded.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: UnboundedSender<UploadProgress>,
}

impl ChannelObserver {
    pub fn new(tx: UnboundedSender<UploadProgress>) -> Self {
        Self { tx }
    }
}

impl From<UnboundedSender<UploadProgress>> for ChannelObserver {
    fn from(tx: UnboundedSender<UploadProgress>) -> Self {
        Self::new(tx)
    }
}

impl ProgressObserver for ChannelObserver {
    fn on_progress(&mut self, progress: &UploadProgress) {
        if self.tx.send(progress.clone()).is_err() {
            tracing::trace!("Progress receiver dropped");
        }
    }
}

/// Percent for page `done` of `total` on the 30..=80 upload band.
pub(crate) fn upload_percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 80;
    }
    let done = done.min(total);
    (30 + (done * 50) / total) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_percent_band() {
        assert_eq!(upload_percent(0, 3), 30);
        assert_eq!(upload_percent(1, 3), 46);
        assert_eq!(upload_percent(2, 3), 63);
        assert_eq!(upload_percent(3, 3), 80);
        assert_eq!(upload_percent(0, 0), 80);
        assert_eq!(upload_percent(5, 3), 80);
    }

    #[test]
    fn test_percent_is_clamped() {
        assert_eq!(UploadProgress::new(Stage::Complete, 250, "").percent, 100);
    }

    #[test]
    fn test_closure_observer() {
        let mut seen = Vec::new();
        {
            let mut observer = |p: &UploadProgress| seen.push(p.percent);
            observer.on_progress(&UploadProgress::new(Stage::Syncing, 20, "sync"));
            observer.on_progress(&UploadProgress::new(Stage::Complete, 100, "done"));
        }
        assert_eq!(seen, vec![20, 100]);
    }

    #[tokio::test]
    async fn test_channel_observer_forwards_and_tolerates_drop() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let mut observer = ChannelObserver::from(tx);

        observer.on_progress(&UploadProgress::new(Stage::Connecting, 0, "open"));
        let event = rx.recv().await.unwrap();
        assert_eq!(event.stage, Stage::Connecting);

        drop(rx);
        observer.on_progress(&UploadProgress::new(Stage::Syncing, 20, "sync"));
    }

    #[test]
    fn test_serializes_lowercase_stage() {
        let json = serde_json::to_string(&UploadProgress::new(Stage::Verifying, 90, "v")).unwrap();
        assert_eq!(json, r#"{"stage":"verifying","percent":90,"message":"v"}"#);
    }
}
