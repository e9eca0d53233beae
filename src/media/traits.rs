// Seams between the orchestration layer and its collaborators

use async_trait::async_trait;
use std::path::Path;
use tokio::sync::mpsc;

use super::errors::ConvertError;
use super::models::{JobState, Report};

/// Fetches a remote tool artifact into a local file
#[async_trait]
pub trait ArtifactFetcher: Send + Sync {
    /// Name of the fetcher (for logging)
    fn name(&self) -> &'static str;

    /// Write the resource at `url` to `dest`, returning the byte count.
    /// `dest` already exists and is owned by the caller; it is truncated.
    async fn fetch(&self, url: &str, dest: &Path, sink: &ReportSink) -> Result<u64, ConvertError>;
}

/// Report sender handed to every request.
///
/// Sending never blocks. Reports sent after the receiver is gone are dropped.
#[derive(Debug, Clone)]
pub struct ReportSink {
    tx: mpsc::UnboundedSender<Report>,
}

impl ReportSink {
    pub fn new(tx: mpsc::UnboundedSender<Report>) -> Self {
        Self { tx }
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Report>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn emit(&self, report: Report) {
        let _ = self.tx.send(report);
    }

    pub fn log(&self, message: impl Into<String>) {
        self.emit(Report::Log {
            message: message.into(),
        });
    }

    pub fn progress(&self, percent: f32, eta: impl Into<String>) {
        self.emit(Report::Progress {
            percent,
            eta: eta.into(),
        });
    }

    pub fn state(&self, state: JobState) {
        self.emit(Report::State { state });
    }

    pub fn finished(&self, success: bool, summary: impl Into<String>) {
        self.emit(Report::Finished {
            success,
            summary: summary.into(),
        });
    }
}
