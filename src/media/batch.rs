// Sequential batches and source discovery

use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info};
use walkdir::WalkDir;

use super::models::{ConversionRequest, DownloadRequest, MediaKind, Report};
use super::orchestrator::Converter;
use super::traits::ReportSink;

#[derive(Debug, Clone, PartialEq)]
pub enum Job {
    Download(DownloadRequest),
    Convert(ConversionRequest),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub succeeded: usize,
    pub total: usize,
}

impl BatchSummary {
    pub fn all_succeeded(&self) -> bool {
        self.succeeded == self.total
    }
}

/// Run `jobs` one after another; a failed job never stops the rest.
///
/// Each job reports its own `Finished`; the batch ends with one
/// `BatchFinished` carrying the success count.
pub async fn run_batch(converter: &Converter, label: &str, jobs: Vec<Job>, sink: &ReportSink) -> BatchSummary {
    let total = jobs.len();
    let mut succeeded = 0;

    for (index, job) in jobs.into_iter().enumerate() {
        debug!(label, index, total, "batch item");
        let result = match &job {
            Job::Download(req) => converter.download_media(req, sink).await,
            Job::Convert(req) => converter.convert_media(req, sink).await,
        };
        if matches!(result, Ok(ref outcome) if outcome.success) {
            succeeded += 1;
        }
    }

    let summary = format!("{} finished. {}/{} succeeded.", label, succeeded, total);
    info!(label, succeeded, total, "batch finished");
    sink.emit(Report::BatchFinished {
        succeeded,
        total,
        summary,
    });
    BatchSummary { succeeded, total }
}

/// Run a batch on its own task so several batches can proceed at once.
pub fn spawn_batch(
    converter: Arc<Converter>,
    label: impl Into<String>,
    jobs: Vec<Job>,
    sink: ReportSink,
) -> JoinHandle<BatchSummary> {
    let label = label.into();
    tokio::spawn(async move { run_batch(&converter, &label, jobs, &sink).await })
}

/// A discovered source file and the root it was found under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceItem {
    pub file: PathBuf,
    pub base_dir: PathBuf,
}

impl SourceItem {
    pub fn output_dir(&self, output_root: &Path) -> PathBuf {
        output_dir_for(&self.base_dir, &self.file, output_root)
    }
}

/// Expand files and directories into media files.
///
/// Directories are walked recursively in name order. With `kind` set only
/// that category is kept, otherwise any known media extension. A file named
/// twice is listed once.
pub fn collect_sources(paths: &[PathBuf], kind: Option<MediaKind>) -> Vec<SourceItem> {
    let wanted = |path: &Path| match kind {
        Some(kind) => kind.matches(path),
        None => MediaKind::of(path).is_some(),
    };

    let mut seen = HashSet::new();
    let mut items = Vec::new();
    for path in paths {
        if path.is_dir() {
            for entry in WalkDir::new(path)
                .follow_links(true)
                .sort_by_file_name()
                .into_iter()
                .filter_map(Result::ok)
            {
                if entry.file_type().is_file() && wanted(entry.path()) && seen.insert(entry.path().to_path_buf()) {
                    items.push(SourceItem {
                        file: entry.into_path(),
                        base_dir: path.clone(),
                    });
                }
            }
        } else if path.is_file() && wanted(path) && seen.insert(path.clone()) {
            items.push(SourceItem {
                file: path.clone(),
                base_dir: path.parent().map(Path::to_path_buf).unwrap_or_default(),
            });
        }
    }
    items
}

/// `output_root` plus the file's directory relative to the scan root.
///
/// `videos/trips/a.mp4` scanned from `videos` lands in `<output_root>/trips`.
pub fn output_dir_for(base_dir: &Path, file: &Path, output_root: &Path) -> PathBuf {
    file.parent()
        .and_then(|parent| parent.strip_prefix(base_dir).ok())
        .map(|relative| output_root.join(relative))
        .unwrap_or_else(|| output_root.to_path_buf())
}
