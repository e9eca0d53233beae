pub mod config;
pub mod media;

pub use config::Settings;
pub use media::{
    collect_sources, output_dir_for, run_batch, spawn_batch, BatchSummary, ConversionOutcome, ConversionRequest,
    ConvertError, Converter, DownloadRequest, Job, JobState, MediaKind, Quality, Report, ReportSink, ToolType,
};
